//! Multi-format loading: PDF and DOCX through the full sync pipeline.

mod common;

use std::fs;
use std::io::Write;

use docrag::extract::{self, LoaderRegistry};
use docrag::retrieve::semantic_search;
use docrag::store::Collection;
use docrag::sync::{sync_folder, SyncOptions};
use tempfile::TempDir;

use common::open_collection;

/// Single-page PDF showing `phrase` in Helvetica, with a correct xref table.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// DOCX (ZIP) whose `word/document.xml` holds one `<w:p>` per paragraph.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn pdf_text_is_extracted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("report.pdf");
    fs::write(&path, minimal_pdf_with_phrase("quarterly revenue summary")).unwrap();

    let text = extract::load(&path).unwrap();
    assert!(text.contains("quarterly"), "extracted: {text:?}");
}

#[test]
fn docx_paragraphs_become_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memo.docx");
    fs::write(&path, minimal_docx(&["first paragraph", "second paragraph"])).unwrap();

    let text = extract::load(&path).unwrap();
    assert_eq!(text.trim(), "first paragraph\nsecond paragraph");
}

#[test]
fn extension_match_is_case_insensitive() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("MEMO.DOCX");
    fs::write(&path, minimal_docx(&["upper case name"])).unwrap();

    let text = extract::load(&path).unwrap();
    assert!(text.contains("upper case name"));
}

#[tokio::test]
async fn mixed_folder_syncs_and_searches() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("report.pdf"), minimal_pdf_with_phrase("quarterly revenue summary")).unwrap();
    fs::write(
        data.join("handbook.docx"),
        minimal_docx(&["Employees accrue vacation days monthly.", "Ask HR for details."]),
    )
    .unwrap();
    fs::write(data.join("notes.txt"), "Plain notes about the garden shed.").unwrap();
    fs::write(data.join("broken.pdf"), b"not a pdf at all").unwrap();

    let collection = open_collection(&tmp.path().join("storage")).await;
    let report = sync_folder(
        &collection,
        &LoaderRegistry::with_defaults(),
        &data,
        &SyncOptions::default(),
    )
    .await
    .unwrap();

    let indexed: Vec<&str> = report.indexed.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(indexed, vec!["handbook.docx", "notes.txt", "report.pdf"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].file_name, "broken.pdf");
    assert_eq!(collection.count().await.unwrap(), 3);

    let results = semantic_search(&collection, "vacation days", 1).await.unwrap();
    assert_eq!(results.hits[0].metadata.source, "handbook.docx");
}
