//! Format-polymorphic text extraction.
//!
//! A [`LoaderRegistry`] maps lowercased file extensions (with the leading
//! dot, e.g. `".pdf"`) to extractor functions. New formats are added with
//! [`LoaderRegistry::register`]; [`LoaderRegistry::load`] never changes.
//!
//! | Extension | Extraction |
//! |-----------|------------|
//! | `.txt`, `.md` | raw UTF-8 content |
//! | `.pdf` | text of every page, each followed by `\n` |
//! | `.docx` | paragraphs of `word/document.xml` joined with `\n` |
//!
//! Whatever goes wrong inside an extractor is reported as
//! [`LoadError::Failed`] carrying the path, so callers only ever match on
//! two variants.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{ExtractError, LoadError};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Signature of a single-format extractor.
pub type Extractor = Box<dyn Fn(&Path) -> Result<String, ExtractError> + Send + Sync>;

/// Extension → extractor table.
pub struct LoaderRegistry {
    extractors: HashMap<String, Extractor>,
}

impl LoaderRegistry {
    /// An empty registry that rejects every file.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// A registry with the built-in text, Markdown, PDF and DOCX extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(".txt", extract_plain_text)
            .register(".md", extract_plain_text)
            .register(".pdf", extract_pdf)
            .register(".docx", extract_docx);
        registry
    }

    /// Register (or replace) the extractor for `extension`.
    ///
    /// The extension is matched case-insensitively; the leading dot is
    /// optional.
    pub fn register<F>(&mut self, extension: &str, extractor: F) -> &mut Self
    where
        F: Fn(&Path) -> Result<String, ExtractError> + Send + Sync + 'static,
    {
        self.extractors
            .insert(normalize_extension(extension), Box::new(extractor));
        self
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extractors.contains_key(&normalize_extension(extension))
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Extract the text of `path` with the extractor for its extension.
    pub fn load(&self, path: &Path) -> Result<String, LoadError> {
        let extension = extension_of(path);
        let extractor = self
            .extractors
            .get(&extension)
            .ok_or(LoadError::UnsupportedFormat { extension })?;

        extractor(path).map_err(|source| LoadError::Failed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The process-wide registry, built on first use and read-only afterwards.
pub fn default_registry() -> &'static LoaderRegistry {
    static REGISTRY: OnceLock<LoaderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(LoaderRegistry::with_defaults)
}

/// Load `path` through [`default_registry`].
pub fn load(path: &Path) -> Result<String, LoadError> {
    default_registry().load(path)
}

/// Lowercased extension with its leading dot, or `""` when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

/// Read the file as UTF-8 text, unchanged.
pub fn extract_plain_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8(bytes)?)
}

/// Extract every page's text, appending `\n` after each page.
pub fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut out = String::new();
    for page in pages {
        out.push_str(&page);
        out.push('\n');
    }
    Ok(out)
}

/// Extract the body paragraphs of a Word document, joined with `\n`.
pub fn extract_docx(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_slice()))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(paragraphs.join("\n"))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Collect the text of each `<w:p>` element.
///
/// Runs (`<w:t>`) are concatenated; `<w:tab/>` becomes a tab and
/// `<w:br/>`/`<w:cr/>` a newline. Empty paragraphs are kept so blank lines
/// survive extraction. A paragraph nested inside another (text boxes) is
/// inlined into its parent on a line of its own.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    // Runs like <w:t xml:space="preserve"> </w:t> carry meaningful spaces.
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    // Open paragraphs, innermost last.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(text) = open.pop() {
                        match open.last_mut() {
                            Some(parent) => push_line(parent, &text),
                            None => paragraphs.push(text),
                        }
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => match open.last_mut() {
                    Some(parent) => push_line(parent, ""),
                    None => paragraphs.push(String::new()),
                },
                b"tab" => {
                    if let Some(text) = open.last_mut() {
                        text.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(text) = open.last_mut() {
                        text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                if let Some(text) = open.last_mut() {
                    let unescaped = te
                        .unescape()
                        .map_err(|e| ExtractError::Docx(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Append `line` to `parent` so it starts and ends on its own line.
fn push_line(parent: &mut String, line: &str) {
    if !parent.is_empty() && !parent.ends_with('\n') {
        parent.push('\n');
    }
    parent.push_str(line);
    parent.push('\n');
}
