//! # docrag CLI
//!
//! The `docrag` binary syncs a data folder into a persistent collection,
//! searches it, and runs a retrieval-augmented chat loop over it.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag sync` | Index files in the data folder that the collection has not seen |
//! | `docrag search "<query>"` | Print the nearest chunks |
//! | `docrag chat` | Sync, then answer questions interactively |
//! | `docrag status` | Compare the data folder with the collection |
//! | `docrag reindex <file>` | Replace the stored chunks of one file |
//! | `docrag completions <shell>` | Print a shell completion script |
//!
//! Without `--config`, `./config/docrag.toml` is used if it exists and the
//! built-in defaults otherwise.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use docrag::chat::ChatSession;
use docrag::collection::open_configured;
use docrag::config::{self, Config};
use docrag::extract::default_registry;
use docrag::logging;
use docrag::provider::create_provider;
use docrag::retrieve::semantic_search;
use docrag::store::Collection;
use docrag::sync::{reindex_file, sync_folder, sync_status, SyncOptions, SyncReport};

const DEFAULT_CONFIG_PATH: &str = "./config/docrag.toml";

/// docrag: document ingestion, sync, and retrieval-augmented chat.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "Sync a folder of documents into a vector collection and chat with it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docrag.toml`; a missing default file means
    /// built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index files in the data folder that are not yet in the collection.
    ///
    /// Files are identified by name only: changed files are not re-indexed
    /// and deleted files are not removed. Use `reindex` for a changed file.
    Sync {
        /// Data folder (overrides `[ingest].data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the chunks nearest to a query.
    Search {
        query: String,

        /// Number of results (overrides `[retrieval].n_results`).
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Interactive question answering over the collection.
    ///
    /// Type `exit` or `quit` to leave.
    Chat {
        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,

        /// Skip the sync pass before the first question.
        #[arg(long)]
        no_sync: bool,
    },

    /// Show records, pending files, and indexed files missing from the folder.
    Status,

    /// Delete and re-insert the chunks of one file.
    Reindex {
        /// File path, or a file name inside the data folder.
        file: PathBuf,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn load(cli_path: Option<&Path>) -> anyhow::Result<Config> {
    match cli_path {
        Some(path) => config::load_config(path),
        None => config::load_config_or_default(Path::new(DEFAULT_CONFIG_PATH)),
    }
}

fn print_sync_report(report: &SyncReport, data_dir: &Path) {
    if report.data_files == 0 {
        println!("No files found in {}.", data_dir.display());
        return;
    }
    if report.is_already_synced() {
        println!(
            "Collection already synced ({} files).",
            report.already_indexed
        );
        return;
    }
    for file in &report.indexed {
        println!("  indexed  {} ({} chunks)", file.file_name, file.chunks);
    }
    for file in &report.failed {
        println!("  failed   {}: {}", file.file_name, file.error);
    }
    println!(
        "Synced {} new files: {} records in {} batches ({} already indexed, {} failed).",
        report.indexed.len(),
        report.records_inserted,
        report.batches,
        report.already_indexed,
        report.failed.len()
    );
}

async fn run_sync(
    cfg: &Config,
    collection: &dyn Collection,
    data_dir: &Path,
) -> anyhow::Result<()> {
    let report = sync_folder(
        collection,
        default_registry(),
        data_dir,
        &SyncOptions::from_config(cfg),
    )
    .await?;
    print_sync_report(&report, data_dir);
    Ok(())
}

async fn run_search(
    collection: &dyn Collection,
    query: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let results = semantic_search(collection, query, limit).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in results.hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} #{}",
            rank + 1,
            hit.distance,
            hit.metadata.source,
            hit.metadata.chunk_index
        );
        let snippet: String = hit.document.chars().take(200).collect();
        println!("   {}", snippet.replace('\n', " "));
    }
    Ok(())
}

async fn run_status(
    cfg: &Config,
    collection: &dyn Collection,
) -> anyhow::Result<()> {
    let status = sync_status(
        collection,
        &cfg.ingest.data_dir,
        &SyncOptions::from_config(cfg),
    )
    .await?;
    println!("Collection: {}", collection.name());
    println!("Storage:    {}", cfg.storage.path.display());
    println!("Data dir:   {}", cfg.ingest.data_dir.display());
    println!("Records:    {}", status.records);
    println!("Indexed:    {} files", status.indexed.len());
    println!("Pending:    {} files", status.pending.len());
    for name in &status.pending {
        println!("  + {}", name);
    }
    if !status.orphaned.is_empty() {
        println!("Not in data dir: {} files", status.orphaned.len());
        for name in &status.orphaned {
            println!("  - {}", name);
        }
    }
    Ok(())
}

async fn run_reindex(
    cfg: &Config,
    collection: &dyn Collection,
    file: &Path,
) -> anyhow::Result<()> {
    let path = if file.exists() {
        file.to_path_buf()
    } else {
        cfg.ingest.data_dir.join(file)
    };
    let report = reindex_file(
        collection,
        default_registry(),
        &path,
        &SyncOptions::from_config(cfg),
    )
    .await?;
    println!(
        "Reindexed {}: removed {} records, inserted {}.",
        report.file_name, report.removed, report.inserted
    );
    Ok(())
}

async fn run_chat(
    cfg: &Config,
    collection: Arc<dyn Collection>,
    stream: bool,
) -> anyhow::Result<()> {
    let provider = create_provider(&cfg.chat)?;
    let mut session = ChatSession::from_config(collection, provider, cfg);
    println!(
        "Chatting with {} ({}). Type 'exit' or 'quit' to leave.",
        session.provider_name(),
        cfg.chat.model
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        if stream {
            print!("Assistant: ");
            let result = session
                .ask_streaming(query, |fragment| {
                    print!("{}", fragment);
                    let _ = std::io::stdout().flush();
                })
                .await;
            match result {
                Ok(_) => println!(),
                Err(e) => println!("\nI encountered an error: {}", e),
            }
        } else {
            match session.ask(query).await {
                Ok(reply) => println!("Assistant: {}", reply),
                Err(e) => println!("Assistant: I encountered an error: {}", e),
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load(cli.config.as_deref())?;
    logging::init_with_config(&cfg.logging);

    let collection: Arc<dyn Collection> = Arc::new(
        open_configured(&cfg)
            .await
            .with_context(|| format!("failed to open {}", cfg.storage.path.display()))?,
    );

    match cli.command {
        Commands::Sync { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| cfg.ingest.data_dir.clone());
            run_sync(&cfg, collection.as_ref(), &data_dir).await?;
        }
        Commands::Search { query, limit } => {
            let limit = limit.unwrap_or(cfg.retrieval.n_results);
            run_search(collection.as_ref(), &query, limit).await?;
        }
        Commands::Chat { stream, no_sync } => {
            if !no_sync {
                run_sync(&cfg, collection.as_ref(), &cfg.ingest.data_dir).await?;
            }
            run_chat(&cfg, collection, stream || cfg.chat.stream).await?;
        }
        Commands::Status => {
            run_status(&cfg, collection.as_ref()).await?;
        }
        Commands::Reindex { file } => {
            run_reindex(&cfg, collection.as_ref(), &file).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
