//! # docrag
//!
//! A local-first document ingestion and retrieval-augmented chat pipeline.
//!
//! Files dropped into a data folder are loaded (plain text, Markdown, PDF,
//! DOCX), split into overlapping character windows, embedded, and stored in
//! a persistent vector collection. A sync pass only indexes files the
//! collection has never seen. Questions are answered by retrieving the
//! nearest chunks and handing them, with recent conversation turns, to a
//! chat backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │   data/     │──▶│  Extract +  │──▶│ Collection  │
//! │ txt/pdf/docx│   │   Chunk     │   │ SQLite+vec  │
//! └─────────────┘   └─────────────┘   └──────┬──────┘
//!                                            │ retrieve
//!                                            ▼
//!                   ┌─────────────┐   ┌─────────────┐
//!                   │  Provider   │◀──│   Prompt +  │
//!                   │ Ollama/Groq │   │   Memory    │
//!                   └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docrag sync                        # index new files under data/
//! docrag search "refund policy"      # nearest chunks
//! docrag chat                        # sync, then interactive Q&A
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error types per pipeline stage |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`extract`] | Extension-keyed text loaders |
//! | [`chunk`] | Overlapping character windows |
//! | [`processor`] | File → ids, chunks, metadata |
//! | [`embedding`] | Embedding backends |
//! | [`store`] | Collection trait and in-memory collection |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Persistent SQLite collection |
//! | [`collection`] | Collection accessor |
//! | [`sync`] | Incremental folder sync |
//! | [`retrieve`] | Semantic search |
//! | [`prompt`] | Prompt assembly |
//! | [`memory`] | Bounded conversation memory |
//! | [`provider`] | Chat backends |
//! | [`chat`] | Retrieval-augmented chat session |

pub mod chat;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod logging;
pub mod memory;
pub mod migrate;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod retrieve;
pub mod sqlite_store;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
