//! # Feedstore
//!
//! A data feed ingestion, versioning, and semantic retrieval pipeline.
//!
//! Feedstore takes an uploaded file or pasted text, extracts canonical
//! text and structural metadata, scans it for recognizable concepts,
//! embeds it through a local model service, and decides whether the new
//! content materially differs from the stored version before committing.
//! History is snapshotted on every material change, deletion is soft and
//! audited, and stored embeddings back cosine-similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────┐
//! │ File / text  │──▶│   Pipeline     │──▶│    SQLite      │
//! │ submission   │   │ Extract+Embed │   │ Docs+Versions │
//! └──────────────┘   │  +Versioning  │   │  +Audit log   │
//!                    └───────────────┘   └──────┬────────┘
//!                                               │
//!                                         ┌─────▼─────┐
//!                                         │ Semantic  │
//!                                         │  search   │
//!                                         └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Content extraction (plain, tabular, spreadsheet, direct) |
//! | [`concepts`] | Concept extraction and key→location mapping |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`versioning`] | Similarity-based version decision |
//! | [`repository`] | Document store, version history, soft delete |
//! | [`audit`] | Append-only deletion ledger |
//! | [`ingest`] | Submission pipeline orchestration |
//! | [`search`] | Cosine-similarity retrieval |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod concepts;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod repository;
pub mod search;
pub mod versioning;
