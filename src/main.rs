//! # Feedstore CLI (`feeds`)
//!
//! The `feeds` binary drives the ingestion, versioning, and retrieval
//! pipeline: database initialization, file/text submission, listings,
//! version history, soft deletion with audit, restore, and semantic
//! search.
//!
//! ## Usage
//!
//! ```bash
//! feeds --config ./config/feeds.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `feeds init` | Create the SQLite database and run schema migrations |
//! | `feeds ingest file <path>` | Ingest a file (plain, tabular, spreadsheet) |
//! | `feeds ingest text <name> <content>` | Ingest directly submitted text |
//! | `feeds list` | List active documents for an owner |
//! | `feeds show <id>` | Print a document's content, metadata, and concepts |
//! | `feeds versions <id>` | List (or show) historical versions |
//! | `feeds delete <id>` | Soft-delete a document (audited) |
//! | `feeds restore <id>` | Restore a soft-deleted document |
//! | `feeds audit` | Query the deletion audit ledger |
//! | `feeds search "<query>"` | Rank documents by semantic similarity |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedstore::config;
use feedstore::models::SourceKind;
use feedstore::{audit, db, ingest, migrate, search};

/// Feedstore CLI — data feed ingestion, versioning, and semantic
/// retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with database, ingestion, embedding, versioning, and retrieval
/// settings.
#[derive(Parser)]
#[command(
    name = "feeds",
    about = "Feedstore — data feed ingestion, versioning, and semantic retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/feeds.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, document_versions, concept_entries, concept_locations,
    /// deletion_log). Idempotent.
    Init,

    /// Ingest content under a document identity.
    ///
    /// Re-ingesting the same identity compares embeddings against the
    /// stored version: near-identical content is skipped, changed content
    /// commits a new version with the prior state snapshotted.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// List documents for an owner (active by default).
    List {
        /// Owner identity.
        #[arg(long)]
        owner: String,

        /// Show soft-deleted documents instead of active ones.
        #[arg(long)]
        deleted: bool,
    },

    /// Print a document's processed content, structural metadata, and
    /// concept map.
    Show {
        /// Document id.
        id: String,

        /// Owner identity.
        #[arg(long)]
        owner: String,
    },

    /// List a document's version history, or show one snapshot.
    Versions {
        /// Document id.
        id: String,

        /// Owner identity.
        #[arg(long)]
        owner: String,

        /// Show the full snapshot for this version number.
        #[arg(long)]
        show: Option<i64>,
    },

    /// Soft-delete a document. Content, embedding, and version history
    /// stay intact; one audit entry is written.
    Delete {
        /// Document id.
        id: String,

        /// Owner identity (recorded as the deleting actor).
        #[arg(long)]
        owner: String,

        /// Free-text reason recorded in the audit ledger.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Restore a soft-deleted document and rebuild its concept map.
    Restore {
        /// Document id.
        id: String,

        /// Owner identity.
        #[arg(long)]
        owner: String,
    },

    /// Query the deletion audit ledger.
    Audit {
        /// List entries for a document id.
        #[arg(long, conflicts_with = "actor")]
        document: Option<String>,

        /// List entries by deleting actor.
        #[arg(long)]
        actor: Option<String>,

        /// Only entries on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only entries on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,
    },

    /// Rank an owner's documents by semantic similarity to a query.
    Search {
        /// The query text.
        query: String,

        /// Owner identity.
        #[arg(long)]
        owner: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,

        /// Restrict to one source kind (plain, tabular, spreadsheet,
        /// direct).
        #[arg(long)]
        kind: Option<String>,
    },
}

/// Ingestion sources.
#[derive(Subcommand)]
enum IngestSource {
    /// Ingest a file from disk.
    ///
    /// The source kind is inferred from the extension (.txt/.md/.log →
    /// plain, .csv/.tsv → tabular, .xlsx → spreadsheet) unless `--kind`
    /// overrides it. Unsupported extensions are rejected.
    File {
        /// Path to the file.
        path: PathBuf,

        /// Owner identity.
        #[arg(long)]
        owner: String,

        /// Document name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        /// Override the inferred source kind.
        #[arg(long)]
        kind: Option<String>,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Ingest text supplied on the command line.
    Text {
        /// Document name.
        name: String,

        /// The text content.
        content: String,

        /// Owner identity.
        #[arg(long)]
        owner: String,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },
}

fn parse_date(s: &str, end_of_day: bool) -> Result<i64> {
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.unwrap().and_utc().timestamp())
}

fn print_report(report: &feedstore::models::IngestReport) {
    println!("ingest");
    println!("  document: {}", report.document_id);
    println!("  version: {}", report.version);
    println!("  status: {}", report.status.as_str());
    println!("  concepts: {}", report.concept_count);
    if !report.embedded {
        println!("  warning: no embedding — semantic search will not find this document until it is reprocessed");
    }
    println!("ok");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }

        Commands::Ingest { source } => {
            let pool = db::connect(&cfg).await?;
            let pipeline = ingest::Pipeline::new(cfg, pool)?;

            let report = match source {
                IngestSource::File {
                    path,
                    owner,
                    name,
                    kind,
                    description,
                } => {
                    let bytes = std::fs::read(&path)?;
                    let declared_name = name.unwrap_or_else(|| {
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string())
                    });
                    let kind = kind.as_deref().map(SourceKind::parse).transpose()?;
                    pipeline
                        .submit_file(&owner, &declared_name, &bytes, kind, description)
                        .await?
                }
                IngestSource::Text {
                    name,
                    content,
                    owner,
                    description,
                } => {
                    pipeline
                        .submit_text(&owner, &name, &content, description)
                        .await?
                }
            };

            print_report(&report);
        }

        Commands::List { owner, deleted } => {
            let pool = db::connect(&cfg).await?;
            let repo = feedstore::repository::Repository::new(pool);
            let docs = if deleted {
                repo.list_deleted(&owner).await?
            } else {
                repo.list_active(&owner).await?
            };

            if docs.is_empty() {
                println!("No documents.");
                return Ok(());
            }
            for doc in docs {
                let date = chrono::DateTime::from_timestamp(doc.updated_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  v{}  {}  {}  {} bytes  updated {}",
                    doc.id,
                    doc.version,
                    doc.source_kind.as_str(),
                    doc.name,
                    doc.raw_size,
                    date
                );
            }
        }

        Commands::Show { id, owner } => {
            let pool = db::connect(&cfg).await?;
            let repo = feedstore::repository::Repository::new(pool);
            let doc = repo.get_current(&id, &owner).await?;

            println!("{} (version {})", doc.name, doc.version);
            if let Some(ref description) = doc.description {
                println!("  description: {}", description);
            }
            println!("  kind: {}", doc.source_kind.as_str());
            println!("  size: {} bytes", doc.raw_size);
            println!(
                "  embedding: {}",
                match (&doc.embedding, &doc.embedding_model) {
                    (Some(_), Some(model)) => model.clone(),
                    _ => "none".to_string(),
                }
            );
            println!("  metadata: {}", serde_json::to_string(&doc.metadata)?);
            println!("  concepts: {}", serde_json::to_string(&doc.concept_map)?);
            println!();
            println!("{}", doc.processed_text);
        }

        Commands::Versions { id, owner, show } => {
            let pool = db::connect(&cfg).await?;
            let repo = feedstore::repository::Repository::new(pool);

            match show {
                Some(version) => {
                    let snapshot = repo.get_version(&id, version, &owner).await?;
                    println!("{} v{}", snapshot.document_id, snapshot.version);
                    println!("  created by: {}", snapshot.created_by);
                    println!(
                        "  embedding: {}",
                        if snapshot.embedding.is_some() { "yes" } else { "no" }
                    );
                    println!("  metadata: {}", serde_json::to_string(&snapshot.metadata)?);
                    println!();
                    println!("{}", snapshot.processed_text);
                }
                None => {
                    let versions = repo.list_versions(&id, &owner).await?;
                    if versions.is_empty() {
                        println!("No historical versions (document is at version 1).");
                        return Ok(());
                    }
                    for v in versions {
                        let date = chrono::DateTime::from_timestamp(v.created_at, 0)
                            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default();
                        println!(
                            "v{}  {}  by {}  embedding: {}",
                            v.version,
                            date,
                            v.created_by,
                            if v.has_embedding { "yes" } else { "no" }
                        );
                    }
                }
            }
        }

        Commands::Delete { id, owner, reason } => {
            let pool = db::connect(&cfg).await?;
            let repo = feedstore::repository::Repository::new(pool);
            repo.soft_delete(&id, &owner, &owner, reason).await?;
            println!("deleted {}", id);
            println!("ok");
        }

        Commands::Restore { id, owner } => {
            let pool = db::connect(&cfg).await?;
            let repo = feedstore::repository::Repository::new(pool);
            repo.restore(&id, &owner).await?;
            println!("restored {}", id);
            println!("ok");
        }

        Commands::Audit {
            document,
            actor,
            since,
            until,
        } => {
            let pool = db::connect(&cfg).await?;
            let entries = match (document, actor) {
                (Some(doc_id), _) => audit::list_for_document(&pool, &doc_id).await?,
                (None, Some(actor)) => {
                    let since = since.as_deref().map(|s| parse_date(s, false)).transpose()?;
                    let until = until.as_deref().map(|s| parse_date(s, true)).transpose()?;
                    audit::list_for_actor(&pool, &actor, since, until).await?
                }
                (None, None) => {
                    anyhow::bail!("audit requires --document or --actor");
                }
            };

            if entries.is_empty() {
                println!("No audit entries.");
                return Ok(());
            }
            for entry in entries {
                let date = chrono::DateTime::from_timestamp(entry.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}  by {}  reason: {}",
                    date,
                    entry.document_id.as_deref().unwrap_or("(purged)"),
                    entry.name,
                    entry.actor,
                    entry.reason.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Search {
            query,
            owner,
            limit,
            kind,
        } => {
            let pool = db::connect(&cfg).await?;
            let provider = feedstore::embedding::create_provider(&cfg.embedding)?;
            let kind_filter = kind.as_deref().map(SourceKind::parse).transpose()?;
            let limit = limit.unwrap_or(cfg.retrieval.final_limit);

            let hits = search::search_similar(
                &pool,
                provider.as_ref(),
                &owner,
                &query,
                limit,
                kind_filter,
            )
            .await?;

            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}  {}", i + 1, hit.score, hit.name, hit.document_id);
            }
        }
    }

    Ok(())
}
