use crate::config::Config;
use crate::db;
use crate::error::Result;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Current-state table, keyed by document identity. Ingest identity is
    // (owner_id, name).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            source_kind TEXT NOT NULL,
            raw_size INTEGER NOT NULL,
            processed_text TEXT NOT NULL,
            original_text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            concept_map_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB,
            previous_embedding BLOB,
            embedding_model TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            deleted_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(owner_id, name)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Append-only version history. Deliberately no foreign key: history
    // outlives the parent row for audit purposes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_versions (
            document_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            processed_text TEXT NOT NULL,
            embedding BLOB,
            metadata_json TEXT NOT NULL,
            concept_map_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            PRIMARY KEY(document_id, version)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concept_entries (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            confidence REAL NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(document_id, kind, value)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Derived concept/location index consulted by targeted retrieval.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concept_locations (
            concept_key TEXT NOT NULL,
            document_id TEXT NOT NULL,
            location TEXT NOT NULL,
            PRIMARY KEY(concept_key, location)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Append-only deletion audit ledger. document_id is nullable: the
    // document row may later be purged by a retention process.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deletion_log (
            id TEXT PRIMARY KEY,
            document_id TEXT,
            name TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            raw_size INTEGER NOT NULL,
            concept_map_json TEXT NOT NULL,
            actor TEXT NOT NULL,
            reason TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id, deleted)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_concept_entries_document ON concept_entries(document_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_concept_locations_document ON concept_locations(document_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deletion_log_document ON deletion_log(document_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deletion_log_actor ON deletion_log(actor, created_at)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
