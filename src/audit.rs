//! Deletion audit ledger.
//!
//! Append-only: every soft deletion writes exactly one entry carrying a
//! denormalized snapshot of the document's metadata at deletion time. No
//! update or delete operation is exposed; rows outlive the documents they
//! describe. Appends run inside the deleting transaction so an audit-less
//! deletion can never commit.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{FeedError, Result};
use crate::models::{ConceptMap, DeletionLogEntry, SourceKind};

/// Append one entry. Runs on the caller's executor, typically the open
/// soft-delete transaction; a failure here aborts that transaction.
pub async fn append<'e, E>(executor: E, entry: &DeletionLogEntry) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let concept_map_json = serde_json::to_string(&entry.concept_map)?;

    sqlx::query(
        r#"
        INSERT INTO deletion_log
            (id, document_id, name, source_kind, raw_size, concept_map_json, actor, reason, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.document_id)
    .bind(&entry.name)
    .bind(entry.source_kind.as_str())
    .bind(entry.raw_size)
    .bind(&concept_map_json)
    .bind(&entry.actor)
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(executor)
    .await
    .map_err(|e| FeedError::Audit(e.to_string()))?;

    Ok(())
}

/// Build a new entry for a document about to be deleted.
pub fn entry_for(
    document_id: &str,
    name: &str,
    source_kind: SourceKind,
    raw_size: i64,
    concept_map: ConceptMap,
    actor: &str,
    reason: Option<String>,
) -> DeletionLogEntry {
    DeletionLogEntry {
        id: Uuid::new_v4().to_string(),
        document_id: Some(document_id.to_string()),
        name: name.to_string(),
        source_kind,
        raw_size,
        concept_map,
        actor: actor.to_string(),
        reason,
        created_at: chrono::Utc::now().timestamp(),
    }
}

pub async fn list_for_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<DeletionLogEntry>> {
    let rows = sqlx::query(
        "SELECT * FROM deletion_log WHERE document_id = ? ORDER BY created_at, id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

pub async fn list_for_actor(
    pool: &SqlitePool,
    actor: &str,
    since: Option<i64>,
    until: Option<i64>,
) -> Result<Vec<DeletionLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM deletion_log
        WHERE actor = ? AND created_at >= ? AND created_at <= ?
        ORDER BY created_at, id
        "#,
    )
    .bind(actor)
    .bind(since.unwrap_or(0))
    .bind(until.unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DeletionLogEntry> {
    let kind: String = row.get("source_kind");
    let concept_map_json: String = row.get("concept_map_json");
    Ok(DeletionLogEntry {
        id: row.get("id"),
        document_id: row.get("document_id"),
        name: row.get("name"),
        source_kind: SourceKind::parse(&kind)?,
        raw_size: row.get("raw_size"),
        concept_map: serde_json::from_str(&concept_map_json)?,
        actor: row.get("actor"),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    })
}
