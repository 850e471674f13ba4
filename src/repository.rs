//! Document repository: authoritative store for current state, version
//! history, and soft-delete lifecycle.
//!
//! All state-mutating operations on a single document identity are
//! mutually exclusive: an in-process lock registry keyed by
//! `owner_id/name` hands out try-locks, and the losing side of a race gets
//! [`FeedError::ConcurrencyConflict`] instead of being queued or merged.
//! The version bump itself (snapshot prior state, increment the counter,
//! write the new current state) is one SQLite transaction, so a reader can
//! never observe a counter without its matching snapshot row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::audit;
use crate::concepts::{build_concept_map, concept_key};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{FeedError, Result};
use crate::models::{
    ConceptEntry, ConceptKind, Document, DocumentSummary, DocumentVersion, IngestStatus,
    SourceKind, StructuralMetadata, VersionSummary,
};
use crate::versioning::{decide, VersionDecision};

/// Per-identity try-lock registry. One lock per document identity; the
/// losing side of a concurrent mutation is rejected, not queued.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    fn handle(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn try_acquire(&self, key: &str) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        self.handle(key)
            .try_lock_owned()
            .map_err(|_| FeedError::ConcurrencyConflict(key.to_string()))
    }
}

/// New content for a document identity, produced by the ingestion
/// pipeline and committed here.
pub struct NewRevision {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub source_kind: SourceKind,
    pub raw_size: i64,
    pub processed_text: String,
    pub original_text: String,
    pub metadata: StructuralMetadata,
    pub concepts: Vec<ConceptEntry>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub actor: String,
}

/// Outcome of committing a revision.
pub struct CommitOutcome {
    pub document_id: String,
    pub version: i64,
    pub status: IngestStatus,
}

pub struct Repository {
    pool: SqlitePool,
    locks: Arc<LockRegistry>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(LockRegistry::default()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn identity_key(owner_id: &str, name: &str) -> String {
        format!("{}/{}", owner_id, name)
    }

    /// Commit new content under a document identity, creating the
    /// document or versioning it according to the similarity decision.
    ///
    /// Holds the identity lock for the duration; a concurrent mutation of
    /// the same identity is rejected with `ConcurrencyConflict`.
    pub async fn upsert_by_identity(
        &self,
        revision: NewRevision,
        similarity_threshold: f32,
    ) -> Result<CommitOutcome> {
        let key = Self::identity_key(&revision.owner_id, &revision.name);
        let _guard = self.locks.try_acquire(&key)?;

        let existing = self
            .fetch_by_identity(&revision.owner_id, &revision.name)
            .await?;

        match existing {
            None => self.insert_initial(revision).await,
            Some(current) if current.deleted => {
                Err(FeedError::AlreadyDeleted(current.id.clone()))
            }
            Some(current) => {
                let decision = decide(
                    true,
                    current.embedding.as_deref(),
                    revision.embedding.as_deref(),
                    similarity_threshold,
                );

                match decision {
                    VersionDecision::Unchanged { .. } => Ok(CommitOutcome {
                        document_id: current.id,
                        version: current.version,
                        status: IngestStatus::SkippedUnchanged,
                    }),
                    VersionDecision::FirstVersion | VersionDecision::Changed { .. } => {
                        self.commit_new_version(&current, revision).await
                    }
                }
            }
        }
    }

    async fn insert_initial(&self, revision: NewRevision) -> Result<CommitOutcome> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let metadata_json = serde_json::to_string(&revision.metadata)?;
        let concept_map = build_concept_map(&id, &revision.concepts);
        let concept_map_json = serde_json::to_string(&concept_map)?;
        let embedding_blob = revision.embedding.as_deref().map(vec_to_blob);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, owner_id, name, description, source_kind, raw_size,
                 processed_text, original_text, metadata_json, concept_map_json,
                 embedding, previous_embedding, embedding_model, version,
                 deleted, deleted_at, deleted_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, 1, 0, NULL, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&revision.owner_id)
        .bind(&revision.name)
        .bind(&revision.description)
        .bind(revision.source_kind.as_str())
        .bind(revision.raw_size)
        .bind(&revision.processed_text)
        .bind(&revision.original_text)
        .bind(&metadata_json)
        .bind(&concept_map_json)
        .bind(&embedding_blob)
        .bind(&revision.embedding_model)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        replace_concepts(&mut tx, &id, &revision.concepts).await?;

        tx.commit().await?;

        Ok(CommitOutcome {
            document_id: id,
            version: 1,
            status: IngestStatus::Created,
        })
    }

    /// Snapshot the current state, bump the counter, and write the new
    /// current state — one transaction, per the core consistency
    /// invariant.
    async fn commit_new_version(
        &self,
        current: &Document,
        revision: NewRevision,
    ) -> Result<CommitOutcome> {
        let now = chrono::Utc::now().timestamp();
        let new_version = current.version + 1;

        let snapshot_metadata = serde_json::to_string(&current.metadata)?;
        let snapshot_map = serde_json::to_string(&current.concept_map)?;
        let snapshot_embedding = current.embedding.as_deref().map(vec_to_blob);

        let metadata_json = serde_json::to_string(&revision.metadata)?;
        let concept_map = build_concept_map(&current.id, &revision.concepts);
        let concept_map_json = serde_json::to_string(&concept_map)?;
        let embedding_blob = revision.embedding.as_deref().map(vec_to_blob);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO document_versions
                (document_id, version, processed_text, embedding,
                 metadata_json, concept_map_json, created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&current.id)
        .bind(current.version)
        .bind(&current.processed_text)
        .bind(&snapshot_embedding)
        .bind(&snapshot_metadata)
        .bind(&snapshot_map)
        .bind(now)
        .bind(&revision.actor)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE documents SET
                description = COALESCE(?, description),
                source_kind = ?,
                raw_size = ?,
                processed_text = ?,
                original_text = ?,
                metadata_json = ?,
                concept_map_json = ?,
                previous_embedding = embedding,
                embedding = ?,
                embedding_model = COALESCE(?, embedding_model),
                version = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&revision.description)
        .bind(revision.source_kind.as_str())
        .bind(revision.raw_size)
        .bind(&revision.processed_text)
        .bind(&revision.original_text)
        .bind(&metadata_json)
        .bind(&concept_map_json)
        .bind(&embedding_blob)
        .bind(&revision.embedding_model)
        .bind(new_version)
        .bind(now)
        .bind(&current.id)
        .execute(&mut *tx)
        .await?;

        replace_concepts(&mut tx, &current.id, &revision.concepts).await?;

        tx.commit().await?;

        Ok(CommitOutcome {
            document_id: current.id.clone(),
            version: new_version,
            status: IngestStatus::Updated,
        })
    }

    /// Current state of an active document. Soft-deleted documents are
    /// not surfaced here; `list_deleted` is the only read that shows them.
    pub async fn get_current(&self, document_id: &str, owner_id: &str) -> Result<Document> {
        let doc = self.fetch_by_id(document_id, owner_id).await?;
        if doc.deleted {
            return Err(FeedError::NotFound(document_id.to_string()));
        }
        Ok(doc)
    }

    pub async fn list_active(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        self.list(owner_id, false).await
    }

    pub async fn list_deleted(&self, owner_id: &str) -> Result<Vec<DocumentSummary>> {
        self.list(owner_id, true).await
    }

    async fn list(&self, owner_id: &str, deleted: bool) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, source_kind, raw_size, version, deleted, updated_at
            FROM documents
            WHERE owner_id = ? AND deleted = ?
            ORDER BY updated_at DESC, id
            "#,
        )
        .bind(owner_id)
        .bind(deleted)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.get("source_kind");
                Ok(DocumentSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    source_kind: SourceKind::parse(&kind)?,
                    raw_size: row.get("raw_size"),
                    version: row.get("version"),
                    deleted: row.get("deleted"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    /// Historical snapshots, oldest first. The current state is not a row
    /// here: a document at version N has N-1 snapshots.
    pub async fn list_versions(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Vec<VersionSummary>> {
        // Owner check against the parent row (deleted or not: history
        // persists for audit).
        self.fetch_by_id(document_id, owner_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT version, created_at, created_by, embedding IS NOT NULL AS has_embedding
            FROM document_versions
            WHERE document_id = ?
            ORDER BY version
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| VersionSummary {
                version: row.get("version"),
                created_at: row.get("created_at"),
                created_by: row.get("created_by"),
                has_embedding: row.get("has_embedding"),
            })
            .collect())
    }

    pub async fn get_version(
        &self,
        document_id: &str,
        version: i64,
        owner_id: &str,
    ) -> Result<DocumentVersion> {
        self.fetch_by_id(document_id, owner_id).await?;

        let row = sqlx::query(
            "SELECT * FROM document_versions WHERE document_id = ? AND version = ?",
        )
        .bind(document_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| FeedError::NotFound(format!("{} v{}", document_id, version)))?;

        let metadata_json: String = row.get("metadata_json");
        let concept_map_json: String = row.get("concept_map_json");
        let embedding: Option<Vec<u8>> = row.get("embedding");

        Ok(DocumentVersion {
            document_id: row.get("document_id"),
            version: row.get("version"),
            processed_text: row.get("processed_text"),
            embedding: embedding.as_deref().map(blob_to_vec),
            metadata: serde_json::from_str(&metadata_json)?,
            concept_map: serde_json::from_str(&concept_map_json)?,
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
        })
    }

    /// Soft-delete: hide from default reads, clear the live concept map,
    /// and append the audit entry — all in one transaction. Content,
    /// embedding, and version history stay intact.
    pub async fn soft_delete(
        &self,
        document_id: &str,
        owner_id: &str,
        actor: &str,
        reason: Option<String>,
    ) -> Result<()> {
        let doc = self.fetch_by_id(document_id, owner_id).await?;
        let key = Self::identity_key(&doc.owner_id, &doc.name);
        let _guard = self.locks.try_acquire(&key)?;

        // Re-read under the lock; the first fetch raced unlocked.
        let doc = self.fetch_by_id(document_id, owner_id).await?;
        if doc.deleted {
            return Err(FeedError::AlreadyDeleted(document_id.to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        let entry = audit::entry_for(
            &doc.id,
            &doc.name,
            doc.source_kind,
            doc.raw_size,
            doc.concept_map.clone(),
            actor,
            reason,
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE documents SET
                deleted = 1, deleted_at = ?, deleted_by = ?,
                concept_map_json = '{}', updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(actor)
        .bind(now)
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE concept_entries SET active = 0 WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM concept_locations WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        // An audit-less deletion must never commit.
        audit::append(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Restore a soft-deleted document. The concept/location map is
    /// rebuilt eagerly from the retained entries so the document is
    /// immediately retrievable again.
    pub async fn restore(&self, document_id: &str, owner_id: &str) -> Result<()> {
        let doc = self.fetch_by_id(document_id, owner_id).await?;
        let key = Self::identity_key(&doc.owner_id, &doc.name);
        let _guard = self.locks.try_acquire(&key)?;

        let doc = self.fetch_by_id(document_id, owner_id).await?;
        if !doc.deleted {
            return Err(FeedError::NotDeleted(document_id.to_string()));
        }

        let entries = self.fetch_concepts(&doc.id).await?;
        let concept_map = build_concept_map(&doc.id, &entries);
        let concept_map_json = serde_json::to_string(&concept_map)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE documents SET
                deleted = 0, deleted_at = NULL, deleted_by = NULL,
                concept_map_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&concept_map_json)
        .bind(now)
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE concept_entries SET active = 1 WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        insert_locations(&mut tx, &doc.id, &entries).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_concepts(&self, document_id: &str) -> Result<Vec<ConceptEntry>> {
        let rows = sqlx::query(
            "SELECT kind, value, confidence FROM concept_entries WHERE document_id = ? ORDER BY kind, value",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.get("kind");
                Ok(ConceptEntry {
                    kind: parse_concept_kind(&kind)?,
                    value: row.get("value"),
                    confidence: row.get("confidence"),
                })
            })
            .collect()
    }

    async fn fetch_by_identity(&self, owner_id: &str, name: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE owner_id = ? AND name = ?")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Owner-checked fetch regardless of deletion state. Internal: public
    /// readers go through `get_current` / the list methods.
    async fn fetch_by_id(&self, document_id: &str, owner_id: &str) -> Result<Document> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ? AND owner_id = ?")
            .bind(document_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| FeedError::NotFound(document_id.to_string()))?;

        document_from_row(&row)
    }
}

async fn replace_concepts(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document_id: &str,
    concepts: &[ConceptEntry],
) -> Result<()> {
    sqlx::query("DELETE FROM concept_entries WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM concept_locations WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;

    for entry in concepts {
        sqlx::query(
            r#"
            INSERT INTO concept_entries (id, document_id, kind, value, confidence, active)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(document_id)
        .bind(entry.kind.as_str())
        .bind(&entry.value)
        .bind(entry.confidence)
        .execute(&mut **tx)
        .await?;
    }

    insert_locations(tx, document_id, concepts).await
}

async fn insert_locations(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document_id: &str,
    concepts: &[ConceptEntry],
) -> Result<()> {
    for entry in concepts {
        let key = concept_key(document_id, entry.kind, &entry.value);
        let location = format!("{}_{}", document_id, entry.kind.as_str());
        sqlx::query(
            r#"
            INSERT INTO concept_locations (concept_key, document_id, location)
            VALUES (?, ?, ?)
            ON CONFLICT(concept_key, location) DO NOTHING
            "#,
        )
        .bind(&key)
        .bind(document_id)
        .bind(&location)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn parse_concept_kind(s: &str) -> Result<ConceptKind> {
    match s {
        "email" => Ok(ConceptKind::Email),
        "phone" => Ok(ConceptKind::Phone),
        "document_ref" => Ok(ConceptKind::DocumentRef),
        "name" => Ok(ConceptKind::Name),
        "phrase" => Ok(ConceptKind::Phrase),
        other => Err(FeedError::Validation(format!(
            "unknown concept kind in store: {}",
            other
        ))),
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let kind: String = row.get("source_kind");
    let metadata_json: String = row.get("metadata_json");
    let concept_map_json: String = row.get("concept_map_json");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let previous_embedding: Option<Vec<u8>> = row.get("previous_embedding");

    Ok(Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        source_kind: SourceKind::parse(&kind)?,
        raw_size: row.get("raw_size"),
        processed_text: row.get("processed_text"),
        original_text: row.get("original_text"),
        metadata: serde_json::from_str(&metadata_json)?,
        concept_map: serde_json::from_str(&concept_map_json)?,
        embedding: embedding.as_deref().map(blob_to_vec),
        previous_embedding: previous_embedding.as_deref().map(blob_to_vec),
        embedding_model: row.get("embedding_model"),
        version: row.get("version"),
        deleted: row.get("deleted"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_registry_rejects_second_acquire() {
        let registry = LockRegistry::default();
        let guard = registry.try_acquire("owner/doc").unwrap();
        let err = registry.try_acquire("owner/doc").unwrap_err();
        assert!(matches!(err, FeedError::ConcurrencyConflict(_)));
        drop(guard);
        assert!(registry.try_acquire("owner/doc").is_ok());
    }

    #[test]
    fn lock_registry_is_per_identity() {
        let registry = LockRegistry::default();
        let _a = registry.try_acquire("owner/a").unwrap();
        assert!(registry.try_acquire("owner/b").is_ok());
    }
}
