//! Semantic retrieval over stored document embeddings.
//!
//! The query text is embedded once, then candidates are ranked by cosine
//! similarity in Rust (fetch-all-then-rank; the corpus is per-owner and
//! modest). Soft-deleted documents and documents without a semantic index
//! are never candidates.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, embed_one, EmbeddingProvider};
use crate::error::{FeedError, Result};
use crate::models::{SearchHit, SourceKind};

pub async fn search_similar(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    owner_id: &str,
    query: &str,
    limit: i64,
    kind_filter: Option<SourceKind>,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Err(FeedError::Validation("query must not be empty".into()));
    }

    // Search cannot degrade: without a query vector there is nothing to
    // rank against.
    let query_vec = embed_one(provider, query)
        .await
        .ok_or(FeedError::EmbeddingUnavailable)?;

    let rows = sqlx::query(
        r#"
        SELECT id, name, source_kind, embedding
        FROM documents
        WHERE owner_id = ? AND deleted = 0 AND embedding IS NOT NULL
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<SearchHit> = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(filter) = kind_filter {
            let kind: String = row.get("source_kind");
            if SourceKind::parse(&kind)? != filter {
                continue;
            }
        }
        let blob: Vec<u8> = row.get("embedding");
        let vec = blob_to_vec(&blob);
        hits.push(SearchHit {
            document_id: row.get("id"),
            name: row.get("name"),
            score: cosine_similarity(&query_vec, &vec),
        });
    }

    // Score desc, id asc for a deterministic order.
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    hits.truncate(limit.max(0) as usize);

    Ok(hits)
}
