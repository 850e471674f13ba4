//! Ingestion pipeline orchestration.
//!
//! Coordinates the full submission flow: validation → content extraction →
//! concept extraction → embedding → version decision → atomic commit.
//! Extraction and concept failures abort the attempt with nothing
//! persisted; an unavailable embedding degrades the result (the document
//! is stored without a semantic index) but never aborts it.

use std::path::Path;

use sqlx::SqlitePool;

use crate::concepts::ConceptExtractor;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{FeedError, Result};
use crate::extract;
use crate::models::{IngestReport, SourceKind};
use crate::repository::{NewRevision, Repository};

pub struct Pipeline {
    config: Config,
    repository: Repository,
    concepts: ConceptExtractor,
    provider: Box<dyn EmbeddingProvider>,
}

impl Pipeline {
    pub fn new(config: Config, pool: SqlitePool) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        Ok(Self {
            config,
            repository: Repository::new(pool),
            concepts: ConceptExtractor::new(),
            provider,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Ingest an uploaded file. When `kind` is absent it is inferred from
    /// the declared name's extension; unknown extensions are rejected
    /// outright.
    pub async fn submit_file(
        &self,
        owner_id: &str,
        declared_name: &str,
        bytes: &[u8],
        kind: Option<SourceKind>,
        description: Option<String>,
    ) -> Result<IngestReport> {
        let kind = match kind {
            Some(kind) => kind,
            None => {
                let ext = Path::new(declared_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .ok_or_else(|| {
                        FeedError::UnsupportedKind(format!("no extension: {}", declared_name))
                    })?;
                SourceKind::from_extension(ext)?
            }
        };
        self.ingest(owner_id, declared_name, bytes, kind, description)
            .await
    }

    /// Ingest directly submitted text.
    pub async fn submit_text(
        &self,
        owner_id: &str,
        name: &str,
        content: &str,
        description: Option<String>,
    ) -> Result<IngestReport> {
        self.ingest(
            owner_id,
            name,
            content.as_bytes(),
            SourceKind::Direct,
            description,
        )
        .await
    }

    async fn ingest(
        &self,
        owner_id: &str,
        name: &str,
        raw: &[u8],
        kind: SourceKind,
        description: Option<String>,
    ) -> Result<IngestReport> {
        let owner_id = owner_id.trim();
        let name = name.trim();
        if owner_id.is_empty() {
            return Err(FeedError::Validation("owner id must not be empty".into()));
        }
        if name.is_empty() {
            return Err(FeedError::Validation(
                "document name must not be empty".into(),
            ));
        }

        let extracted = extract::extract(kind, raw, self.config.ingestion.max_upload_bytes)?;
        let entries = self.concepts.extract_concepts(&extracted.text);

        let fresh_embedding =
            embedding::embed_one(self.provider.as_ref(), &extracted.text).await;
        if fresh_embedding.is_none() && self.config.embedding.is_enabled() {
            tracing::warn!(
                owner = owner_id,
                document = name,
                "ingestion degraded: no embedding, document will miss semantic search until reprocessed"
            );
        }
        let embedded = fresh_embedding.is_some();
        let embedding_model = fresh_embedding
            .as_ref()
            .map(|_| self.provider.model_name().to_string());
        let concept_count = entries.len();

        let revision = NewRevision {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            description,
            source_kind: kind,
            raw_size: raw.len() as i64,
            processed_text: extracted.text,
            original_text: String::from_utf8_lossy(raw).into_owned(),
            metadata: extracted.metadata,
            concepts: entries,
            embedding: fresh_embedding,
            embedding_model,
            actor: owner_id.to_string(),
        };

        let outcome = self
            .repository
            .upsert_by_identity(revision, self.config.versioning.similarity_threshold)
            .await?;

        Ok(IngestReport {
            document_id: outcome.document_id,
            version: outcome.version,
            status: outcome.status,
            embedded,
            concept_count,
        })
    }
}
