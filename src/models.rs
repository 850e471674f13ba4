//! Core data models for the ingestion, versioning, and retrieval pipeline.
//!
//! These types represent documents, version snapshots, extracted concepts,
//! and audit records as they flow between the extractor, the embedding
//! adapter, and the repository.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Accepted source kinds. Anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Plain text file (encoding detected at extraction time).
    Plain,
    /// Delimited tabular text (CSV/TSV).
    Tabular,
    /// XLSX spreadsheet.
    Spreadsheet,
    /// Text submitted directly, no file involved.
    Direct,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Plain => "plain",
            SourceKind::Tabular => "tabular",
            SourceKind::Spreadsheet => "spreadsheet",
            SourceKind::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FeedError> {
        match s {
            "plain" => Ok(SourceKind::Plain),
            "tabular" => Ok(SourceKind::Tabular),
            "spreadsheet" => Ok(SourceKind::Spreadsheet),
            "direct" => Ok(SourceKind::Direct),
            other => Err(FeedError::UnsupportedKind(other.to_string())),
        }
    }

    /// Infer a kind from a file extension. Unknown extensions are an
    /// explicit rejection, never a best-effort parse.
    pub fn from_extension(ext: &str) -> Result<Self, FeedError> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "log" => Ok(SourceKind::Plain),
            "csv" | "tsv" => Ok(SourceKind::Tabular),
            "xlsx" => Ok(SourceKind::Spreadsheet),
            other => Err(FeedError::UnsupportedKind(format!(".{}", other))),
        }
    }
}

/// Structural metadata recorded by the content extractor, one shape per
/// source kind. Serialized as tagged JSON so consumers can validate shape
/// instead of assuming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StructuralMetadata {
    PlainText {
        encoding: String,
        line_count: usize,
    },
    Tabular {
        columns: Vec<String>,
        row_count: usize,
    },
    Spreadsheet {
        sheet_count: usize,
        row_count: usize,
        cell_count: usize,
    },
    Direct {
        char_count: usize,
    },
}

/// Output of the content extractor: canonical text plus structure.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub metadata: StructuralMetadata,
}

/// Kind of an extracted concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Email,
    Phone,
    DocumentRef,
    Name,
    Phrase,
}

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Email => "email",
            ConceptKind::Phone => "phone",
            ConceptKind::DocumentRef => "document_ref",
            ConceptKind::Name => "name",
            ConceptKind::Phrase => "phrase",
        }
    }
}

/// One extracted entity. Deterministic matchers carry confidence 1.0,
/// heuristics less.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptEntry {
    pub kind: ConceptKind,
    pub value: String,
    pub confidence: f64,
}

/// Derived concept key → location references. Keys are stable hashes of
/// kind + value + document identity; locations are `{document_id}_{kind}`
/// references consulted by downstream retrieval.
pub type ConceptMap = BTreeMap<String, Vec<String>>;

/// Current state of a document as stored in the repository.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub source_kind: SourceKind,
    pub raw_size: i64,
    pub processed_text: String,
    pub original_text: String,
    pub metadata: StructuralMetadata,
    pub concept_map: ConceptMap,
    pub embedding: Option<Vec<f32>>,
    pub previous_embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub version: i64,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Listing row: enough to display without loading content.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub source_kind: SourceKind,
    pub raw_size: i64,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: i64,
}

/// Immutable snapshot of a document's prior state, written exactly once
/// when a new version supersedes it.
#[derive(Debug, Clone)]
pub struct DocumentVersion {
    pub document_id: String,
    pub version: i64,
    pub processed_text: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: StructuralMetadata,
    pub concept_map: ConceptMap,
    pub created_at: i64,
    pub created_by: String,
}

/// Listing row for version history.
#[derive(Debug, Clone)]
pub struct VersionSummary {
    pub version: i64,
    pub created_at: i64,
    pub created_by: String,
    pub has_embedding: bool,
}

/// Append-only audit record written on every soft deletion.
#[derive(Debug, Clone)]
pub struct DeletionLogEntry {
    pub id: String,
    pub document_id: Option<String>,
    pub name: String,
    pub source_kind: SourceKind,
    pub raw_size: i64,
    pub concept_map: ConceptMap,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: i64,
}

/// How an ingestion call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// First ingestion under this identity; version 1 committed.
    Created,
    /// Content materially changed; a new version was committed.
    Updated,
    /// Content within the similarity threshold of the stored version;
    /// reprocessing was skipped and nothing was written.
    SkippedUnchanged,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Created => "created",
            IngestStatus::Updated => "updated",
            IngestStatus::SkippedUnchanged => "skipped — unchanged",
        }
    }
}

/// Result of a successful ingestion. `embedded == false` flags a degraded
/// ingestion: the document is stored but has no semantic index until it is
/// reprocessed.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub version: i64,
    pub status: IngestStatus,
    pub embedded: bool,
    pub concept_count: usize,
}

/// A ranked semantic search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document_id: String,
    pub name: String,
    pub score: f32,
}
