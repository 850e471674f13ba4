//! Embedding service adapter.
//!
//! Wraps the external embedding capability behind [`EmbeddingProvider`].
//! Unavailability is a first-class, non-exceptional outcome: a provider
//! that cannot be reached, times out, or returns vectors of the wrong
//! dimension yields `None` per text, and the pipeline stores the document
//! without a semantic index instead of failing the ingestion.
//!
//! Providers:
//! - **`local`** — a local model service speaking the ollama-compatible
//!   `POST /api/embed` contract; one batched request per call.
//! - **`mock`** — deterministic pseudo-vectors seeded from a hash of the
//!   text; used by tests and for model-less operation.
//! - **`disabled`** — always Unavailable.
//!
//! Also provides the vector utilities shared by versioning and retrieval:
//! [`cosine_similarity`], [`compare`], [`vec_to_blob`], [`blob_to_vec`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::{FeedError, Result};

/// Interface to an embedding backend. The vector dimension is fixed for
/// the lifetime of the system; implementations must refuse vectors of any
/// other width.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded on ingested documents.
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts. One outcome per input, positionally
    /// aligned; `None` marks an Unavailable result.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>>;
}

/// Embed a single text. Convenience wrapper for query-side use.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Option<Vec<f32>> {
    provider
        .embed_batch(&[text.to_string()])
        .await
        .into_iter()
        .next()
        .flatten()
}

/// Instantiate the provider selected by configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        "mock" => Ok(Box::new(MockProvider::new(config))),
        "disabled" => Ok(Box::new(DisabledProvider { dims: config.dims })),
        other => Err(FeedError::Validation(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled provider ============

/// Provider used when embeddings are not configured. Every result is
/// Unavailable; ingestion proceeds degraded.
pub struct DisabledProvider {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        vec![None; texts.len()]
    }
}

// ============ Local service provider ============

/// Local embedding service over HTTP (ollama-compatible `/api/embed`).
///
/// The request carries the whole batch; the service embeds it in one pass,
/// which is cheaper per item than repeated single calls. The HTTP timeout
/// is the adapter's only failure policy — on expiry the batch is reported
/// Unavailable, and any retry decision belongs to the caller.
pub struct LocalProvider {
    model: String,
    dims: usize,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedError::Validation(format!("http client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, String> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(format!("embedding service error {}: {}", status, body_text));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }

        match self.request(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors
                .into_iter()
                .map(|v| {
                    if v.len() == self.dims {
                        Some(v)
                    } else {
                        tracing::warn!(
                            got = v.len(),
                            want = self.dims,
                            "embedding dimension mismatch, treating as unavailable"
                        );
                        None
                    }
                })
                .collect(),
            Ok(vectors) => {
                tracing::warn!(
                    got = vectors.len(),
                    want = texts.len(),
                    "embedding count mismatch, treating batch as unavailable"
                );
                vec![None; texts.len()]
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding service unavailable");
                vec![None; texts.len()]
            }
        }
    }
}

// ============ Mock provider ============

/// Deterministic pseudo-embedding provider.
///
/// Vectors are seeded from a SHA-256 digest of the text, so identical text
/// always embeds to the identical (unit-norm) vector. Useful for tests and
/// for exercising the pipeline without a model service.
pub struct MockProvider {
    dims: usize,
}

impl MockProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self { dims: config.dims }
    }

    fn pseudo_vector(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dims);
        let mut counter = 0u32;
        while out.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            for byte in hasher.finalize() {
                if out.len() == self.dims {
                    break;
                }
                out.push((byte as f32 - 127.5) / 127.5);
            }
            counter += 1;
        }
        // Unit norm keeps cosine comparisons well conditioned.
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut out {
                *v /= norm;
            }
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        texts.iter().map(|t| Some(self.pseudo_vector(t))).collect()
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB of little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Returns 0.0 for empty or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Compare two possibly-absent embeddings. `None` is the defined
/// cannot-determine sentinel: the version engine treats it as changed.
pub fn compare(a: Option<&[f32]>, b: Option<&[f32]>) -> Option<f32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock(dims: usize) -> MockProvider {
        MockProvider { dims }
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn compare_sentinel_on_missing_side() {
        let v = vec![1.0f32, 0.0];
        assert_eq!(compare(None, Some(&v)), None);
        assert_eq!(compare(Some(&v), None), None);
        assert_eq!(compare(None, None), None);
        assert!(compare(Some(&v), Some(&v)).is_some());
    }

    #[tokio::test]
    async fn mock_is_deterministic_and_unit_norm() {
        let provider = mock(384);
        let a = embed_one(&provider, "hello world").await.unwrap();
        let b = embed_one(&provider, "hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        let c = embed_one(&provider, "something else").await.unwrap();
        assert!(cosine_similarity(&a, &c) < 0.99);
    }

    #[tokio::test]
    async fn disabled_provider_is_unavailable() {
        let provider = DisabledProvider { dims: 8 };
        let out = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;
        assert_eq!(out, vec![None, None]);
    }
}
