use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub versioning: VersioningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Hard ceiling on raw upload size. Payloads above this are rejected
    /// before any parsing.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `local`, `mock`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Embedding dimension, fixed for the lifetime of the system. Changing
    /// it requires a full re-embedding migration.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Endpoint of the local embedding service (ollama-compatible).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout on the embedding call. On expiry the result is Unavailable,
    /// not a retryable error; retry policy belongs to the caller.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "all-minilm".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VersioningConfig {
    /// Cosine similarity at or above this value classifies a re-ingestion
    /// as unchanged (closed interval on the unchanged side).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.95
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
        }
    }
}

fn default_final_limit() -> i64 {
    10
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingestion.max_upload_bytes == 0 {
        anyhow::bail!("ingestion.max_upload_bytes must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "mock" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, or mock.",
            other
        ),
    }

    if !(-1.0..=1.0).contains(&config.versioning.similarity_threshold) {
        anyhow::bail!("versioning.similarity_threshold must be in [-1.0, 1.0]");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config: Config = toml::from_str("[db]\npath = \"/tmp/feeds.sqlite\"\n").unwrap();
        assert_eq!(config.ingestion.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.embedding.provider, "disabled");
        assert!(!config.embedding.is_enabled());
        assert!((config.versioning.similarity_threshold - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn threshold_override_parses() {
        let config: Config = toml::from_str(
            "[db]\npath = \"/tmp/feeds.sqlite\"\n[versioning]\nsimilarity_threshold = 0.8\n",
        )
        .unwrap();
        assert!((config.versioning.similarity_threshold - 0.8).abs() < f32::EPSILON);
    }
}
