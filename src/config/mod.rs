
use std::env;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

/// Embedding model fixed by the ingestion pipeline; retrieval must use the
/// same model or stored vectors become meaningless.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";

/// Dimension produced by [`DEFAULT_EMBEDDING_MODEL`]. Must match the dimension
/// of every index this process writes to or queries.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

const DEFAULT_EMBEDDINGS_ENDPOINT: &str =
    "https://router.huggingface.co/hf-inference/models/sentence-transformers/all-mpnet-base-v2/pipeline/feature-extraction";

const DEFAULT_PINECONE_ENVIRONMENT: &str = "us-east-1";
const DEFAULT_DOCUMENTS_DIR: &str = "./documents";
const DEFAULT_EMBED_BATCH_SIZE: usize = 100;
const DEFAULT_RETRIEVAL_TOP_K: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub anthropic_api_key: String,
    pub pinecone_api_key: Option<String>,
    pub pinecone_environment: String,
    /// Index bound to the chat endpoint at startup, switchable at runtime.
    pub active_index: Option<String>,
    /// Remote source for the fetch-based ingester.
    pub ingest_api_endpoint: Option<Url>,
    pub huggingface_api_key: Option<String>,
    /// Staging directory holding uploaded documents pending ingestion.
    pub documents_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval_top_k: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub model: String,
    pub endpoint: Url,
    pub dimension: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: Url::parse(DEFAULT_EMBEDDINGS_ENDPOINT)
                .expect("default endpoint is a valid URL"),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY environment variable is not set")]
    MissingAnthropicKey,
    #[error("PINECONE_API_KEY is not set; vector store operations are unavailable")]
    MissingPineconeKey,
    #[error("Invalid URL in {var}: {value}")]
    InvalidUrl { var: String, value: String },
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid embed batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid retrieval top_k: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("Chunk size must be nonzero")]
    ZeroChunkSize,
}

impl Config {
    /// Build configuration from the process environment.
    ///
    /// `ANTHROPIC_API_KEY` is required; everything else falls back to a
    /// default. A missing `PINECONE_API_KEY` is tolerated here and rejected
    /// later, when a vector store client is actually constructed.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        let anthropic_api_key =
            non_empty_var("ANTHROPIC_API_KEY").ok_or(ConfigError::MissingAnthropicKey)?;

        let ingest_api_endpoint = match non_empty_var("INGEST_API_ENDPOINT") {
            Some(raw) => Some(
                Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl {
                    var: "INGEST_API_ENDPOINT".to_string(),
                    value: raw,
                })?,
            ),
            None => None,
        };

        let config = Self {
            anthropic_api_key,
            pinecone_api_key: non_empty_var("PINECONE_API_KEY"),
            pinecone_environment: non_empty_var("PINECONE_ENVIRONMENT")
                .unwrap_or_else(|| DEFAULT_PINECONE_ENVIRONMENT.to_string()),
            active_index: non_empty_var("ACTIVE_INDEX"),
            ingest_api_endpoint,
            huggingface_api_key: non_empty_var("HUGGINGFACE_API_KEY"),
            documents_dir: non_empty_var("RAGSERVE_DOCUMENTS_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_DOCUMENTS_DIR), PathBuf::from),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
        };

        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&self.embedding.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding.dimension,
            ));
        }

        if self.embedding.batch_size == 0 || self.embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding.batch_size));
        }

        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.retrieval_top_k));
        }

        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunking.chunk_overlap,
                size: self.chunking.chunk_size,
            });
        }

        Ok(())
    }

    /// API key for the vector store, or an error when it was never configured.
    #[inline]
    pub fn pinecone_api_key(&self) -> Result<&str, ConfigError> {
        self.pinecone_api_key
            .as_deref()
            .ok_or(ConfigError::MissingPineconeKey)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
impl Config {
    /// Baseline configuration for unit tests; override fields as needed.
    pub(crate) fn test_default() -> Self {
        Self {
            anthropic_api_key: "test-anthropic-key".to_string(),
            pinecone_api_key: Some("test-pinecone-key".to_string()),
            pinecone_environment: "us-east-1".to_string(),
            active_index: None,
            ingest_api_endpoint: None,
            huggingface_api_key: None,
            documents_dir: PathBuf::from("./documents"),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval_top_k: 4,
        }
    }
}
