
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the hosted feature-extraction endpoint that turns text into
/// fixed-dimension vectors.
///
/// Ingestion and retrieval must share one instance (or clones of it) so both
/// sides embed with the same model and dimension.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            endpoint: config.embedding.endpoint.clone(),
            api_key: config.huggingface_api_key.clone(),
            model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            batch_size: config.embedding.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    #[inline]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Model identity, fixed per process.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimension every returned vector is checked against.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .context("Embedding endpoint returned no vector")
    }

    /// Embed many texts, batching requests to bound payload size.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with model {}", texts.len(), self.model);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request_json = serde_json::to_string(&json!({ "inputs": texts }))
            .context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                let mut request = self
                    .agent
                    .post(self.endpoint.as_str())
                    .header("Content-Type", "application/json");
                if let Some(key) = &self.api_key {
                    request = request.header("Authorization", &format!("Bearer {key}"));
                }
                request
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to call embedding endpoint")?;

        let vectors: Vec<Vec<f32>> = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if vectors.len() != texts.len() {
            anyhow::bail!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                vectors.len()
            );
        }

        for vector in &vectors {
            if vector.len() != self.dimension {
                // A wrong dimension would silently poison the index, so this
                // is a hard failure rather than something to paper over.
                anyhow::bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                );
            }
        }

        Ok(vectors)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Embedding server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(anyhow::anyhow!(
                                    "Embedding endpoint rejected request: HTTP {}",
                                    status
                                ));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Embedding transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!(
            "All retry attempts failed for embedding endpoint {}",
            self.endpoint
        );

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}
