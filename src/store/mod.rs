
use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const API_VERSION: &str = "2025-01";

/// Result-count cap for the best-effort source listing. The probe is an
/// approximation: indexes holding more vectors than this can under-report.
const SOURCE_PROBE_TOP_K: usize = 10_000;

/// How long to poll a freshly created index before giving up on readiness.
const CREATE_POLL_ATTEMPTS: u32 = 30;
const CREATE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Index '{0}' not found")]
    NotFound(String),
    #[error("Index '{0}' already exists")]
    AlreadyExists(String),
    #[error("Vector store rejected the request: {0}")]
    InvalidRequest(String),
    #[error("Vector store request failed: {0}")]
    Provider(String),
    #[error("Vector store unreachable: {0}")]
    Transport(String),
}

/// Client for a managed vector index service (Pinecone-style REST API).
///
/// Index lifecycle goes through the control plane; upserts and queries go to
/// the per-index data-plane host returned by [`describe_index`].
///
/// [`describe_index`]: VectorStore::describe_index
#[derive(Debug, Clone)]
pub struct VectorStore {
    api_key: String,
    environment: String,
    control_url: Url,
    agent: ureq::Agent,
}

/// One `(id, vector, metadata)` record as persisted in an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata stored beside every vector. `source` drives deduplication and
/// `text` is what retrieval hands back to the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_path: Option<String>,
    pub chunk_index: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    /// Data-plane host for upserts and queries.
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListIndexesResponse {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: CreateIndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct CreateIndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

impl VectorStore {
    /// Build a store client from configuration. Fails when no vector store
    /// API key was configured.
    #[inline]
    pub fn new(config: &Config) -> Result<Self, crate::config::ConfigError> {
        let api_key = config.pinecone_api_key()?.to_string();

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            api_key,
            environment: config.pinecone_environment.clone(),
            control_url: Url::parse(DEFAULT_CONTROL_URL)
                .expect("default control URL is a valid URL"),
            agent,
        })
    }

    /// Point the control plane somewhere else (tests, proxies).
    #[inline]
    pub fn with_control_url(mut self, control_url: Url) -> Self {
        self.control_url = control_url;
        self
    }

    /// List the names of all indexes.
    #[inline]
    pub fn list_indexes(&self) -> Result<Vec<String>, StoreError> {
        let url = self.control_endpoint("/indexes")?;
        let body = self.get(&url)?;

        let response: ListIndexesResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::Provider(format!("Failed to parse index list: {e}")))?;

        Ok(response.indexes.into_iter().map(|i| i.name).collect())
    }

    /// Describe one index, including its data-plane host.
    #[inline]
    pub fn describe_index(&self, name: &str) -> Result<IndexDescription, StoreError> {
        let url = self.control_endpoint(&format!("/indexes/{name}"))?;
        let body = self.get(&url).map_err(|e| match e {
            StoreError::Provider(msg) if msg.contains("HTTP 404") => {
                StoreError::NotFound(name.to_string())
            }
            other => other,
        })?;

        serde_json::from_str(&body)
            .map_err(|e| StoreError::Provider(format!("Failed to parse index description: {e}")))
    }

    /// Create an index with the given dimension and metric.
    ///
    /// Succeeds with `AlreadyExists` surfaced as an error value so callers
    /// can treat it as a no-op where appropriate.
    #[inline]
    pub fn create_index(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
    ) -> Result<(), StoreError> {
        let request = CreateIndexRequest {
            name,
            dimension,
            metric,
            spec: CreateIndexSpec {
                serverless: ServerlessSpec {
                    cloud: "aws",
                    region: &self.environment,
                },
            },
        };

        let url = self.control_endpoint("/indexes")?;
        let body = serde_json::to_string(&request)
            .map_err(|e| StoreError::Provider(format!("Failed to serialize request: {e}")))?;

        info!("Creating index '{name}' (dimension {dimension}, metric {metric})");

        self.post(&url, &body).map(|_| ()).map_err(|e| match e {
            StoreError::Provider(msg) if msg.contains("HTTP 409") => {
                StoreError::AlreadyExists(name.to_string())
            }
            StoreError::Provider(msg) if msg.contains("HTTP 400") || msg.contains("HTTP 422") => {
                StoreError::InvalidRequest(msg)
            }
            other => other,
        })
    }

    /// Delete an index. Missing indexes surface as `NotFound`.
    #[inline]
    pub fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        let url = self.control_endpoint(&format!("/indexes/{name}"))?;

        info!("Deleting index '{name}'");

        let result = self
            .agent
            .delete(url.as_str())
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .call();

        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(404)) => Err(StoreError::NotFound(name.to_string())),
            Err(ureq::Error::StatusCode(status)) => {
                Err(StoreError::Provider(format!("HTTP {status}")))
            }
            Err(e) => Err(StoreError::Transport(e.to_string())),
        }
    }

    /// Describe an index, creating it (and waiting for readiness) when it
    /// does not exist yet.
    #[inline]
    pub fn ensure_index(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<IndexDescription, StoreError> {
        match self.describe_index(name) {
            Ok(description) => Ok(description),
            Err(StoreError::NotFound(_)) => {
                match self.create_index(name, dimension, "cosine") {
                    Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
                self.wait_until_ready(name)
            }
            Err(e) => Err(e),
        }
    }

    fn wait_until_ready(&self, name: &str) -> Result<IndexDescription, StoreError> {
        for attempt in 1..=CREATE_POLL_ATTEMPTS {
            match self.describe_index(name) {
                Ok(description) if description.status.ready => return Ok(description),
                Ok(_) => {
                    debug!("Index '{name}' not ready yet (poll {attempt})");
                }
                // The control plane can briefly 404 right after creation.
                Err(StoreError::NotFound(_)) => {
                    debug!("Index '{name}' not visible yet (poll {attempt})");
                }
                Err(e) => return Err(e),
            }
            std::thread::sleep(CREATE_POLL_INTERVAL);
        }

        Err(StoreError::Provider(format!(
            "Index '{name}' did not become ready in time"
        )))
    }

    /// Upsert a batch of vectors to an index's data-plane host.
    #[inline]
    pub fn upsert(&self, host: &str, vectors: &[VectorRecord]) -> Result<usize, StoreError> {
        if vectors.is_empty() {
            return Ok(0);
        }

        let url = data_endpoint(host, "/vectors/upsert")?;
        let body = serde_json::to_string(&serde_json::json!({ "vectors": vectors }))
            .map_err(|e| StoreError::Provider(format!("Failed to serialize upsert: {e}")))?;

        let response = self.post(&url, &body)?;
        let parsed: UpsertResponse = serde_json::from_str(&response)
            .map_err(|e| StoreError::Provider(format!("Failed to parse upsert response: {e}")))?;

        debug!("Upserted {} vectors to {host}", parsed.upserted_count);
        Ok(parsed.upserted_count)
    }

    /// Query the nearest neighbors of `vector`, most similar first.
    #[inline]
    pub fn query(
        &self,
        host: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let url = data_endpoint(host, "/query")?;
        let body = serde_json::to_string(&serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        }))
        .map_err(|e| StoreError::Provider(format!("Failed to serialize query: {e}")))?;

        let response = self.post(&url, &body)?;
        let parsed: QueryResponse = serde_json::from_str(&response)
            .map_err(|e| StoreError::Provider(format!("Failed to parse query response: {e}")))?;

        Ok(parsed.matches)
    }

    /// Best-effort set of `source` metadata values already present in an
    /// index, collected by querying with a zero vector and reading back
    /// metadata.
    ///
    /// Bounded by [`SOURCE_PROBE_TOP_K`], so this is a heuristic membership
    /// check, not an exact one. Any failure degrades to an empty set: the
    /// caller then re-ingests rather than erroring out.
    #[inline]
    pub fn list_sources(&self, name: &str, dimension: usize) -> HashSet<String> {
        let probe = || -> Result<HashSet<String>, StoreError> {
            let description = self.describe_index(name)?;
            let zero = vec![0.0f32; dimension];
            let matches = self.query(&description.host, &zero, SOURCE_PROBE_TOP_K)?;
            Ok(matches
                .into_iter()
                .filter_map(|m| m.metadata)
                .map(|m| m.source)
                .collect())
        };

        match probe() {
            Ok(sources) => {
                info!("Found {} existing sources in index '{name}'", sources.len());
                sources
            }
            Err(e) => {
                warn!(
                    "Could not list existing sources for '{name}' ({e}); assuming none"
                );
                HashSet::new()
            }
        }
    }

    fn control_endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.control_url
            .join(path)
            .map_err(|e| StoreError::Provider(format!("Invalid control URL: {e}")))
    }

    fn get(&self, url: &Url) -> Result<String, StoreError> {
        self.agent
            .get(url.as_str())
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(map_transport_error)
    }

    fn post(&self, url: &Url, body: &str) -> Result<String, StoreError> {
        self.agent
            .post(url.as_str())
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("X-Pinecone-API-Version", API_VERSION)
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(map_transport_error)
    }
}

fn map_transport_error(error: ureq::Error) -> StoreError {
    match error {
        ureq::Error::StatusCode(status) => StoreError::Provider(format!("HTTP {status}")),
        other => StoreError::Transport(other.to_string()),
    }
}

/// Data-plane hosts come back from the control plane without a scheme.
fn data_endpoint(host: &str, path: &str) -> Result<Url, StoreError> {
    let base = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };

    Url::parse(&base)
        .and_then(|u| u.join(path))
        .map_err(|e| StoreError::Provider(format!("Invalid data-plane host '{host}': {e}")))
}
