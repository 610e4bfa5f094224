pub mod errors;
#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::ingest::{self, IngestionPipeline};
use crate::llm::LlmClient;
use crate::prompt;
use crate::retriever::Retriever;
use crate::store::{StoreError, VectorStore};

pub use errors::ApiError;

const MAX_QUERY_CHARS: usize = 1000;

/// Index the chat endpoint is currently bound to, with its resolved
/// data-plane host.
#[derive(Debug, Clone)]
pub struct ActiveIndex {
    pub name: String,
    pub host: String,
}

/// Shared handler state. Provider clients are cheap clones over shared
/// connection agents; the active index is the only mutable piece.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    embeddings: EmbeddingClient,
    store: VectorStore,
    llm: LlmClient,
    active: Arc<RwLock<Option<ActiveIndex>>>,
}

impl AppState {
    /// Build state and provider clients from configuration.
    #[inline]
    pub fn new(config: Config) -> Result<Self> {
        let embeddings = EmbeddingClient::new(&config);
        let store = VectorStore::new(&config).context("Vector store is not configured")?;
        let llm = LlmClient::new(&config);
        Ok(Self::with_clients(config, embeddings, store, llm))
    }

    #[inline]
    pub fn with_clients(
        config: Config,
        embeddings: EmbeddingClient,
        store: VectorStore,
        llm: LlmClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            embeddings,
            store,
            llm,
            active: Arc::new(RwLock::new(None)),
        }
    }

    /// Bind the configured default index, if any. A failure here only logs:
    /// the server still starts and /switch-db can recover later.
    #[inline]
    pub async fn restore_active_index(&self) {
        let Some(name) = self.config.active_index.clone() else {
            return;
        };

        let store = self.store.clone();
        let lookup = {
            let name = name.clone();
            tokio::task::spawn_blocking(move || store.describe_index(&name)).await
        };

        match lookup {
            Ok(Ok(description)) => {
                info!("Active index restored from configuration: '{name}'");
                *self.active.write().await = Some(ActiveIndex {
                    name,
                    host: description.host,
                });
            }
            Ok(Err(e)) => {
                warn!("Configured active index '{name}' is unavailable ({e}); starting without");
            }
            Err(e) => {
                warn!("Active index lookup failed ({e}); starting without");
            }
        }
    }

    async fn active_index(&self) -> Option<ActiveIndex> {
        self.active.read().await.clone()
    }
}

/// Run the HTTP API until the listener fails.
#[inline]
pub async fn serve(config: Config, port: u16) -> Result<()> {
    let state = AppState::new(config)?;
    state.restore_active_index().await;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!(
        "Listening on {}",
        listener.local_addr().context("Listener has no local address")?
    );

    axum::serve(listener, router(state))
        .await
        .context("Server error")
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/create-db", post(create_db))
        .route("/list-dbs", get(list_dbs))
        .route("/switch-db", post(switch_db))
        .route("/delete-db", post(delete_db))
        .route("/documents", get(list_documents))
        .route("/upload", post(upload))
        .route("/ingest", post(run_ingestion))
        .with_state(state)
}

/// Run a blocking provider call off the async runtime.
async fn run_blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(ApiError::Internal(anyhow!("Worker task failed: {e}"))),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::Validation("Query cannot be empty.".to_string()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::Validation(format!(
            "Query is too long. Maximum {MAX_QUERY_CHARS} characters allowed."
        )));
    }

    let active = state.active_index().await.ok_or(ApiError::NoActiveIndex)?;

    let retriever = Retriever::new(
        state.embeddings.clone(),
        state.store.clone(),
        active.name,
        active.host,
        state.config.retrieval_top_k,
    );
    let llm = state.llm.clone();

    let answer = run_blocking(move || {
        let context = retriever.retrieve(&query)?;
        let prompt_text = prompt::assemble(&context, &query);
        llm.complete(&prompt_text)
    })
    .await?;

    Ok(Json(json!({ "response": answer })))
}

#[derive(Debug, Deserialize)]
struct IndexRequest {
    name: String,
    dimension: Option<usize>,
    metric: Option<String>,
}

async fn create_db(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let name = validated_index_name(&request.name)?;
    let dimension = request.dimension.unwrap_or(state.config.embedding.dimension);
    let metric = request.metric.unwrap_or_else(|| "cosine".to_string());

    let store = state.store.clone();
    let result = {
        let name = name.clone();
        tokio::task::spawn_blocking(move || store.create_index(&name, dimension, &metric))
            .await
            .map_err(|e| ApiError::Internal(anyhow!("Worker task failed: {e}")))?
    };

    match result {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(json!({ "message": format!("Index '{name}' created.") })),
        )),
        Err(StoreError::AlreadyExists(_)) => Ok((
            StatusCode::OK,
            Json(json!({ "message": format!("Index '{name}' already exists.") })),
        )),
        Err(e) => Err(e.into()),
    }
}

async fn list_dbs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let indexes = run_blocking(move || store.list_indexes()).await?;
    let active = state.active_index().await.map(|a| a.name);

    Ok(Json(json!({ "indexes": indexes, "active_index": active })))
}

#[derive(Debug, Deserialize)]
struct NamedIndexRequest {
    name: String,
}

async fn switch_db(
    State(state): State<AppState>,
    Json(request): Json<NamedIndexRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = validated_index_name(&request.name)?;

    // Resolve before swapping so a bad target leaves the old index active.
    let store = state.store.clone();
    let description = {
        let name = name.clone();
        run_blocking(move || store.describe_index(&name)).await?
    };

    *state.active.write().await = Some(ActiveIndex {
        name: name.clone(),
        host: description.host,
    });

    info!("Active index switched to '{name}'");
    Ok(Json(json!({ "message": format!("Active index switched to '{name}'.") })))
}

async fn delete_db(
    State(state): State<AppState>,
    Json(request): Json<NamedIndexRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = validated_index_name(&request.name)?;

    // Deactivate first so chat cannot race against a dying index, and stays
    // deactivated even when the provider delete fails.
    {
        let mut active = state.active.write().await;
        if active.as_ref().is_some_and(|a| a.name == name) {
            info!("Deleting the active index '{name}'; chat is now unbound");
            *active = None;
        }
    }

    let store = state.store.clone();
    {
        let name = name.clone();
        run_blocking(move || store.delete_index(&name)).await?;
    }

    Ok(Json(json!({ "message": format!("Index '{name}' deleted.") })))
}

async fn list_documents(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let dir = state.config.documents_dir.clone();

    let files = run_blocking(move || -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let files = ingest::collect_source_files(&dir)
            .with_context(|| format!("Failed to list documents in {}", dir.display()))?;
        Ok(files
            .iter()
            .map(|f| f.strip_prefix(&dir).unwrap_or(f).display().to_string())
            .collect())
    })
    .await?;

    Ok(Json(json!({ "files": files })))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut index_name = None;
    let mut saved_names = Vec::new();
    let mut saved_paths = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() == Some("index_name") {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("Invalid index_name field: {e}")))?;
            if !value.trim().is_empty() {
                index_name = Some(value.trim().to_string());
            }
            continue;
        }

        let Some(file_name) = field.file_name().map(base_file_name) else {
            continue;
        };
        if !is_supported_document(&file_name) {
            return Err(ApiError::Validation(
                "Only .txt and .md files are supported.".to_string(),
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::Validation(format!(
                "Uploaded file '{file_name}' is empty."
            )));
        }

        let dir = state.config.documents_dir.clone();
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create documents directory")?;

        let path = dir.join(&file_name);
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("Failed to save '{file_name}'"))?;

        saved_names.push(file_name);
        saved_paths.push(path);
    }

    if saved_names.is_empty() {
        return Err(ApiError::Validation("No files were uploaded.".to_string()));
    }

    let message = if let Some(index) = index_name {
        let pipeline = IngestionPipeline::new(
            state.embeddings.clone(),
            state.store.clone(),
            state.config.as_ref(),
        );
        let summary = {
            let index = index.clone();
            run_blocking(move || pipeline.ingest_files(&saved_paths, &index)).await?
        };
        format!(
            "Saved {} file(s) and ingested into '{index}'. {}",
            saved_names.len(),
            summary.message()
        )
    } else {
        format!("Saved {} file(s).", saved_names.len())
    };

    Ok(Json(json!({ "message": message, "saved": saved_names })))
}

async fn run_ingestion(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let index = match state.active_index().await {
        Some(active) => active.name,
        None => state
            .config
            .active_index
            .clone()
            .ok_or_else(|| {
                ApiError::Validation(
                    "No index to ingest into. Switch to an index first.".to_string(),
                )
            })?,
    };

    let pipeline = IngestionPipeline::new(
        state.embeddings.clone(),
        state.store.clone(),
        state.config.as_ref(),
    );
    let dir = state.config.documents_dir.clone();

    let summary = {
        let index = index.clone();
        run_blocking(move || pipeline.ingest_dir(&dir, &index)).await?
    };

    Ok(Json(json!({ "message": summary.message() })))
}

fn validated_index_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(
            "Index name cannot be empty.".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Strip any client-supplied directory components.
fn base_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map_or_else(|| name.to_string(), |f| f.to_string_lossy().into_owned())
}

fn is_supported_document(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".md")
}
