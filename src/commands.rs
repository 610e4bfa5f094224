use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::ingest::IngestionPipeline;
use crate::server;
use crate::store::{StoreError, VectorStore};

/// Run the HTTP API server until it is shut down.
#[inline]
pub async fn serve(config: Config, port: u16) -> Result<()> {
    server::serve(config, port).await
}

/// Run the ingestion pipeline from the staging directory, or from the
/// configured remote endpoint with `remote`.
#[inline]
pub fn ingest(config: &Config, index: Option<String>, remote: bool) -> Result<()> {
    let index = index
        .or_else(|| config.active_index.clone())
        .context("No target index; pass --index or set ACTIVE_INDEX")?;

    let embeddings = EmbeddingClient::new(config);
    let store = VectorStore::new(config).context("Vector store is not configured")?;
    let pipeline = IngestionPipeline::new(embeddings, store, config);

    let summary = if remote {
        let endpoint = config
            .ingest_api_endpoint
            .as_ref()
            .context("INGEST_API_ENDPOINT is not set")?;
        pipeline.ingest_remote(endpoint, &index)?
    } else {
        info!(
            "Ingesting documents from {} into '{index}'",
            config.documents_dir.display()
        );
        pipeline.ingest_dir(&config.documents_dir, &index)?
    };

    for source in &summary.uploaded {
        println!("  uploaded: {source}");
    }
    for source in &summary.errors {
        println!("  failed: {source}");
    }
    println!("{}", summary.message());

    Ok(())
}

/// One-time index setup.
#[inline]
pub fn create_index(config: &Config, name: &str, dimension: Option<usize>) -> Result<()> {
    let store = VectorStore::new(config).context("Vector store is not configured")?;
    let dimension = dimension.unwrap_or(config.embedding.dimension);

    match store.create_index(name, dimension, "cosine") {
        Ok(()) => println!("Created index '{name}' (dimension {dimension}, metric cosine)."),
        Err(StoreError::AlreadyExists(_)) => println!("Index '{name}' already exists."),
        Err(e) => return Err(e).context("Failed to create index"),
    }

    Ok(())
}

#[inline]
pub fn list_indexes(config: &Config) -> Result<()> {
    let store = VectorStore::new(config).context("Vector store is not configured")?;
    let indexes = store.list_indexes().context("Failed to list indexes")?;

    if indexes.is_empty() {
        println!("No indexes found.");
        return Ok(());
    }

    println!("Indexes:");
    for name in indexes {
        let marker = if config.active_index.as_deref() == Some(name.as_str()) {
            " (active)"
        } else {
            ""
        };
        println!("  {name}{marker}");
    }

    Ok(())
}

#[inline]
pub fn delete_index(config: &Config, name: &str) -> Result<()> {
    let store = VectorStore::new(config).context("Vector store is not configured")?;
    store
        .delete_index(name)
        .with_context(|| format!("Failed to delete index '{name}'"))?;

    println!("Deleted index '{name}'.");
    if config.active_index.as_deref() == Some(name) {
        println!("Note: ACTIVE_INDEX still names '{name}'; update your environment.");
    }

    Ok(())
}
