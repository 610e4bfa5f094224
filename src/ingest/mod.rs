
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use itertools::Itertools;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, split_document};
use crate::embeddings::EmbeddingClient;
use crate::store::{ChunkMetadata, VectorRecord, VectorStore};

/// Chunks embedded and upserted per provider round trip. Bounds memory and
/// leaves everything before a failed batch durably in the index.
const EMBED_BATCH_SIZE: usize = 100;

/// A loaded source document, discarded after chunking.
#[derive(Debug, Clone)]
struct Document {
    source: String,
    text: String,
    structured: bool,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Sources whose chunks were upserted, sorted and deduplicated.
    pub uploaded: Vec<String>,
    /// Sources skipped because the index already contained them.
    pub skipped: usize,
    /// Sources that failed to load or parse and were left out of the run.
    pub errors: Vec<String>,
}

impl IngestSummary {
    /// Human-readable one-line summary.
    #[inline]
    pub fn message(&self) -> String {
        format!(
            "Ingested {} source(s), skipped {} already present, {} error(s)",
            self.uploaded.len(),
            self.skipped,
            self.errors.len()
        )
    }
}

/// Orchestrates load, chunk, embed and upsert against one target index.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    embeddings: EmbeddingClient,
    store: VectorStore,
    chunking: ChunkingConfig,
    dimension: usize,
    batch_size: usize,
    dedup: bool,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(embeddings: EmbeddingClient, store: VectorStore, config: &Config) -> Self {
        Self {
            embeddings,
            store,
            chunking: config.chunking.clone(),
            dimension: config.embedding.dimension,
            batch_size: EMBED_BATCH_SIZE,
            dedup: true,
        }
    }

    /// Disable the best-effort skip of already-ingested sources.
    #[inline]
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest every `.txt`/`.md` file under `dir` (recursive).
    #[inline]
    pub fn ingest_dir(&self, dir: &Path, index_name: &str) -> Result<IngestSummary> {
        let files = collect_source_files(dir)
            .with_context(|| format!("Failed to enumerate documents in {}", dir.display()))?;

        info!(
            "Found {} candidate document(s) under {}",
            files.len(),
            dir.display()
        );

        self.ingest_files(&files, index_name)
    }

    /// Ingest a specific set of files.
    #[inline]
    pub fn ingest_files(&self, files: &[PathBuf], index_name: &str) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        let existing = if self.dedup {
            self.store.list_sources(index_name, self.dimension)
        } else {
            HashSet::new()
        };

        let mut fresh = Vec::new();
        for file in files {
            let source = file.display().to_string();
            if existing.contains(&source) {
                summary.skipped += 1;
            } else {
                fresh.push(file.clone());
            }
        }

        if summary.skipped > 0 {
            info!(
                "Skipping {} file(s) already present in index '{index_name}'",
                summary.skipped
            );
        }

        if fresh.is_empty() {
            info!("No new documents to ingest into '{index_name}'");
            return Ok(summary);
        }

        let documents = self.load_documents(&fresh, &mut summary);
        self.ingest_documents(documents, index_name, &mut summary)?;
        Ok(summary)
    }

    /// Fetch one document from a remote endpoint and ingest it. The endpoint
    /// URL becomes the `source` identifier.
    #[inline]
    pub fn ingest_remote(&self, endpoint: &Url, index_name: &str) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let source = endpoint.to_string();

        if self.dedup
            && self
                .store
                .list_sources(index_name, self.dimension)
                .contains(&source)
        {
            info!("Remote source {source} already present in '{index_name}'");
            summary.skipped = 1;
            return Ok(summary);
        }

        info!("Fetching remote source {source}");

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build()
            .into();

        let text = agent
            .get(endpoint.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("Failed to fetch remote source {source}"))?;

        let structured = endpoint.path().ends_with(".md");
        let documents = vec![Document {
            source,
            text,
            structured,
        }];

        self.ingest_documents(documents, index_name, &mut summary)?;
        Ok(summary)
    }

    /// Load files into documents, recording failures and dropping empties.
    fn load_documents(&self, files: &[PathBuf], summary: &mut IngestSummary) -> Vec<Document> {
        let mut documents = Vec::with_capacity(files.len());
        let mut empty_count = 0;

        for file in files {
            let source = file.display().to_string();
            match fs::read_to_string(file) {
                Ok(text) if text.trim().is_empty() => {
                    empty_count += 1;
                }
                Ok(text) => documents.push(Document {
                    source,
                    text,
                    structured: has_extension(file, "md"),
                }),
                Err(e) => {
                    warn!("Error loading document {source}: {e}");
                    summary.errors.push(source);
                }
            }
        }

        if empty_count > 0 {
            info!("Filtered out {empty_count} empty document(s)");
        }

        documents
    }

    /// Chunk, embed and upsert. A provider failure here aborts the remaining
    /// batches; whatever was upserted before it stays in the index.
    fn ingest_documents(
        &self,
        documents: Vec<Document>,
        index_name: &str,
        summary: &mut IngestSummary,
    ) -> Result<()> {
        if documents.is_empty() {
            info!("No documents loaded; nothing to ingest");
            return Ok(());
        }

        let mut chunks: Vec<(String, Chunk)> = Vec::new();
        for document in documents {
            let document_chunks =
                split_document(&document.text, document.structured, &self.chunking);
            if document_chunks.is_empty() {
                warn!(
                    "No text chunks were generated from {}; skipping",
                    document.source
                );
                continue;
            }
            for chunk in document_chunks {
                chunks.push((document.source.clone(), chunk));
            }
        }

        if chunks.is_empty() {
            info!("No chunks created from documents; nothing to upsert");
            return Ok(());
        }

        info!(
            "Created {} chunk(s); embedding and upserting into '{index_name}'",
            chunks.len()
        );

        let description = self
            .store
            .ensure_index(index_name, self.dimension)
            .with_context(|| format!("Failed to prepare index '{index_name}'"))?;

        let total_batches = chunks.len().div_ceil(self.batch_size);
        for (batch_number, batch) in chunks.chunks(self.batch_size).enumerate() {
            debug!("Processing batch {}/{}", batch_number + 1, total_batches);

            let texts: Vec<String> = batch.iter().map(|(_, c)| c.content.clone()).collect();
            let vectors = self
                .embeddings
                .embed_batch(&texts)
                .context("Embedding failed; aborting remaining batches")?;

            let created_at = Utc::now().to_rfc3339();
            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|((source, chunk), values)| VectorRecord {
                    id: Uuid::new_v4().to_string(),
                    values,
                    metadata: ChunkMetadata {
                        source: source.clone(),
                        text: chunk.content.clone(),
                        heading_path: chunk.heading_path.clone(),
                        chunk_index: chunk.chunk_index as u32,
                        created_at: created_at.clone(),
                    },
                })
                .collect();

            self.store
                .upsert(&description.host, &records)
                .context("Upsert failed; aborting remaining batches")?;
        }

        summary.uploaded = chunks
            .iter()
            .map(|(source, _)| source.clone())
            .unique()
            .sorted()
            .collect();

        info!(
            "Ingestion complete: {} source(s) uploaded to '{index_name}'",
            summary.uploaded.len()
        );

        Ok(())
    }
}

/// All `.txt` and `.md` files under `dir`, recursively, in stable order.
pub(crate) fn collect_source_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, files)?;
        } else if has_extension(&path, "txt") || has_extension(&path, "md") {
            files.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
