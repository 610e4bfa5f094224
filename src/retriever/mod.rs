
use anyhow::{Context, Result};
use tracing::debug;

use crate::embeddings::EmbeddingClient;
use crate::prompt::NO_CONTEXT_SENTINEL;
use crate::store::VectorStore;

/// Maps a query to the text of its most similar stored chunks.
///
/// Holds the same embedding client the ingestion pipeline uses, which is what
/// keeps query vectors dimensionally and semantically compatible with the
/// stored ones.
#[derive(Debug, Clone)]
pub struct Retriever {
    embeddings: EmbeddingClient,
    store: VectorStore,
    index_name: String,
    /// Data-plane host the index was resolved to when it became active.
    host: String,
    top_k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(
        embeddings: EmbeddingClient,
        store: VectorStore,
        index_name: impl Into<String>,
        host: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embeddings,
            store,
            index_name: index_name.into(),
            host: host.into(),
            top_k,
        }
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Embed the query, fetch its nearest neighbors and concatenate their
    /// texts in descending similarity order, separated by blank lines.
    ///
    /// Zero neighbors is not an error: the fixed sentinel context is returned
    /// so the LLM can still attempt a general-knowledge answer.
    #[inline]
    pub fn retrieve(&self, query: &str) -> Result<String> {
        let vector = self
            .embeddings
            .embed(query)
            .context("Failed to embed query")?;

        let mut matches = self
            .store
            .query(&self.host, &vector, self.top_k)
            .with_context(|| format!("Failed to query index '{}'", self.index_name))?;

        // The store returns results ordered by similarity; keep that order
        // stable even if a provider shuffles ties.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        let texts: Vec<String> = matches
            .into_iter()
            .filter_map(|m| m.metadata)
            .map(|m| m.text)
            .filter(|t| !t.trim().is_empty())
            .collect();

        debug!(
            "Retrieved {} context chunks from '{}'",
            texts.len(),
            self.index_name
        );

        if texts.is_empty() {
            return Ok(NO_CONTEXT_SENTINEL.to_string());
        }

        Ok(texts.join("\n\n"))
    }
}
