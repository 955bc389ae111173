use serde::Serialize;
use tracing::debug;

use crate::{
    chunking::Chunk,
    embedding::Embedder,
    error::Result,
    vector_index::VectorIndex,
};

/// A chunk selected for a query, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Position of the chunk in the document's chunk sequence.
    pub position: usize,
    pub score: f32,
    pub text: String,
}

/// Chunks ranked by descending similarity to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedChunk> {
        self.chunks.iter()
    }

    /// The chunk texts in ranked order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.text.as_str())
    }
}

/// Embeds a query and looks up the closest chunks in a [`VectorIndex`].
pub struct Retriever<'a, E> {
    embedder: &'a E,
}

impl<'a, E: Embedder> Retriever<'a, E> {
    pub fn new(embedder: &'a E) -> Self {
        Self { embedder }
    }

    /// Return the `k` chunks most similar to `query`.
    ///
    /// `chunks` must be the exact sequence whose embeddings built `index`;
    /// positions are mapped back by index. Asking for more results than
    /// the index holds returns everything it holds.
    ///
    /// # Panics
    ///
    /// Panics if `chunks.len()` differs from `index.len()`.
    pub async fn retrieve(
        &self,
        query: &str,
        index: &VectorIndex,
        chunks: &[Chunk],
        k: usize,
    ) -> Result<RetrievalResult> {
        assert_eq!(
            chunks.len(),
            index.len(),
            "chunk count must equal the number of indexed embeddings"
        );

        if index.is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query_embedding = self.embedder.embed_one(query).await?;
        let hits = index.search(&query_embedding, k)?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|hit| {
                debug!(
                    position = hit.position,
                    score = hit.score,
                    "retrieved chunk"
                );
                RetrievedChunk {
                    position: hit.position,
                    score: hit.score,
                    text: chunks[hit.position].text.clone(),
                }
            })
            .collect();

        Ok(RetrievalResult { chunks })
    }
}
