use std::future::Future;

use futures_util::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::Endpoint,
    error::{Error, Result},
    openai::ApiClient,
};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// A dense vector representation of a piece of text.
pub type Embedding = Vec<f32>;

/// A text embedding capability.
///
/// Implementations must return exactly one embedding per input text, in
/// input order.
pub trait Embedder: Send + Sync {
    /// Embed a non-empty batch of texts.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send;

    /// Embed a single text, e.g. a query.
    fn embed_one(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Embedding>> + Send {
        let texts = vec![text.to_string()];
        async move {
            let mut embeddings = self.embed(&texts).await?;
            match (embeddings.pop(), embeddings.is_empty()) {
                (Some(embedding), true) => Ok(embedding),
                _ => Err(Error::EmbeddingService(
                    "expected exactly one embedding for a single input".into(),
                )),
            }
        }
    }
}

/// Embed every text in `texts`, `batch_size` texts per request with up to
/// `concurrency` requests in flight.
///
/// Results are merged by original position, so the output order matches
/// `texts` regardless of completion order. The first failing batch fails
/// the whole call.
pub async fn embed_documents<E: Embedder>(
    embedder: &E,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Embedding>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batches: Vec<&[String]> = texts.chunks(batch_size.max(1)).collect();
    debug!(
        texts = texts.len(),
        batches = batches.len(),
        concurrency,
        "embedding documents"
    );

    let results: Vec<Vec<Embedding>> = stream::iter(batches)
        .map(|batch| async move {
            let embeddings = embedder.embed(batch).await?;
            if embeddings.len() != batch.len() {
                return Err(Error::EmbeddingService(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            Ok(embeddings)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(results.into_iter().flatten().collect())
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: ApiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(endpoint: &Endpoint, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(endpoint)?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Err(Error::EmbeddingService(
                "cannot embed an empty batch".into(),
            ));
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };
        let response: EmbeddingsResponse = self
            .client
            .post_json("embeddings", &request)
            .await
            .map_err(|e| Error::EmbeddingService(e.to_string()))?;

        order_by_index(response.data, texts.len())
    }
}

/// Place each returned vector at its `index`, rejecting gaps, duplicates
/// and count mismatches.
fn order_by_index(
    data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Embedding>> {
    if data.len() != expected {
        return Err(Error::EmbeddingService(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for item in data {
        let index = item.index;
        let Some(slot) = slots.get_mut(index) else {
            return Err(Error::EmbeddingService(format!(
                "embedding index {index} out of range"
            )));
        };
        if slot.replace(item.embedding).is_some() {
            return Err(Error::EmbeddingService(format!(
                "duplicate embedding index {index}"
            )));
        }
    }

    // Every slot is filled: `expected` distinct in-range indices were seen.
    Ok(slots.into_iter().flatten().collect())
}
