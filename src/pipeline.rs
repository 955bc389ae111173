use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    chunking::{Chunk, ChunkingConfig},
    config::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_TOP_K},
    embedding::{Embedder, embed_documents},
    error::{Error, Result},
    generation::{ChatModel, Generator, ModelParams},
    prompt::GenerationRequest,
    retriever::{RetrievalResult, Retriever},
    vector_index::VectorIndex,
};

/// Where a pipeline run currently is.
///
/// Runs move strictly forward, `Idle -> Indexing -> Retrieving ->
/// Generating -> Done`, or drop to `Failed` from any working stage.
/// `Done` may start another retrieval or indexing pass. `Failed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Indexing,
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl Stage {
    /// Whether a pipeline in this stage may move to `next`.
    pub fn can_move_to(self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle | Indexing | Done, Indexing | Retrieving) => true,
            (Retrieving, Generating) | (Generating, Done) => true,
            _ => false,
        }
    }
}

/// Explicit parameters for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub model: ModelParams,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            model: ModelParams::default(),
        }
    }
}

/// A document split into chunks with their embeddings indexed.
///
/// `chunks[i]` is the chunk whose embedding sits at position `i` of the
/// index.
#[derive(Debug)]
pub struct IndexedDocument {
    chunks: Vec<Chunk>,
    index: VectorIndex,
}

impl IndexedDocument {
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub references: RetrievalResult,
    pub chunk_count: usize,
}

/// Chunk -> embed -> index, then retrieve -> assemble -> generate.
///
/// Each step consumes the previous step's output, so the steps run strictly
/// in sequence. A failing step moves the pipeline to [`Stage::Failed`] and
/// returns its error unchanged; nothing is retried. A failed pipeline
/// refuses further work with [`Error::PipelineFailed`].
pub struct Pipeline<'a, E, M> {
    embedder: &'a E,
    model: &'a M,
    options: PipelineOptions,
    stage: Stage,
}

impl<'a, E: Embedder, M: ChatModel> Pipeline<'a, E, M> {
    pub fn new(embedder: &'a E, model: &'a M, options: PipelineOptions) -> Self {
        Self {
            embedder,
            model,
            options,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Index `text` and answer `query` about it in one single-shot run.
    pub async fn run(
        &mut self,
        text: &str,
        query: &str,
        system_prompt: &str,
    ) -> Result<Answer> {
        let document = self.index_document(text).await?;
        self.answer(&document, query, system_prompt).await
    }

    /// Split, embed and index a document.
    pub async fn index_document(&mut self, text: &str) -> Result<IndexedDocument> {
        self.enter(Stage::Indexing)?;
        let result = self.build_index(text).await;
        self.settle(result)
    }

    /// Retrieve context for `query` from an indexed document and generate an
    /// answer from it.
    pub async fn answer(
        &mut self,
        document: &IndexedDocument,
        query: &str,
        system_prompt: &str,
    ) -> Result<Answer> {
        self.enter(Stage::Retrieving)?;
        let retrieved = Retriever::new(self.embedder)
            .retrieve(query, &document.index, &document.chunks, self.options.top_k)
            .await;
        let references = self.settle(retrieved)?;
        info!(retrieved = references.len(), "retrieval done");

        self.enter(Stage::Generating)?;
        let request =
            GenerationRequest::for_query(system_prompt, query, &references);
        let generated = Generator::new(self.model, self.options.model.clone())
            .send(&request)
            .await;
        let text = self.settle(generated)?;

        self.enter(Stage::Done)?;
        Ok(Answer {
            text,
            references,
            chunk_count: document.chunks.len(),
        })
    }

    async fn build_index(&self, text: &str) -> Result<IndexedDocument> {
        info!(chars = text.chars().count(), "indexing document");

        let chunks = self.options.chunking.split(text);
        info!(
            chunks = chunks.len(),
            chunk_size = self.options.chunking.chunk_size,
            overlap = self.options.chunking.overlap,
            "document split"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_documents(
            self.embedder,
            &texts,
            self.options.batch_size,
            self.options.concurrency,
        )
        .await?;

        let index = VectorIndex::build(embeddings)?;
        info!(
            vectors = index.len(),
            dimension = index.dimension().unwrap_or(0),
            "index built"
        );

        Ok(IndexedDocument { chunks, index })
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        if self.stage == Stage::Failed {
            warn!(to = ?stage, "refusing work on a failed pipeline");
            return Err(Error::PipelineFailed);
        }
        debug_assert!(
            self.stage.can_move_to(stage),
            "invalid stage transition {:?} -> {stage:?}",
            self.stage
        );
        info!(from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(stage = ?self.stage, error = %e, "pipeline run failed");
            self.stage = Stage::Failed;
        }
        result
    }
}
