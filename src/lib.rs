//! docrag - answer questions about a single document with retrieval-augmented
//! generation.
//!
//! A document is split into overlapping chunks, each chunk is embedded
//! through an OpenAI-compatible embeddings endpoint, and the embeddings are
//! held in an in-memory [`VectorIndex`]. A query is embedded the same way,
//! the closest chunks are looked up by cosine similarity, and the query plus
//! those chunks go to a chat model, whose reply is the answer.
//!
//! Nothing is persisted; the index lives for one run.
//!
//! # Quick start
//!
//! ```no_run
//! use docrag::{Config, ExtractorRegistry, OpenAiChatModel, OpenAiEmbedder, Pipeline};
//!
//! # async fn run() -> docrag::Result<()> {
//! let config = Config::load(None)?;
//! config.validate()?;
//! let endpoint = config.endpoint()?;
//!
//! let text = ExtractorRegistry::default().extract("report.md".as_ref())?;
//! let embedder = OpenAiEmbedder::new(&endpoint, &config.embedding.model)?;
//! let chat = OpenAiChatModel::new(&endpoint)?;
//!
//! let mut pipeline = Pipeline::new(&embedder, &chat, config.pipeline_options());
//! let answer = pipeline
//!     .run(&text, "What was the revenue in 2023?", &config.generation.system_prompt)
//!     .await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod vector_index;

#[cfg(test)]
mod testing;

pub use chunking::{Chunk, ChunkingConfig};
pub use config::{Config, Endpoint};
pub use embedding::{Embedder, OpenAiEmbedder};
pub use error::{Error, Result};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use generation::{ChatModel, Generator, ModelParams, OpenAiChatModel};
pub use pipeline::{Answer, Pipeline, PipelineOptions, Stage};
pub use retriever::{RetrievalResult, Retriever};
pub use vector_index::VectorIndex;
