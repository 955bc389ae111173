//! Deterministic stand-ins for the embedding and chat services.

use std::sync::Mutex;

use crate::{
    embedding::{Embedder, Embedding},
    error::{Error, Result},
    generation::{ChatMessage, ChatModel, ModelParams},
};

/// Word groups; each group is one dimension of the embedding.
const VOCABULARY: &[&[&str]] = &[
    &["cat", "cats"],
    &["sat", "sit", "sits", "sitting"],
    &["dog", "dogs"],
    &["ran", "run", "runs"],
    &["played", "play", "plays"],
];

/// Bag-of-words embedder over a tiny fixed vocabulary.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Embedding {
        let mut vector = vec![0.0; VOCABULARY.len()];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            if let Some(dim) =
                VOCABULARY.iter().position(|group| group.contains(&word))
            {
                vector[dim] += 1.0;
            }
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Chat model that replays a fixed outcome and records what it was sent.
pub struct ScriptedChatModel {
    reply: std::result::Result<String, String>,
    received: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().unwrap().clone()
    }
}

impl ChatModel for ScriptedChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &ModelParams,
    ) -> Result<String> {
        self.received.lock().unwrap().push(messages.to_vec());
        self.reply.clone().map_err(Error::Generation)
    }
}
