//! Prompt assembly for the generation step.

use crate::{generation::ChatMessage, retriever::RetrievalResult};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful assistant. \
Answer the user's question using only the numbered references that follow \
it. If the references do not contain the answer, say that you cannot find \
it in the document.";

/// Compose the user prompt: the query, then each retrieved chunk under a
/// numbered `reference N:` label in ranked order.
///
/// Pure function of its inputs. With nothing retrieved the prompt is the
/// query alone.
///
/// # Examples
///
/// ```
/// use docrag::prompt::assemble;
/// use docrag::retriever::RetrievalResult;
///
/// assert_eq!(assemble("What changed?", &RetrievalResult::default()), "What changed?");
/// ```
pub fn assemble(query: &str, retrieved: &RetrievalResult) -> String {
    if retrieved.is_empty() {
        return query.to_string();
    }

    let mut prompt = format!("{query}\n\n");
    for (i, text) in retrieved.texts().enumerate() {
        prompt.push_str(&format!("reference {}:\n{text}\n\n", i + 1));
    }
    prompt
}

/// The fixed pair of texts sent to the chat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    system: String,
    user: String,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Build the request for `query` grounded on `retrieved`.
    pub fn for_query(
        system: impl Into<String>,
        query: &str,
        retrieved: &RetrievalResult,
    ) -> Self {
        Self::new(system, assemble(query, retrieved))
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.as_str()),
            ChatMessage::user(self.user.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generation::Role, retriever::RetrievedChunk};

    fn retrieved(texts: &[&str]) -> RetrievalResult {
        RetrievalResult {
            chunks: texts
                .iter()
                .enumerate()
                .map(|(i, t)| RetrievedChunk {
                    position: i,
                    score: 1.0 - i as f32 * 0.1,
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn formats_numbered_references() {
        let prompt = assemble(
            "Where did the cat sit?",
            &retrieved(&["A cat sat. ", "sat. A dog ran. "]),
        );
        assert_eq!(
            prompt,
            "Where did the cat sit?\n\n\
             reference 1:\nA cat sat. \n\n\
             reference 2:\nsat. A dog ran. \n\n"
        );
    }

    #[test]
    fn empty_retrieval_is_query_only() {
        let prompt = assemble("Revenue in 2023?", &RetrievalResult::default());
        assert_eq!(prompt, "Revenue in 2023?");
        assert!(!prompt.contains("reference"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let r = retrieved(&["one", "two", "three"]);
        assert_eq!(assemble("q", &r), assemble("q", &r));
    }

    #[test]
    fn keeps_ranked_order() {
        let prompt = assemble("q", &retrieved(&["zeta", "alpha"]));
        assert!(prompt.find("zeta").unwrap() < prompt.find("alpha").unwrap());
    }

    #[test]
    fn request_messages() {
        let request =
            GenerationRequest::for_query("sys", "q", &retrieved(&["ctx"]));
        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "q\n\nreference 1:\nctx\n\n");
    }
}
