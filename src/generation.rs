use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::Endpoint,
    error::{Error, Result},
    openai::ApiClient,
    prompt::GenerationRequest,
};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Model selection and sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ModelParams {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature must be between 0.0 and {MAX_TEMPERATURE}, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// A chat-completion capability: role-tagged messages in, text out.
pub trait ChatModel: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ModelParams,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Sends an assembled prompt to a [`ChatModel`].
///
/// Fails closed: transport or service failures and empty replies are all
/// [`Error::Generation`]. Nothing is retried here.
pub struct Generator<'a, M> {
    model: &'a M,
    params: ModelParams,
}

impl<'a, M: ChatModel> Generator<'a, M> {
    pub fn new(model: &'a M, params: ModelParams) -> Self {
        Self { model, params }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub async fn generate(
        &self,
        system_prompt: &str,
        composed_prompt: &str,
    ) -> Result<String> {
        let request = GenerationRequest::new(system_prompt, composed_prompt);
        self.send(&request).await
    }

    pub async fn send(&self, request: &GenerationRequest) -> Result<String> {
        debug!(prompt = request.user(), "sending generation request");

        let reply = self
            .model
            .complete(&request.messages(), &self.params)
            .await
            .map_err(|e| match e {
                Error::Generation(_) => e,
                other => Error::Generation(other.to_string()),
            })?;

        if reply.trim().is_empty() {
            return Err(Error::Generation(format!(
                "model '{}' returned an empty response",
                self.params.model
            )));
        }

        info!(
            model = %self.params.model,
            chars = reply.chars().count(),
            "received answer"
        );
        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat completions from an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: ApiClient,
}

impl OpenAiChatModel {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(endpoint)?,
        })
    }
}

impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ModelParams,
    ) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &params.model,
            temperature: params.temperature,
            messages,
        };
        let response: ChatCompletionResponse = self
            .client
            .post_json("chat/completions", &request)
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                Error::Generation("response contained no message content".into())
            })
    }
}
