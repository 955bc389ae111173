//! Minimal client for OpenAI-compatible HTTP APIs.
//!
//! Only JSON POST requests with bearer authentication are needed: the
//! `/embeddings` and `/chat/completions` endpoints. Callers map [`ApiError`]
//! into the error of their own pipeline step.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    config::Endpoint,
    error::{Error, Result},
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let http = Client::builder().build().map_err(|e| {
            Error::Config(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            http,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            timeout: endpoint.timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `{base_url}/{path}` and decode the JSON reply.
    ///
    /// The whole exchange, including reading the body, is bounded by the
    /// endpoint timeout.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let exchange = async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
                .map_err(ApiError::Transport)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Status { status, body });
            }

            response.json::<T>().await.map_err(ApiError::Decode)
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.timeout)),
        };

        result.inspect_err(|e| warn!(url = %url, error = %e, "API request failed"))
    }
}
