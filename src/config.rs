//! Configuration loading and credential resolution.
//!
//! Everything here runs once at start-up. The pipeline components receive
//! the resolved values as plain parameters and never look at files or the
//! environment themselves.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chunking::ChunkingConfig,
    embedding::DEFAULT_EMBEDDING_MODEL,
    error::{Error, Result},
    generation::{DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE, ModelParams},
    pipeline::PipelineOptions,
    prompt::DEFAULT_SYSTEM_PROMPT,
};

pub const CONFIG_ENV_VAR: &str = "DOCRAG_CONFIG";
pub const API_KEY_ENV_VAR: &str = "DOCRAG_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "DOCRAG_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A resolved service endpoint shared by the embedding and chat clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Endpoint {
    /// The API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        mask(&self.api_key)
    }
}

fn mask(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let visible: String = secret.chars().skip(count - 4).collect();
    format!("{}{visible}", "*".repeat(count - 4))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Texts sent per embedding request.
    pub batch_size: usize,
    /// Embedding requests in flight at once.
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    /// Load the configuration from, in order of priority:
    /// 1. An explicit path (from --config), which must exist
    /// 2. The DOCRAG_CONFIG environment variable
    /// 3. The XDG config file (~/.config/docrag/config.toml), if present
    ///
    /// Falls back to built-in defaults when no file is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = if let Some(path) = explicit {
            Some(path.to_path_buf())
        } else if let Ok(val) = std::env::var(CONFIG_ENV_VAR) {
            Some(PathBuf::from(val))
        } else {
            default_config_path().filter(|p| p.is_file())
        };

        match path {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&contents).map_err(|e| {
            Error::Config(format!("{}: {e}", path.display()))
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.model_params().validate()?;
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("top_k must be at least 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.embedding.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the endpoint from the config file, falling back to the
    /// process environment for missing values.
    pub fn endpoint(&self) -> Result<Endpoint> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve the endpoint: a non-empty config value wins, otherwise
    /// `lookup` is asked for the corresponding environment variable.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<Endpoint>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |configured: &Option<String>, var: &str| {
            configured
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(var).filter(|v| !v.trim().is_empty()))
        };

        let api_key = pick(&self.endpoint.api_key, API_KEY_ENV_VAR)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no API key: set endpoint.api_key in the config file or {API_KEY_ENV_VAR}"
                ))
            })?;
        let base_url = pick(&self.endpoint.base_url, BASE_URL_ENV_VAR)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Endpoint {
            base_url,
            api_key,
            timeout: Duration::from_secs(self.endpoint.timeout_secs.max(1)),
        })
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.generation.model.clone(),
            temperature: self.generation.temperature,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            chunking: self.chunking,
            top_k: self.retrieval.top_k,
            batch_size: self.embedding.batch_size,
            concurrency: self.embedding.concurrency,
            model: self.model_params(),
        }
    }

    /// A copy safe to print: the API key, if any, is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.endpoint.api_key = copy.endpoint.api_key.as_deref().map(mask);
        copy
    }
}

fn default_config_path() -> Option<PathBuf> {
    xdg::BaseDirectories::with_prefix("docrag")
        .get_config_home()
        .map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retrieval.top_k, DEFAULT_TOP_K);
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::from_toml_str(
            r#"
            [endpoint]
            base_url = "http://localhost:11434/v1"
            api_key = "sk-file"
            timeout_secs = 10

            [generation]
            model = "qwen-plus"
            temperature = 0.7
            system_prompt = "You are a financial analyst."

            [embedding]
            model = "text-embedding-v2"
            batch_size = 8
            concurrency = 2

            [chunking]
            chunk_size = 512
            overlap = 128

            [retrieval]
            top_k = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.generation.model, "qwen-plus");
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.chunking.overlap, 128);
        assert_eq!(config.retrieval.top_k, 5);

        let options = config.pipeline_options();
        assert_eq!(options.top_k, 5);
        assert_eq!(options.model.temperature, 0.7);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("[retrieval]\ntopk = 3\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunking.overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embedding.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_value_wins_over_environment() {
        let mut config = Config::default();
        config.endpoint.api_key = Some("sk-file".into());
        config.endpoint.base_url = Some("http://file/v1".into());

        let endpoint = config
            .resolve_with(env(&[
                (API_KEY_ENV_VAR, "sk-env"),
                (BASE_URL_ENV_VAR, "http://env/v1"),
            ]))
            .unwrap();
        assert_eq!(endpoint.api_key, "sk-file");
        assert_eq!(endpoint.base_url, "http://file/v1");
    }

    #[test]
    fn environment_fills_missing_or_blank_values() {
        let mut config = Config::default();
        config.endpoint.api_key = Some("   ".into());

        let endpoint = config
            .resolve_with(env(&[
                (API_KEY_ENV_VAR, "sk-env"),
                (BASE_URL_ENV_VAR, "http://env/v1"),
            ]))
            .unwrap();
        assert_eq!(endpoint.api_key, "sk-env");
        assert_eq!(endpoint.base_url, "http://env/v1");
        assert_eq!(endpoint.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn base_url_defaults_when_unset() {
        let endpoint = Config::default()
            .resolve_with(env(&[(API_KEY_ENV_VAR, "sk-env")]))
            .unwrap();
        assert_eq!(endpoint.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = Config::default().resolve_with(env(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.retrieval.top_k, 7);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn redacted_masks_key() {
        let mut config = Config::default();
        config.endpoint.api_key = Some("sk-abcdef123456".into());
        let shown = config.redacted();
        assert_eq!(shown.endpoint.api_key.as_deref(), Some("***********3456"));
        assert_eq!(mask("abc"), "***");
    }
}
