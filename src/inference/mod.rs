//! Text-generation backends consulted for missing-value guesses.
//!
//! Defines the [`InferenceBackend`] trait so the local model server (Ollama)
//! and a hosted chat API (OpenRouter) can be swapped via configuration.

pub mod ollama;
pub mod openrouter;

use std::sync::Arc;
use std::time::Duration;

use crate::config::InferenceConfig;

/// Failure of a single inference call. Either variant aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference transport failure: {0}")]
    Transport(String),
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Async trait implemented by each text-generation backend.
///
/// Implementations return the generated text trimmed of surrounding
/// whitespace. The output is untrusted prose, never a structured value.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Same as [`InferenceBackend::infer`], with the uploader's free-text
    /// instruction as extra guidance. Backends without a system channel ignore it.
    async fn infer_with_instruction(
        &self,
        prompt: &str,
        instruction: Option<&str>,
    ) -> Result<String, InferenceError> {
        let _ = instruction;
        self.infer(prompt).await
    }
}

/// Known backend identifiers used for configuration lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Ollama,
    OpenRouter,
}

impl BackendKind {
    /// Parse a configuration string into a backend kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Ollama => ollama::DEFAULT_URL,
            Self::OpenRouter => openrouter::OPENROUTER_API_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => ollama::DEFAULT_MODEL,
            Self::OpenRouter => openrouter::DEFAULT_MODEL,
        }
    }
}

/// Build the configured backend.
pub fn from_config(config: &InferenceConfig) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    let client = http_client(config.timeout)?;
    let backend: Arc<dyn InferenceBackend> = match config.kind {
        BackendKind::Ollama => Arc::new(ollama::OllamaClient::new(
            client,
            config.url.clone(),
            config.model.clone(),
        )),
        BackendKind::OpenRouter => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY environment variable not set"))?;
            Arc::new(
                openrouter::OpenRouterClient::new(client, api_key)
                    .with_url(config.url.clone())
                    .with_model(config.model.clone()),
            )
        }
    };
    Ok(backend)
}

fn http_client(timeout: Option<Duration>) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!(BackendKind::from_str("ollama"), Some(BackendKind::Ollama));
        assert_eq!(BackendKind::from_str(" OpenRouter "), Some(BackendKind::OpenRouter));
        assert_eq!(BackendKind::from_str("gpt"), None);
    }

    #[test]
    fn test_openrouter_requires_key() {
        let config = InferenceConfig {
            kind: BackendKind::OpenRouter,
            url: BackendKind::OpenRouter.default_url().to_string(),
            model: BackendKind::OpenRouter.default_model().to_string(),
            api_key: None,
            timeout: None,
        };
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn test_builds_ollama_backend() {
        let config = InferenceConfig {
            kind: BackendKind::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            timeout: Some(Duration::from_secs(5)),
        };
        let backend = from_config(&config).unwrap();
        assert_eq!(backend.name(), "ollama");
    }
}
