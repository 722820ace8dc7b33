//! OpenRouter (OpenAI-compatible chat completions) backend.

use super::{InferenceBackend, InferenceError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.2-3b-instruct";

/// OpenRouter client for chat completions.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            url: OPENROUTER_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Create a client with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send a single non-streamed chat completion request.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String, InferenceError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(512),
            stream: false,
        };

        debug!("Sending request to OpenRouter: model={}", request.model);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                InferenceError::Transport(format!("Failed to send request to OpenRouter: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Transport(format!(
                "OpenRouter API error ({}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        parse_chat_response(&body)
    }
}

fn parse_chat_response(body: &str) -> Result<String, InferenceError> {
    let response: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        InferenceError::MalformedResponse(format!("Failed to parse OpenRouter response: {}", e))
    })?;

    if let Some(usage) = &response.usage {
        info!(
            "OpenRouter response: {} tokens (prompt: {}, completion: {})",
            usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
        );
    }

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            InferenceError::MalformedResponse("OpenRouter response has no message content".into())
        })
}

#[async_trait::async_trait]
impl InferenceBackend for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        self.chat(vec![Message::user(prompt)]).await
    }

    async fn infer_with_instruction(
        &self,
        prompt: &str,
        instruction: Option<&str>,
    ) -> Result<String, InferenceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(instruction) = instruction.map(str::trim).filter(|s| !s.is_empty()) {
            messages.push(Message::system(instruction));
        }
        messages.push(Message::user(prompt));
        self.chat(messages).await
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Message {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": " Around 40. "}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Around 40.");
    }

    #[test]
    fn test_parse_without_usage() {
        let body = r#"{"choices": [{"message": {"content": "Lyon"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Lyon");
    }

    #[test]
    fn test_parse_no_choices_is_malformed() {
        let result = parse_chat_response(r#"{"choices": []}"#);
        assert!(matches!(result, Err(InferenceError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_null_content_is_malformed() {
        let result = parse_chat_response(r#"{"choices": [{"message": {"content": null}}]}"#);
        assert!(matches!(result, Err(InferenceError::MalformedResponse(_))));
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(Message::system("be brief")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "be brief"}));
    }
}
