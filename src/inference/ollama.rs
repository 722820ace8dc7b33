//! Ollama local model server backend (`/api/generate`, non-streamed).

use super::{InferenceBackend, InferenceError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, InferenceError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            system,
        };

        debug!("Sending request to Ollama: model={}", self.model);

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(format!("Failed to reach Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Transport(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        parse_generate_response(&body)
    }
}

/// Pull the generated text out of an `/api/generate` payload.
fn parse_generate_response(body: &str) -> Result<String, InferenceError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(format!("Invalid JSON from Ollama: {}", e)))?;

    match parsed.response {
        Some(text) if !text.is_empty() => Ok(text.trim().to_string()),
        _ => Err(InferenceError::MalformedResponse(
            "Ollama response has no generated text".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl InferenceBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        self.generate(prompt, None).await
    }

    async fn infer_with_instruction(
        &self,
        prompt: &str,
        instruction: Option<&str>,
    ) -> Result<String, InferenceError> {
        let system = instruction.map(str::trim).filter(|s| !s.is_empty());
        self.generate(prompt, system).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_response() {
        let body = r#"{"model":"llama3.2","response":"  The age is approximately 34.\n","done":true}"#;
        assert_eq!(
            parse_generate_response(body).unwrap(),
            "The age is approximately 34."
        );
    }

    #[test]
    fn test_parse_missing_field_is_malformed() {
        let result = parse_generate_response(r#"{"done":true}"#);
        assert!(matches!(result, Err(InferenceError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_empty_text_is_malformed() {
        let result = parse_generate_response(r#"{"response":""}"#);
        assert!(matches!(result, Err(InferenceError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_invalid_json_is_malformed() {
        let result = parse_generate_response("<html>oops</html>");
        assert!(matches!(result, Err(InferenceError::MalformedResponse(_))));
    }

    #[test]
    fn test_request_omits_empty_system() {
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "p",
            stream: false,
            system: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "llama3.2", "prompt": "p", "stream": false}));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) on loopback is not expected to run an HTTP server.
        let client = OllamaClient::new(reqwest::Client::new(), "http://127.0.0.1:9", DEFAULT_MODEL);
        let result = client.infer("hello").await;
        assert!(matches!(result, Err(InferenceError::Transport(_))));
    }
}
