//! Service configuration loaded from the environment (and `.env`).

use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::extract::{ExtractionStrategy, NumericFallback};
use crate::inference::BackendKind;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_OUTPUT_DIR: &str = "uploads";
const DEFAULT_OUTPUT_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024; // 100MB

/// Text-generation backend settings.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub kind: BackendKind,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Unset means the HTTP client's default (no timeout).
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub output_dir: PathBuf,
    pub output_ttl: Duration,
    pub max_upload_bytes: usize,
    /// Single allowed CORS origin; `None` means permissive.
    pub cors_origin: Option<String>,
    pub inference: InferenceConfig,
    pub extraction_strategy: ExtractionStrategy,
    pub numeric_fallback: NumericFallback,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:5000")?;

        let kind = match get("INFERENCE_BACKEND") {
            Some(s) => BackendKind::from_str(&s)
                .ok_or_else(|| anyhow!("Unknown INFERENCE_BACKEND: {}. Available: ollama, openrouter", s))?,
            None => BackendKind::Ollama,
        };

        let extraction_strategy = match get("EXTRACTION_STRATEGY") {
            Some(s) => ExtractionStrategy::from_str(&s).ok_or_else(|| {
                anyhow!(
                    "Unknown EXTRACTION_STRATEGY: {}. Available: marker_rounding, last_integer, verbatim",
                    s
                )
            })?,
            None => ExtractionStrategy::default(),
        };

        let numeric_fallback = match get("NUMERIC_FALLBACK") {
            Some(s) => NumericFallback::from_str(&s).ok_or_else(|| {
                anyhow!("Unknown NUMERIC_FALLBACK: {}. Available: keep_text, leave_empty", s)
            })?,
            None => NumericFallback::default(),
        };

        let timeout = get("INFERENCE_TIMEOUT_SECS")
            .map(|s| parse_u64("INFERENCE_TIMEOUT_SECS", &s))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let output_ttl = get("OUTPUT_TTL_SECS")
            .map(|s| parse_u64("OUTPUT_TTL_SECS", &s))
            .transpose()?
            .unwrap_or(DEFAULT_OUTPUT_TTL_SECS);

        let max_upload_bytes = get("MAX_UPLOAD_BYTES")
            .map(|s| parse_u64("MAX_UPLOAD_BYTES", &s))
            .transpose()?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Self {
            bind_addr,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string())),
            output_ttl: Duration::from_secs(output_ttl),
            max_upload_bytes,
            cors_origin: get("CORS_ORIGIN"),
            inference: InferenceConfig {
                kind,
                url: get("INFERENCE_URL").unwrap_or_else(|| kind.default_url().to_string()),
                model: get("INFERENCE_MODEL").unwrap_or_else(|| kind.default_model().to_string()),
                api_key: get("OPENROUTER_API_KEY"),
                timeout,
            },
            extraction_strategy,
            numeric_fallback,
        })
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.public_base_url, "http://localhost:5000");
        assert_eq!(config.output_dir, PathBuf::from("uploads"));
        assert_eq!(config.output_ttl, Duration::from_secs(3600));
        assert_eq!(config.inference.kind, BackendKind::Ollama);
        assert_eq!(config.inference.url, "http://localhost:11434");
        assert_eq!(config.inference.model, "llama3.2");
        assert_eq!(config.inference.timeout, None);
        assert_eq!(config.extraction_strategy, ExtractionStrategy::MarkerRounding);
        assert_eq!(config.numeric_fallback, NumericFallback::KeepText);
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("INFERENCE_BACKEND", "openrouter"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("INFERENCE_TIMEOUT_SECS", "30"),
            ("EXTRACTION_STRATEGY", "verbatim"),
            ("NUMERIC_FALLBACK", "leave_empty"),
            ("PUBLIC_BASE_URL", "https://sheets.example.com/"),
            ("CORS_ORIGIN", "http://localhost:3000"),
        ])
        .unwrap();
        assert_eq!(config.inference.kind, BackendKind::OpenRouter);
        assert_eq!(config.inference.url, BackendKind::OpenRouter.default_url());
        assert_eq!(config.inference.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.inference.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.extraction_strategy, ExtractionStrategy::VerbatimReplacement);
        assert_eq!(config.numeric_fallback, NumericFallback::LeaveEmpty);
        assert_eq!(config.public_base_url, "https://sheets.example.com");
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("INFERENCE_MODEL", "  "), ("INFERENCE_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(config.inference.model, "llama3.2");
        assert_eq!(config.inference.timeout, None);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config_from(&[("INFERENCE_BACKEND", "gpt4all")]).is_err());
        assert!(config_from(&[("EXTRACTION_STRATEGY", "vote")]).is_err());
        assert!(config_from(&[("OUTPUT_TTL_SECS", "soon")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "localhost")]).is_err());
    }
}
