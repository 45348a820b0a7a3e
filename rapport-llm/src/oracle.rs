//! Oracle call interface — the one seam to the text generator.
//!
//! The engine treats the generator as an opaque, unreliable black box behind
//! [`Oracle::generate`]. An HTTP implementation for Ollama and
//! OpenAI-compatible APIs ships here; hosts with their own generation stack
//! implement the trait instead.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{normalize_error_message, OracleError, Result};

/// Resolved token limits for one oracle call.
///
/// Resolution from connection profiles is the host's job; the engine only
/// ever sees the final pair.
#[derive(Debug, Clone, Copy)]
pub struct TokenLimits {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Optional prompt-side truncation length, in characters.
    pub truncation_length: Option<u32>,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            truncation_length: None,
        }
    }
}

/// A successful generation.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// The generated text.
    pub text: String,
    /// Which model produced it.
    pub model: String,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Tokens generated, when the backend reports it.
    pub tokens_generated: u32,
}

/// The oracle call contract.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate text for one prompt.
    ///
    /// # Errors
    /// Returns [`OracleError::EmptyOutput`] when the backend produced no
    /// usable text, and transport-shaped variants otherwise.
    async fn generate(&self, prompt: &str, limits: &TokenLimits) -> Result<GenerationOutput>;
}

// ---------------------------------------------------------------------------
// HTTP oracle
// ---------------------------------------------------------------------------

/// Provider backend for the HTTP oracle.
#[derive(Debug, Clone)]
pub enum OracleProvider {
    /// Ollama running locally.
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
        /// Model name.
        model: String,
    },
    /// OpenAI-compatible API (also works with Anthropic-compatible gateways).
    OpenAiCompatible {
        /// Base URL up to the API root.
        base_url: String,
        /// Bearer token.
        api_key: String,
        /// Model name.
        model: String,
    },
}

/// HTTP-backed oracle with a hard per-call timeout.
pub struct HttpOracle {
    provider: OracleProvider,
    http: Client,
    timeout_ms: u64,
    temperature: f32,
}

impl HttpOracle {
    /// Create a new HTTP oracle.
    #[must_use]
    pub fn new(provider: OracleProvider, timeout_ms: u64) -> Self {
        Self {
            provider,
            http: Client::new(),
            timeout_ms,
            temperature: 0.3,
        }
    }

    /// Override the sampling temperature (defaults to 0.3 — extraction wants
    /// consistency, not creativity).
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Truncate the prompt tail-first when a truncation length is set.
    fn effective_prompt<'a>(prompt: &'a str, limits: &TokenLimits) -> &'a str {
        match limits.truncation_length {
            Some(cap) if prompt.len() > cap as usize => {
                // Keep the tail: instructions and the freshest context live there.
                let cut = prompt.len() - cap as usize;
                let mut start = cut;
                while !prompt.is_char_boundary(start) {
                    start += 1;
                }
                &prompt[start..]
            }
            _ => prompt,
        }
    }

    async fn generate_ollama(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str,
        limits: &TokenLimits,
    ) -> Result<GenerationOutput> {
        let url = format!("{base_url}/api/generate");
        let body = json!({
            "model": model,
            "prompt": Self::effective_prompt(prompt, limits),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": limits.max_tokens,
            }
        });

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_ms)
                } else {
                    OracleError::Network(e.to_string())
                }
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .as_ref()
                .and_then(normalize_error_message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(%status, "ollama returned error: {message}");
            return Err(OracleError::Network(message));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        let text = payload["response"].as_str().unwrap_or("").to_string();
        if text.trim().is_empty() {
            return Err(OracleError::EmptyOutput);
        }

        debug!(latency_ms, "ollama call completed");
        Ok(GenerationOutput {
            text,
            model: model.to_string(),
            latency_ms,
            tokens_generated: payload["eval_count"].as_u64().unwrap_or(0) as u32,
        })
    }

    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        prompt: &str,
        limits: &TokenLimits,
    ) -> Result<GenerationOutput> {
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": model,
            "messages": [
                { "role": "user", "content": Self::effective_prompt(prompt, limits) },
            ],
            "max_tokens": limits.max_tokens,
            "temperature": self.temperature,
        });

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout_ms)
                } else {
                    OracleError::Network(e.to_string())
                }
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .as_ref()
                .and_then(normalize_error_message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(%status, "oracle API returned error: {message}");
            return Err(OracleError::Network(message));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.trim().is_empty() {
            return Err(OracleError::EmptyOutput);
        }

        debug!(latency_ms, "oracle API call completed");
        Ok(GenerationOutput {
            text,
            model: model.to_string(),
            latency_ms,
            tokens_generated: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0)
                as u32,
        })
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn generate(&self, prompt: &str, limits: &TokenLimits) -> Result<GenerationOutput> {
        match &self.provider {
            OracleProvider::Ollama { base_url, model } => {
                self.generate_ollama(base_url, model, prompt, limits).await
            }
            OracleProvider::OpenAiCompatible {
                base_url,
                api_key,
                model,
            } => {
                self.generate_openai(base_url, api_key, model, prompt, limits)
                    .await
            }
        }
    }
}
