/**
 * Completion Provider Seam
 *
 * The language-model API is an external collaborator: one call that turns
 * a user message plus bounded recent history into a reply. The router only
 * depends on the `CompletionProvider` trait; the HTTP implementation talks
 * to an OpenAI-style chat-completions endpoint.
 *
 * # Failure Classes
 *
 * Provider failures never fail a user-visible send. The router maps every
 * `CompletionError` to the fixed fallback reply, so the taxonomy here only
 * needs to be precise enough for logging and rate-limit diagnostics.
 */

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::shared::message::{Message, Sender};

/// Reply produced by the completion provider
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub confidence: Option<f32>,
    pub model_id: Option<String>,
    pub token_count: Option<u32>,
}

/// Failures returned by a completion provider
#[derive(Debug, Error, Clone)]
pub enum CompletionError {
    /// Provider-side quota/rate limit
    #[error("Provider rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Provider unreachable or returned a server error
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Provider call exceeded its timeout
    #[error("Provider call timed out")]
    Timeout,

    /// Provider rejected our credential
    #[error("Provider rejected the API credential")]
    InvalidCredential,
}

/// Generate a reply given the new message and bounded recent history
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn generate(
        &self,
        content: &str,
        history: &[Message],
    ) -> Result<Completion, CompletionError>;
}

/// HTTP completion provider against an OpenAI-style chat endpoint
pub struct HttpCompletionProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl HttpCompletionProvider {
    /// Create a provider with the given request timeout
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_payload(&self, content: &str, history: &[Message]) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": "You are a helpful customer support assistant.",
        })];
        for message in history {
            let role = match message.sender {
                Sender::User => "user",
                Sender::Assistant => "assistant",
            };
            messages.push(serde_json::json!({"role": role, "content": message.content}));
        }
        messages.push(serde_json::json!({"role": "user", "content": content}));
        serde_json::json!({"model": self.model, "messages": messages})
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn generate(
        &self,
        content: &str,
        history: &[Message],
    ) -> Result<Completion, CompletionError> {
        let payload = self.build_payload(content, history);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CompletionError::InvalidCredential);
        }
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(CompletionError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(CompletionError::Unavailable(format!(
                "provider returned {}",
                status
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Unavailable(format!("bad provider response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CompletionError::Unavailable("provider returned no choices".into()))?;

        Ok(Completion {
            text,
            confidence: None,
            model_id: body.model,
            token_count: body.usage.map(|u| u.total_tokens),
        })
    }
}

/// Provider used when no completion endpoint is configured.
///
/// Always fails with `Unavailable`, which the router turns into the fixed
/// fallback reply, so the server stays usable without a provider.
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    async fn generate(
        &self,
        _content: &str,
        _history: &[Message],
    ) -> Result<Completion, CompletionError> {
        Err(CompletionError::Unavailable(
            "no completion provider configured".into(),
        ))
    }
}
