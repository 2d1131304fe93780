/// LLM Client: the single point of entry for all provider HTTP calls.
///
/// Every provider speaks the OpenAI-compatible chat-completions and embeddings
/// API. Which provider a request uses is decided by `resolver` / `providers`;
/// this module only sends the request and decodes the answer.
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
pub mod providers;
pub mod resolver;

use providers::ResolvedProvider;

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.3;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected the API key: {0}")]
    Authentication(String),

    #[error("provider rejected the request (status {status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("provider unavailable (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("no LLM provider is enabled and configured")]
    NoProviderAvailable,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if the provider returned any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Shared HTTP client for all providers, with retry and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
}

impl LlmClient {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .context("Failed to build LLM HTTP client")?,
        })
    }

    /// POSTs `body` to `url`. Retries on 429 (rate limit) and 5xx errors with
    /// exponential backoff; other 4xx statuses fail immediately.
    async fn post_with_retry<B: Serialize>(
        &self,
        url: &str,
        api_key: &str,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await;

            // Transport failures (timeouts, refused connections) are not retried.
            let response = response?;
            let status = response.status();

            if is_retryable(status) {
                if status == StatusCode::TOO_MANY_REQUESTS {
                    warn!("LLM provider rate limited the request ({url})");
                    last_error = Some(LlmError::RateLimited {
                        retries: MAX_RETRIES,
                    });
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!("LLM provider returned {}: {}", status, body);
                    last_error = Some(LlmError::Upstream {
                        status: status.as_u16(),
                        message: provider_message(body),
                    });
                }
                continue;
            }

            if !status.is_success() {
                let message = provider_message(response.text().await.unwrap_or_default());
                if status.as_u16() == 401 {
                    return Err(LlmError::Authentication(message));
                }
                return Err(LlmError::BadRequest {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Single-turn chat completion.
    pub async fn chat(
        &self,
        provider: &ResolvedProvider,
        prompt: &str,
        system: &str,
    ) -> Result<ChatResponse, LlmError> {
        let request = ChatRequest {
            model: &provider.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response: ChatResponse = self
            .post_with_retry(&provider.chat_url(), &provider.api_key, &request)
            .await?
            .json()
            .await?;

        if let Some(usage) = &response.usage {
            debug!(
                "LLM call succeeded ({} / {}): prompt_tokens={}, completion_tokens={}",
                provider.kind, provider.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response)
    }

    /// Calls the LLM and deserializes the text response as JSON.
    /// The JSON-only instruction is appended to `system`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        provider: &ResolvedProvider,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let system = format!("{system}\n\n{}", prompts::JSON_ONLY_SYSTEM);
        let response = self.chat(provider, prompt, &system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        parse_json_reply(text)
    }

    pub async fn embed(&self, provider: &ResolvedProvider, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbeddingRequest {
            model: &provider.embedding_model,
            input: text,
        };

        let response: EmbeddingResponse = self
            .post_with_retry(&provider.embeddings_url(), &provider.api_key, &request)
            .await?
            .json()
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

/// Only rate limiting and server errors are worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn provider_message(body: String) -> String {
    serde_json::from_str::<ProviderErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Parses a model reply as JSON, tolerating code fences and prose around the object.
fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let stripped = strip_json_fences(text);
    match serde_json::from_str(stripped) {
        Ok(value) => Ok(value),
        Err(first_err) => match (stripped.find('{'), stripped.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&stripped[start..=end]).map_err(LlmError::Parse)
            }
            _ => Err(LlmError::Parse(first_err)),
        },
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_server_errors_retry() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::OK));
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn reply_with_surrounding_prose_still_parses() {
        let value: serde_json::Value =
            parse_json_reply("Here is the analysis:\n{\"score\": 7}\nThanks").unwrap();
        assert_eq!(value["score"], 7);
    }

    #[test]
    fn reply_without_json_is_parse_error() {
        let err = parse_json_reply::<serde_json::Value>("no json here").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn provider_error_message_is_unwrapped() {
        let body = r#"{"error": {"message": "invalid api key", "type": "auth"}}"#;
        assert_eq!(provider_message(body.to_string()), "invalid api key");
        assert_eq!(provider_message("plain".to_string()), "plain");
    }

    #[test]
    fn empty_choice_has_no_text() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(response.text().is_none());
    }
}
