//! OpenAI-compatible `chat/completions` client with tool support.
//!
//! Talks to OpenRouter by default; any endpoint speaking the same protocol
//! works when configured as the base URL.

use super::models::Usage;
use super::{ChatModel, Message, ModelFuture, ModelReply, ToolCallMessage};
use crate::tools::ToolDefinition;
use anyhow::Context;
use geoscope_core::text::{sanitize_upstream_text, truncate_str, MAX_ERROR_CONTENT_LEN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate limit retry configuration
pub const MAX_RETRIES: u32 = 3;
pub const INITIAL_BACKOFF_MS: u64 = 2000;
pub const BACKOFF_MULTIPLIER: u64 = 2;

const MAX_COMPLETION_TOKENS: u32 = 4_096;
/// Low temperature keeps tool calling reliable.
const TOOL_CALL_TEMPERATURE: f32 = 0.2;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_completion_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

#[derive(Serialize, Clone)]
#[serde(untagged)]
enum ToolChoice {
    Mode(ToolChoiceMode),
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "snake_case")]
enum ToolChoiceMode {
    Auto,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Error response that can arrive with a 200 status for upstream failures.
#[derive(Deserialize)]
struct ProviderError {
    error: ProviderApiError,
}

#[derive(Deserialize)]
struct ProviderApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    completions_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: create_http_client(timeout_secs)?,
            completions_url: chat_completions_url(base_url),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_inner(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<ModelReply> {
        let has_tools = !tools.is_empty();
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            temperature: TOOL_CALL_TEMPERATURE,
            tools: has_tools.then_some(tools),
            tool_choice: has_tools.then_some(ToolChoice::Mode(ToolChoiceMode::Auto)),
            parallel_tool_calls: has_tools.then_some(true),
        };

        let text = send_with_retry(&self.http, &self.completions_url, &self.api_key, &request).await?;
        parse_chat_response(&text)
    }
}

impl ChatModel for OpenAiCompatClient {
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ModelFuture<'a> {
        Box::pin(self.complete_inner(messages, tools))
    }
}

fn parse_chat_response(text: &str) -> anyhow::Result<ModelReply> {
    let parsed: ChatResponse = serde_json::from_str(text).with_context(|| {
        format!(
            "Failed to parse chat completion: {}",
            sanitize_upstream_text(text)
        )
    })?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No response from AI"))?;
    Ok(ModelReply {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
        refusal: choice.message.refusal,
        usage: parsed.usage,
    })
}

pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Create a configured HTTP client for completion requests
pub fn create_http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

/// Send a request with automatic retry on transient failures.
///
/// Retries on:
/// - Network errors (timeout, connection failures)
/// - Rate limits (429)
/// - Server errors (5xx)
/// - 200-with-error responses
pub async fn send_with_retry<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    request_body: &T,
) -> anyhow::Result<String> {
    let mut last_error = String::new();
    let mut retry_count = 0;

    while retry_count <= MAX_RETRIES {
        let response = match client
            .post(url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/geoscope/geoscope")
            .header("X-Title", "GeoScope")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                last_error = err.to_string();
                if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    tracing::warn!(retry = retry_count, error = %err, "completion request failed; retrying");
                    tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                    continue;
                }
                return Err(map_timeout_error(err));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                last_error = err.to_string();
                if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                    continue;
                }
                return Err(map_timeout_error(err));
            }
        };

        if status.is_success() {
            if let Ok(err_resp) = serde_json::from_str::<ProviderError>(&text) {
                let is_retryable = err_resp
                    .error
                    .code
                    .map(|c| c >= 500 || c == 429)
                    .unwrap_or(true);

                if is_retryable && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    tracing::warn!(retry = retry_count, "provider returned an error body; retrying");
                    tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                    continue;
                }

                return Err(anyhow::anyhow!(
                    "Model provider error: {}",
                    truncate_str(&err_resp.error.message, MAX_ERROR_CONTENT_LEN)
                ));
            }

            return Ok(text);
        }

        last_error = text.clone();

        if status.as_u16() == 429 && retry_count < MAX_RETRIES {
            retry_count += 1;
            let retry_after = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
            tracing::warn!(retry = retry_count, wait_secs = retry_after, "rate limited by model provider");
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            continue;
        }

        if status.is_server_error() && retry_count < MAX_RETRIES {
            retry_count += 1;
            tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
            continue;
        }

        let error_msg = match status.as_u16() {
            401 => "Invalid API key. Set OPENROUTER_API_KEY (or OPENAI_API_KEY) and try again."
                .to_string(),
            429 => format!(
                "Rate limited by the model provider after {} retries. Try again in a few minutes.",
                retry_count
            ),
            500..=599 => format!(
                "Model provider server error ({}). The service may be temporarily unavailable.",
                status
            ),
            _ => format!("API error {}: {}", status, sanitize_upstream_text(&text)),
        };
        return Err(anyhow::anyhow!("{}", error_msg));
    }

    Err(anyhow::anyhow!("{}", sanitize_upstream_text(&last_error)))
}

/// Extract a retry-after hint ("retry after X seconds") from an error body.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    if let Some(pos) = text_lower.find("retry") {
        let after_retry = &text_lower[pos..];
        for word in after_retry.split_whitespace().skip(1).take(5) {
            if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
                if secs > 0 && secs < 300 {
                    return Some(secs);
                }
            }
        }
    }
    None
}

pub fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    let secs = ms / 1000;
    if secs == 0 {
        1
    } else {
        secs
    }
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_timeout_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow::anyhow!("Model request timed out. Please try again.")
    } else if err.is_connect() {
        anyhow::anyhow!("Could not connect to the model provider. Check your network and try again.")
    } else {
        err.into()
    }
}
