use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use wispbit_core::{Result, WispbitError};

use crate::types::{
    ChatBackend, ChatRequest, Completion, CompletionKind, ToolCallRequest,
};

/// Maximum completion attempts per request.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff ceiling between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// OpenAI-compatible chat completions client.
///
/// Retries transient failures (transport errors, 5xx, 429) with
/// exponential backoff, base 2 from one second, up to three attempts. A
/// cancellation token aborts both in-flight requests and backoff sleeps.
///
/// # Examples
///
/// ```
/// use wispbit_llm::OpenAiClient;
///
/// let client = OpenAiClient::new(
///     "https://openrouter.ai/api/v1".into(),
///     Some("test-key".into()),
/// )
/// .unwrap();
/// drop(client);
/// ```
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cancel: CancellationToken,
}

impl OpenAiClient {
    /// Create a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WispbitError::Provider`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WispbitError::Provider(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-flight requests and retries when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn send_once(&self, body: &serde_json::Value) -> std::result::Result<ApiResponse, Attempt> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            Attempt::Retryable(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = parse_provider_error(status.as_u16(), &text);
            return if status.is_server_error() || status.as_u16() == 429 {
                Err(Attempt::Retryable(message))
            } else {
                Err(Attempt::Terminal(message))
            };
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| Attempt::Terminal(format!("malformed completion response: {e}")))
    }
}

enum Attempt {
    Retryable(String),
    Terminal(String),
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<Completion> {
        let structured = request
            .response_format
            .as_ref()
            .is_some_and(|f| f.is_json_schema());
        let body = build_body(&request);

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(WispbitError::Aborted),
                outcome = self.send_once(&body) => outcome,
            };

            match outcome {
                Ok(response) => return classify(response, structured),
                Err(Attempt::Terminal(message)) => return Err(WispbitError::Provider(message)),
                Err(Attempt::Retryable(message)) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(WispbitError::Provider(message));
                    }
                    let delay = backoff_delay(attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %message,
                        "completion failed; backing off");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(WispbitError::Aborted),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// Delay before retrying `attempt` (1-based): 1s, 2s, 4s, … capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = Duration::from_secs(1u64 << (attempt - 1).min(4));
    exp.min(MAX_BACKOFF)
}

fn build_body(request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "usage": { "include": true },
    });
    if !request.tools.is_empty() {
        body["tools"] = serde_json::to_value(&request.tools).unwrap_or_default();
    }
    if let Some(choice) = &request.tool_choice {
        body["tool_choice"] = choice.to_value();
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(format) = &request.response_format {
        body["response_format"] = format.0.clone();
    }
    body
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    cost: Option<f64>,
}

/// Classify a completion into exactly one response kind.
fn classify(response: ApiResponse, structured: bool) -> Result<Completion> {
    let cost = response
        .usage
        .as_ref()
        .and_then(|u| u.cost)
        .unwrap_or(0.0);

    let Some(choice) = response.choices.into_iter().next() else {
        return Err(WispbitError::Provider(
            "completion response has no choices".into(),
        ));
    };

    if let Some(calls) = choice.message.tool_calls {
        if !calls.is_empty() {
            return Ok(Completion {
                kind: CompletionKind::ToolCalls(calls),
                cost,
            });
        }
    }

    let Some(content) = choice.message.content else {
        return Err(WispbitError::Provider(
            "completion has neither content nor tool calls".into(),
        ));
    };

    if structured {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
            if value.is_object() {
                return Ok(Completion {
                    kind: CompletionKind::Structured(value),
                    cost,
                });
            }
        }
    }

    Ok(Completion {
        kind: CompletionKind::Message(content),
        cost,
    })
}

/// Pull the most specific provider error out of an error body.
///
/// Providers behind aggregators often nest the upstream error as a JSON
/// string under `error.metadata.raw`; when present, its message wins.
fn parse_provider_error(status: u16, body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        let short: String = body.chars().take(300).collect();
        return format!("HTTP {status}: {short}");
    };

    let error = value.get("error").unwrap_or(&value);
    let provider = error
        .pointer("/metadata/provider_name")
        .and_then(|v| v.as_str())
        .unwrap_or("provider");

    let nested = error
        .pointer("/metadata/raw")
        .and_then(|v| v.as_str())
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());
    let inner = nested
        .as_ref()
        .map(|n| n.get("error").unwrap_or(n))
        .cloned();

    let pick = |key: &str| -> Option<String> {
        inner
            .as_ref()
            .and_then(|i| i.get(key))
            .or_else(|| error.get(key))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
    };

    let message = pick("message").unwrap_or_else(|| "unknown error".into());
    let code = pick("code").unwrap_or_else(|| status.to_string());
    let kind = pick("type").unwrap_or_else(|| "error".into());

    format!("{provider} returned {status} [{kind}/{code}]: {message}")
}
