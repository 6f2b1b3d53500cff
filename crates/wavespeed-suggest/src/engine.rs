use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use wavespeed_core::{AdvisorSettings, ProviderKind};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.7;

/// Outcome of one completed provider call. `ok` is false when the provider
/// answered but refused, filtered, or returned nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub raw_text: String,
    pub ok: bool,
    pub finish_reason: Option<String>,
}

impl ProviderResult {
    pub fn completed(raw_text: impl Into<String>, finish_reason: Option<String>) -> Self {
        let raw_text = raw_text.into();
        let blocked = finish_reason.as_deref().is_some_and(is_blocking_reason);
        Self {
            ok: !blocked && !raw_text.trim().is_empty(),
            raw_text,
            finish_reason,
        }
    }

    pub fn is_content_blocked(&self) -> bool {
        self.finish_reason.as_deref().is_some_and(is_blocking_reason)
    }
}

fn is_blocking_reason(reason: &str) -> bool {
    matches!(reason, "refusal" | "content_filter" | "safety")
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable response: {0}")]
    Decode(String),
    #[error("client setup failed: {0}")]
    Client(String),
}

/// One hosted chat model reachable with a system prompt and a single user message.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    async fn complete(&self, system: &str, user_msg: &str) -> Result<ProviderResult, ProviderError>;
}

fn build_http(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transport(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 300 {
        let cut = (0..=300).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

// --- Claude (Anthropic Messages API) ---

pub struct ClaudeClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [WireMessage<'a>; 1],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ChatProvider for ClaudeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user_msg: &str) -> Result<ProviderResult, ProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: [WireMessage {
                role: "user",
                content: user_msg,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let parsed: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        Ok(ProviderResult::completed(text, parsed.stop_reason))
    }
}

// --- OpenAI (Chat Completions API) ---

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user_msg: &str) -> Result<ProviderResult, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: system,
                },
                WireMessage {
                    role: "user",
                    content: user_msg,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(ProviderResult::completed(String::new(), None));
        };
        let (content, refusal) = match choice.message {
            Some(m) => (m.content.unwrap_or_default(), m.refusal),
            None => (String::new(), None),
        };
        let finish_reason = match refusal {
            Some(r) if !r.trim().is_empty() => Some("refusal".to_string()),
            _ => choice.finish_reason,
        };

        Ok(ProviderResult::completed(content, finish_reason))
    }
}

/// Build clients for every provider that has a key, in priority order.
/// A client that cannot be constructed is logged and left out.
pub fn providers_from_settings(settings: &AdvisorSettings) -> Vec<Arc<dyn ChatProvider>> {
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    let mut providers: Vec<Arc<dyn ChatProvider>> = Vec::new();

    for kind in settings.provider_order() {
        let Some(key) = settings.api_key(kind) else {
            continue;
        };
        let built: Result<Arc<dyn ChatProvider>, ProviderError> = match kind {
            ProviderKind::Claude => {
                ClaudeClient::new(settings.base_url(kind), key, settings.model(kind), timeout)
                    .map(|c| Arc::new(c) as Arc<dyn ChatProvider>)
            }
            ProviderKind::OpenAi => {
                OpenAiClient::new(settings.base_url(kind), key, settings.model(kind), timeout)
                    .map(|c| Arc::new(c) as Arc<dyn ChatProvider>)
            }
        };
        match built {
            Ok(provider) => providers.push(provider),
            Err(e) => tracing::warn!(provider = %kind, error = %e, "skipping provider"),
        }
    }

    providers
}
