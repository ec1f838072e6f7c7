//! Anthropic Messages API client with tool use, behind the [`LanguageModel`] trait.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use super::config::AiConfig;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Error)]
pub enum ClaudeApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("assistant is not configured: ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
}

impl ClaudeApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Results of tool calls travel back to the model as a user turn.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// A tool the model may call, with its JSON schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Request body for Claude API
#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ModelRequest,
}

/// Response from Claude API
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeResponse {
    #[serde(default)]
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: String,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl ClaudeResponse {
    /// Concatenated text blocks, if any.
    pub fn text(&self) -> Option<String> {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!text.is_empty()).then(|| text.join(""))
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ClaudeResponse, ClaudeApiError>;

    /// Single user prompt, text answer.
    async fn ask(&self, prompt: &str, system: Option<&str>) -> Result<String, ClaudeApiError> {
        let mut request = ModelRequest::new(vec![Message::user(prompt)]);
        request.system = system.map(str::to_string);
        self.complete(request)
            .await?
            .text()
            .ok_or_else(|| ClaudeApiError::Serde("No text content in response".to_string()))
    }
}

pub type SharedModel = Arc<dyn LanguageModel>;

/// Send a prompt expecting JSON in the response
pub async fn ask_json<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    prompt: &str,
    system: Option<&str>,
) -> Result<T, ClaudeApiError> {
    let response = model.ask(prompt, system).await?;
    if response.trim().is_empty() {
        error!("Claude returned an empty response");
        return Err(ClaudeApiError::Serde("Empty response from Claude".to_string()));
    }

    let json_str = extract_json(&response);
    serde_json::from_str(json_str).map_err(|e| {
        error!(
            json_error = %e,
            response_length = response.len(),
            "Failed to parse JSON response from Claude"
        );
        ClaudeApiError::Serde(format!(
            "{e} (response preview: {})",
            json_str.chars().take(500).collect::<String>()
        ))
    })
}

/// Claude API client
#[derive(Debug, Clone)]
pub struct ClaudeApiClient {
    http: Client,
    api_key: SecretString,
    model: String,
}

impl ClaudeApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// `Ok(None)` when no API key is configured.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, ClaudeApiError> {
        config
            .anthropic_api_key
            .clone()
            .map(|key| Self::new(key, config.anthropic_model.clone()))
            .transpose()
    }

    pub fn new(api_key: SecretString, model: Option<String>) -> Result<Self, ClaudeApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("quran-center/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClaudeApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn send_request(&self, request: &ModelRequest) -> Result<ClaudeResponse, ClaudeApiError> {
        let res = self
            .http
            .post(CLAUDE_API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&ClaudeRequest {
                model: &self.model,
                request,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<ClaudeResponse>()
                .await
                .map_err(|e| ClaudeApiError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(ClaudeApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(ClaudeApiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl LanguageModel for ClaudeApiClient {
    async fn complete(&self, request: ModelRequest) -> Result<ClaudeResponse, ClaudeApiError> {
        (|| async { self.send_request(&request).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &ClaudeApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Claude API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClaudeApiError {
    if e.is_timeout() {
        ClaudeApiError::Timeout
    } else {
        ClaudeApiError::Transport(e.to_string())
    }
}

/// Extract JSON from a string that might contain markdown code blocks
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        // Skip past any language identifier on the same line
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;

    use super::*;

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    pub struct ScriptedModel {
        pub responses: Mutex<VecDeque<ClaudeResponse>>,
        pub requests: Mutex<Vec<ModelRequest>>,
    }

    fn response(content: Vec<ContentBlock>) -> ClaudeResponse {
        ClaudeResponse {
            id: String::new(),
            content,
            model: "scripted".to_string(),
            stop_reason: None,
            usage: Usage::default(),
        }
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<Vec<ContentBlock>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(response).collect()),
                requests: Mutex::default(),
            }
        }

        /// Appends a response after construction.
        pub fn push(&self, content: Vec<ContentBlock>) {
            self.responses.lock().unwrap().push_back(response(content));
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: ModelRequest) -> Result<ClaudeResponse, ClaudeApiError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClaudeApiError::Serde("script exhausted".to_string()))
        }
    }

    pub fn text(text: &str) -> ContentBlock {
        ContentBlock::Text {
            text: text.to_string(),
        }
    }

    pub fn tool_use(id: &str, name: &str, input: Value) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{test_support::*, *};

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = r#"Here's the JSON:
```json
{"key": "value"}
```"#;
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn tool_blocks_use_api_wire_format() {
        let result = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: "ok".into(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"})
        );

        let response: ClaudeResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "m",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1, "output_tokens": 2},
            "content": [
                {"type": "text", "text": "Creating it now."},
                {"type": "tool_use", "id": "toolu_1", "name": "createNews", "input": {"title": "x"}}
            ]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Creating it now."));
        let (id, name, input) = response.tool_uses().next().unwrap();
        assert_eq!((id, name), ("toolu_1", "createNews"));
        assert_eq!(input["title"], "x");
    }

    #[test]
    fn request_omits_empty_tools() {
        let request = ModelRequest::new(vec![Message::user("hi")]).with_system("be brief");
        let body = serde_json::to_value(ClaudeRequest {
            model: "m",
            request: &request,
        })
        .unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["system"], "be brief");
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
    }

    #[tokio::test]
    async fn ask_json_reads_fenced_json() {
        let model = ScriptedModel::new(vec![vec![text("```json\n[1, 2]\n```")]]);
        let values: Vec<u32> = ask_json(&model, "numbers", None).await.unwrap();
        assert_eq!(values, vec![1, 2]);
    }
}
