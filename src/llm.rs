use crate::error::{Error, Result};
use crate::http::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use tracing::{debug, warn};

/// LLM provider: determines API format and endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini through its OpenAI-compatible endpoint.
    #[default]
    Gemini,
    Anthropic,
    OpenRouter,
    /// Any OpenAI-compatible API (together.ai, local ollama, etc.)
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    /// Parse a CLI provider name. Unknown names fall back to the default.
    pub fn from_name(name: &str) -> Self {
        match name {
            "anthropic" => Self::Anthropic,
            "openrouter" => Self::OpenRouter,
            "openai" => Self::OpenAi,
            _ => Self::Gemini,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "http://localhost:11434/v1",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash-001",
            Self::Anthropic => "claude-sonnet-4-5",
            Self::OpenRouter => "google/gemini-2.0-flash-001",
            Self::OpenAi => "llama3.1",
        }
    }
}

/// A tool the model may call, as declared by the MCP server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of a conversation message. Serializes in the Anthropic wire shape.
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
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ConversationMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

impl StopReason {
    fn from_anthropic(reason: Option<&str>) -> Self {
        match reason {
            Some("end_turn") | Some("stop_sequence") => Self::EndTurn,
            Some("tool_use") => Self::ToolUse,
            Some("max_tokens") => Self::MaxTokens,
            _ => Self::Other,
        }
    }

    fn from_openai(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => Self::EndTurn,
            Some("tool_calls") | Some("function_call") => Self::ToolUse,
            Some("length") => Self::MaxTokens,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ConverseResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl ConverseResponse {
    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `(id, name, input)` for every tool use block, in order.
    pub fn tool_uses(&self) -> Vec<(String, String, Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Anything that can carry a tool-aware conversation forward by one model turn.
pub trait TextGenerator {
    fn converse(
        &self,
        system: &str,
        messages: &[ConversationMessage],
        tools: &[ToolDef],
    ) -> impl Future<Output = Result<ConverseResponse>> + Send;
}

pub struct LlmClient {
    provider: Provider,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: HttpClient,
}

// -- Anthropic format --

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ConversationMessage],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDef],
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// -- OpenAI-compatible format --

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
struct OpenAiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunctionDef<'a>,
}

#[derive(Serialize)]
struct OpenAiFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OpenAiToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl LlmClient {
    pub fn new(
        provider: Provider,
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: Option<String>,
    ) -> Result<Self> {
        let http = HttpClient::new("toolrelay/0.1.0")?;
        let base_url = base_url.unwrap_or_else(|| provider.default_base_url().into());
        Ok(Self {
            provider,
            api_key,
            model,
            max_tokens,
            base_url,
            http,
        })
    }

    /// Build from config, reading the API key from the specified env var.
    pub fn from_config(
        provider: Provider,
        model: String,
        max_tokens: u32,
        api_key_env: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let env_var = api_key_env.unwrap_or_else(|| provider.default_api_key_env().into());
        let api_key = std::env::var(&env_var).unwrap_or_default();
        if api_key.is_empty() {
            warn!(env = %env_var, "LLM API key not set, requests will likely be rejected");
        }
        Self::new(provider, api_key, model, max_tokens, base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn converse_anthropic(
        &self,
        system: &str,
        messages: &[ConversationMessage],
        tools: &[ToolDef],
    ) -> Result<ConverseResponse> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            tools,
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/messages", self.base_url);
        let response_text = self
            .http
            .post_json_raw(
                &url,
                &body,
                &[
                    ("x-api-key", &self.api_key),
                    ("anthropic-version", "2023-06-01"),
                ],
            )
            .await
            .inspect_err(|e| warn!("Anthropic API error: {e}"))?;

        parse_anthropic_response(&response_text)
    }

    async fn converse_openai(
        &self,
        system: &str,
        messages: &[ConversationMessage],
        tools: &[ToolDef],
    ) -> Result<ConverseResponse> {
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: to_openai_messages(system, messages),
            tools: tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function",
                    function: OpenAiFunctionDef {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.input_schema,
                    },
                })
                .collect(),
        };

        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let response_text = self
            .http
            .post_json_raw(
                &url,
                &body,
                &[("Authorization", &format!("Bearer {}", self.api_key))],
            )
            .await
            .inspect_err(|e| warn!("LLM API error: {e}"))?;

        parse_openai_response(&response_text)
    }
}

impl TextGenerator for LlmClient {
    async fn converse(
        &self,
        system: &str,
        messages: &[ConversationMessage],
        tools: &[ToolDef],
    ) -> Result<ConverseResponse> {
        debug!(
            provider = ?self.provider,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending LLM request"
        );

        match self.provider {
            Provider::Anthropic => self.converse_anthropic(system, messages, tools).await,
            Provider::Gemini | Provider::OpenRouter | Provider::OpenAi => {
                self.converse_openai(system, messages, tools).await
            }
        }
    }
}

fn parse_anthropic_response(raw: &str) -> Result<ConverseResponse> {
    let resp: AnthropicResponse = serde_json::from_str(raw)
        .map_err(|e| Error::parse(format!("parse Anthropic response: {e}")))?;

    let content = resp
        .content
        .into_iter()
        .filter_map(|b| match b.kind.as_str() {
            "text" => b.text.map(|text| ContentBlock::Text { text }),
            "tool_use" => Some(ContentBlock::ToolUse {
                id: b.id.unwrap_or_default(),
                name: b.name.unwrap_or_default(),
                input: b.input.unwrap_or_else(|| json!({})),
            }),
            _ => None,
        })
        .collect();

    Ok(ConverseResponse {
        content,
        stop_reason: StopReason::from_anthropic(resp.stop_reason.as_deref()),
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    })
}

fn parse_openai_response(raw: &str) -> Result<ConverseResponse> {
    let resp: OpenAiResponse = serde_json::from_str(raw)
        .map_err(|e| Error::parse(format!("parse LLM response: {e}")))?;

    let usage = resp
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse("empty response from LLM"))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text });
    }
    for (i, call) in choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        let input = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                warn!(tool = %call.function.name, "unparseable tool arguments: {e}");
                json!({})
            })
        };
        let id = if call.id.is_empty() {
            format!("call_{i}")
        } else {
            call.id
        };
        content.push(ContentBlock::ToolUse {
            id,
            name: call.function.name,
            input,
        });
    }

    Ok(ConverseResponse {
        content,
        stop_reason: StopReason::from_openai(choice.finish_reason.as_deref()),
        usage,
    })
}

/// Flatten block-structured messages into the OpenAI chat format.
///
/// Tool results become one `tool` message each; assistant tool uses become
/// `tool_calls` on the assistant message.
fn to_openai_messages(system: &str, messages: &[ConversationMessage]) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(OpenAiMessage {
            role: "system",
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in messages {
        let mut texts = Vec::new();
        let mut calls = Vec::new();
        let mut results = Vec::new();
        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => texts.push(text.as_str()),
                ContentBlock::ToolUse { id, name, input } => calls.push(OpenAiToolCall {
                    id: id.clone(),
                    kind: function_kind(),
                    function: OpenAiFunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => results.push(OpenAiMessage {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                }),
            }
        }

        let text = (!texts.is_empty()).then(|| texts.join("\n"));
        match msg.role {
            Role::Assistant => out.push(OpenAiMessage {
                role: "assistant",
                content: text,
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: None,
            }),
            Role::User => {
                out.extend(results);
                if text.is_some() {
                    out.push(OpenAiMessage {
                        role: "user",
                        content: text,
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
        }
    }
    out
}
