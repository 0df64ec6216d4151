//! Remote tool client: connects to an MCP server and exposes its tools to
//! the chat loop through [`ToolProvider`].

use crate::error::{Error, Result};
use crate::llm::ToolDef;
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation,
    LoggingMessageNotificationParam,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::{
    ConfigureCommandExt, IntoTransport, SseClientTransport, StreamableHttpClientTransport,
    TokioChildProcess,
};
use rmcp::{ClientHandler, RoleClient, ServiceExt};
use serde_json::Value;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Narrow tool interface used by the chat loop.
pub trait ToolProvider {
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolDef>>> + Send;

    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    /// Non-text item (image, resource...), kept as raw JSON.
    Other(Value),
}

/// Result of a remote tool call, passed back to the model unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Parse the wire form of a `tools/call` result
    /// (`{"content": [...], "isError": bool}`).
    pub fn from_json(value: &Value) -> Self {
        let content = value["content"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| match (item["type"].as_str(), item["text"].as_str()) {
                        (Some("text"), Some(text)) => ToolContent::Text(text.to_string()),
                        _ => ToolContent::Other(item.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            content,
            is_error: value["isError"].as_bool().unwrap_or(false),
        }
    }

    /// Flatten the content for a model `tool_result` block.
    pub fn to_model_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text(t) => t.clone(),
                ToolContent::Other(v) => v.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Where the tool server lives.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Sse { url: String },
    Http { url: String },
    Stdio { command: String, args: Vec<String> },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Sse { url } => write!(f, "sse {url}"),
            Endpoint::Http { url } => write!(f, "http {url}"),
            Endpoint::Stdio { command, args } => write!(f, "stdio {command} {}", args.join(" ")),
        }
    }
}

type ToolCache = Arc<RwLock<Option<Vec<ToolDef>>>>;

/// Client-side handler: logs server log messages and refreshes the tool
/// cache when the server says its tool list changed.
#[derive(Clone)]
pub struct NotificationHandler {
    tools: ToolCache,
}

impl ClientHandler for NotificationHandler {
    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let data = match &params.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        info!(level = ?params.level, logger = ?params.logger, "server: {data}");
    }

    async fn on_tool_list_changed(&self, context: NotificationContext<RoleClient>) {
        debug!("tool list changed, refetching");
        match context.peer.list_all_tools().await {
            Ok(tools) => match tool_defs(&tools) {
                Ok(defs) => {
                    *self.tools.write().await = Some(defs);
                }
                Err(e) => warn!("unreadable tool list: {e}"),
            },
            Err(e) => warn!("failed to refetch tools: {e}"),
        }
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}

/// A live connection to one tool server.
pub struct RemoteTools {
    service: RunningService<RoleClient, NotificationHandler>,
    tools: ToolCache,
}

impl RemoteTools {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        info!(%endpoint, "connecting to tool server");
        match endpoint {
            Endpoint::Sse { url } => {
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .map_err(|e| Error::mcp(format!("SSE connect to {url} failed: {e}")))?;
                Self::over(transport).await
            }
            Endpoint::Http { url } => {
                Self::over(StreamableHttpClientTransport::from_uri(url.clone())).await
            }
            Endpoint::Stdio { command, args } => {
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args).stderr(Stdio::inherit());
                    }),
                )
                .map_err(|e| Error::mcp(format!("failed to spawn {command}: {e}")))?;
                Self::over(transport).await
            }
        }
    }

    /// Run the client handshake over an already-built transport.
    pub async fn over<T, E, A>(transport: T) -> Result<Self>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + From<std::io::Error> + Send + Sync + 'static,
    {
        let tools: ToolCache = Arc::default();
        let handler = NotificationHandler {
            tools: tools.clone(),
        };
        let service = handler
            .serve(transport)
            .await
            .map_err(|e| Error::mcp(format!("handshake failed: {e}")))?;
        if let Some(server) = service.peer_info() {
            info!(
                server = %server.server_info.name,
                version = %server.server_info.version,
                "connected"
            );
        }
        Ok(Self { service, tools })
    }

    /// Resolves once the transport closes.
    pub async fn wait_for_completion(self) -> Result<()> {
        let reason = self
            .service
            .waiting()
            .await
            .map_err(|e| Error::mcp(format!("client task failed: {e}")))?;
        info!(?reason, "connection closed");
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.service
            .cancel()
            .await
            .map_err(|e| Error::mcp(format!("client task failed: {e}")))?;
        Ok(())
    }
}

impl ToolProvider for RemoteTools {
    async fn list_tools(&self) -> Result<Vec<ToolDef>> {
        if let Some(cached) = self.tools.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| Error::mcp(format!("tools/list failed: {e}")))?;
        let defs = tool_defs(&tools)?;
        *self.tools.write().await = Some(defs.clone());
        Ok(defs)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(Error::mcp(format!(
                    "tool arguments must be an object, got {other}"
                )));
            }
        };
        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| Error::mcp(format!("tools/call {name} failed: {e}")))?;
        let raw = serde_json::to_value(&result)
            .map_err(|e| Error::parse(format!("tool result: {e}")))?;
        Ok(ToolOutput::from_json(&raw))
    }
}

fn tool_defs(tools: &[rmcp::model::Tool]) -> Result<Vec<ToolDef>> {
    tools
        .iter()
        .map(|tool| {
            let raw =
                serde_json::to_value(tool).map_err(|e| Error::parse(format!("tool: {e}")))?;
            Ok(tool_def_from_json(&raw))
        })
        .collect()
}

/// Map a wire tool declaration (`name`, `description`, `inputSchema`).
fn tool_def_from_json(raw: &Value) -> ToolDef {
    ToolDef {
        name: raw["name"].as_str().unwrap_or_default().to_string(),
        description: raw["description"].as_str().unwrap_or_default().to_string(),
        input_schema: match &raw["inputSchema"] {
            Value::Null => serde_json::json!({"type": "object"}),
            schema => schema.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_items_are_joined() {
        let out = ToolOutput::from_json(&json!({
            "content": [
                {"type": "text", "text": "one"},
                {"type": "text", "text": "two"}
            ]
        }));
        assert!(!out.is_error);
        assert_eq!(out.to_model_text(), "one\ntwo");
    }

    #[test]
    fn error_flag_and_non_text_items_survive() {
        let out = ToolOutput::from_json(&json!({
            "content": [{"type": "image", "data": "AAAA", "mimeType": "image/png"}],
            "isError": true
        }));
        assert!(out.is_error);
        assert!(matches!(&out.content[0], ToolContent::Other(v) if v["mimeType"] == "image/png"));
        assert!(out.to_model_text().contains("image/png"));
    }

    #[test]
    fn tool_declaration_maps_to_def() {
        let def = tool_def_from_json(&json!({
            "name": "get-weather",
            "description": "Get the weather",
            "inputSchema": {"type": "object", "properties": {"city": {"type": "string"}}}
        }));
        assert_eq!(def.name, "get-weather");
        assert_eq!(def.input_schema["properties"]["city"]["type"], "string");

        let bare = tool_def_from_json(&json!({"name": "x"}));
        assert_eq!(bare.description, "");
        assert_eq!(bare.input_schema, json!({"type": "object"}));
    }

    #[test]
    fn endpoint_display() {
        let e = Endpoint::Stdio {
            command: "toolrelay".into(),
            args: vec!["serve".into(), "files".into()],
        };
        assert_eq!(e.to_string(), "stdio toolrelay serve files");
    }
}
