//! Weather server for the streamable HTTP transport.
//!
//! Tools are declared and dispatched by hand so the handler can reach the
//! calling peer (for logging notifications) and the session registry (for
//! the tool-list-changed broadcaster).

use super::McpError;
use super::session::{SESSION_ID_HEADER, SessionRegistry, new_session_id};
use crate::error::{Error, Result};
use crate::tools::weather;
use axum::http::request::Parts;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation, JsonObject,
    ListToolsResult, LoggingLevel, LoggingMessageNotificationParam, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{NotificationContext, Peer, RequestContext};
use rmcp::{RoleServer, ServerHandler};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const WEATHER_TOOL: &str = "get-weather";

/// Sessions issued but not initialized within this window are dropped.
pub const PENDING_SESSION_TTL: Duration = Duration::from_secs(60);

/// Registry of initialized sessions on the weather server.
pub type PeerRegistry = SessionRegistry<Peer<RoleServer>>;

#[derive(Clone)]
pub struct WeatherService {
    registry: Arc<PeerRegistry>,
}

impl WeatherService {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }
}

fn weather_tool() -> Tool {
    let mut city = JsonObject::new();
    city.insert("type".into(), json!("string"));
    city.insert("description".into(), json!("City to get the weather for"));

    let mut schema = JsonObject::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), json!({ "city": city }));
    schema.insert("required".into(), json!(["city"]));

    Tool::new(WEATHER_TOOL, "Get the weather for a city", Arc::new(schema))
}

/// Validate a `get-weather` call and return the city.
fn requested_city(request: &CallToolRequestParam) -> std::result::Result<String, McpError> {
    if request.name != WEATHER_TOOL {
        return Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, "Tool not found", None));
    }
    let arguments = request
        .arguments
        .as_ref()
        .ok_or_else(|| McpError::invalid_params("arguments undefined", None))?;
    arguments
        .get("city")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| McpError::invalid_params("City name undefined.", None))
}

impl ServerHandler for WeatherService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "weather".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            capabilities: ServerCapabilities::builder()
                .enable_logging()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: vec![weather_tool()],
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let city = requested_city(&request)?;

        if let Err(e) = context
            .peer
            .notify_logging_message(LoggingMessageNotificationParam {
                level: LoggingLevel::Info,
                logger: None,
                data: json!(format!("Getting the weather for: {city}")),
            })
            .await
        {
            warn!("failed to send logging notification: {e}");
        }

        Ok(CallToolResult::success(vec![Content::text(
            weather::describe(&city),
        )]))
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        let session_id = context
            .extensions
            .get::<Parts>()
            .and_then(|parts| parts.headers.get(SESSION_ID_HEADER))
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(new_session_id);
        info!(session = %session_id, "client initialized");
        self.registry.attach(session_id, context.peer).await;
    }
}

/// Something that can be told the tool list changed.
pub trait ToolListListener: Clone + Send + Sync + 'static {
    fn tool_list_changed(&self) -> impl Future<Output = Result<()>> + Send;
}

impl ToolListListener for Peer<RoleServer> {
    async fn tool_list_changed(&self) -> Result<()> {
        self.notify_tool_list_changed()
            .await
            .map_err(|e| Error::mcp(e.to_string()))
    }
}

/// Notify every attached session once. Sessions whose push fails are
/// closed. Returns the number of successful pushes.
pub async fn broadcast_tool_list_changed<H: ToolListListener>(
    registry: &SessionRegistry<H>,
) -> usize {
    let mut delivered = 0;
    for (id, listener) in registry.attached().await {
        match listener.tool_list_changed().await {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(session = %id, "dropping session after failed push: {e}");
                registry.close(&id).await;
            }
        }
    }
    debug!(delivered, "tool list changed broadcast");
    delivered
}

/// Broadcast `tools/list_changed` every `every` until the task is aborted.
/// Each tick also drops sessions stuck before initialization.
pub fn spawn_tool_list_broadcaster<H: ToolListListener>(
    registry: Arc<SessionRegistry<H>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = registry.prune_unattached(PENDING_SESSION_TTL).await;
            if pruned > 0 {
                info!(pruned, "dropped sessions that never initialized");
            }
            broadcast_tool_list_changed(&registry).await;
        }
    })
}
