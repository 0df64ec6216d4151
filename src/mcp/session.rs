//! Session bookkeeping for the streamable HTTP server.
//!
//! The registry maps live session ids to a peer handle. The HTTP gate in
//! front of `/mcp` learns ids from `initialize` replies, rejects requests
//! that carry no id or an unknown one, and forgets an id once the client
//! deletes its session or the transport stops recognizing it.

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const BAD_REQUEST_MESSAGE: &str = "Bad Request: invalid session ID or method.";
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

struct Entry<H> {
    handle: Option<H>,
    opened: Instant,
}

/// Live sessions keyed by id. An entry exists from the moment the id is
/// issued; the handle arrives once the client finishes initialization.
pub struct SessionRegistry<H> {
    sessions: RwLock<HashMap<String, Entry<H>>>,
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: Clone> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly issued id. Returns false if it was already live.
    pub async fn open(&self, id: impl Into<String>) -> bool {
        let mut guard = self.sessions.write().await;
        let id = id.into();
        if guard.contains_key(&id) {
            return false;
        }
        guard.insert(
            id,
            Entry {
                handle: None,
                opened: Instant::now(),
            },
        );
        true
    }

    /// Bind a handle to a session, opening it if the id was never seen.
    pub async fn attach(&self, id: impl Into<String>, handle: H) {
        self.sessions
            .write()
            .await
            .entry(id.into())
            .and_modify(|e| e.handle = Some(handle.clone()))
            .or_insert_with(|| Entry {
                handle: Some(handle),
                opened: Instant::now(),
            });
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Forget a session. Returns whether it was live.
    pub async fn close(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Snapshot of sessions that have a handle.
    pub async fn attached(&self) -> Vec<(String, H)> {
        self.sessions
            .read()
            .await
            .iter()
            .filter_map(|(id, e)| e.handle.as_ref().map(|h| (id.clone(), h.clone())))
            .collect()
    }

    /// Forget sessions that were issued more than `max_age` ago and never
    /// finished initialization. Returns how many were dropped.
    pub async fn prune_unattached(&self, max_age: Duration) -> usize {
        let mut guard = self.sessions.write().await;
        let before = guard.len();
        guard.retain(|_, e| e.handle.is_some() || e.opened.elapsed() < max_age);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// JSON-RPC error envelope used for transport-level rejections.
pub fn error_envelope(message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": -32000,
            "message": message,
        },
        "id": new_session_id(),
    })
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(error_envelope(message))).into_response()
}

/// True when `body` (or any member of a batch) is an MCP `initialize` request.
pub fn is_initialize_request(body: &[u8]) -> bool {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(batch)) => batch.iter().any(is_initialize),
        Ok(single) => is_initialize(&single),
        Err(_) => false,
    }
}

fn is_initialize(msg: &Value) -> bool {
    msg["jsonrpc"] == "2.0"
        && msg["method"] == "initialize"
        && msg.get("id").is_some_and(|id| id.is_string() || id.is_number())
        && msg["params"]["protocolVersion"].is_string()
        && msg["params"]["clientInfo"].is_object()
}

fn session_id_of(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// axum middleware guarding the streamable HTTP endpoint.
pub async fn session_gate<H>(
    State(registry): State<Arc<SessionRegistry<H>>>,
    request: Request,
    next: Next,
) -> Response
where
    H: Clone + Send + Sync + 'static,
{
    let method = request.method().clone();

    let Some(session_id) = session_id_of(request.headers()) else {
        if method != Method::POST {
            debug!(%method, "rejecting request without session id");
            return reject(StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE);
        }
        return admit_initialize(&registry, request, next).await;
    };

    if !registry.contains(&session_id).await {
        debug!(%method, session = %session_id, "rejecting unknown session id");
        return reject(StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE);
    }

    let response = next.run(request).await;
    if method == Method::DELETE && response.status().is_success() {
        registry.close(&session_id).await;
        info!(session = %session_id, "session closed by client");
    } else if matches!(
        response.status(),
        StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND
    ) {
        // the transport no longer knows this session
        registry.close(&session_id).await;
        info!(session = %session_id, "session expired");
    }
    response
}

async fn admit_initialize<H>(registry: &SessionRegistry<H>, request: Request, next: Next) -> Response
where
    H: Clone + Send + Sync + 'static,
{
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to read request body: {e}");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE);
        }
    };

    if !is_initialize_request(&bytes) {
        debug!("rejecting non-initialize request without session id");
        return reject(StatusCode::BAD_REQUEST, BAD_REQUEST_MESSAGE);
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;
    if let Some(id) = session_id_of(response.headers())
        && registry.open(id.clone()).await
    {
        info!(session = %id, "new session");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "t", "version": "1"}
            }
        })
    }

    #[test]
    fn recognizes_initialize_request() {
        assert!(is_initialize_request(init_body().to_string().as_bytes()));
    }

    #[test]
    fn recognizes_initialize_inside_batch() {
        let batch = json!([
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            init_body()
        ]);
        assert!(is_initialize_request(batch.to_string().as_bytes()));
    }

    #[test]
    fn rejects_other_methods_and_garbage() {
        let mut list = init_body();
        list["method"] = json!("tools/list");
        assert!(!is_initialize_request(list.to_string().as_bytes()));

        let mut no_id = init_body();
        no_id.as_object_mut().unwrap().remove("id");
        assert!(!is_initialize_request(no_id.to_string().as_bytes()));

        let mut no_client = init_body();
        no_client["params"].as_object_mut().unwrap().remove("clientInfo");
        assert!(!is_initialize_request(no_client.to_string().as_bytes()));

        assert!(!is_initialize_request(b"not json"));
    }

    #[test]
    fn envelope_shape() {
        let e = error_envelope("nope");
        assert_eq!(e["jsonrpc"], "2.0");
        assert_eq!(e["error"]["code"], -32000);
        assert_eq!(e["error"]["message"], "nope");
        assert!(e["id"].is_string());
    }

    #[tokio::test]
    async fn registry_lifecycle() {
        let reg: SessionRegistry<u32> = SessionRegistry::new();
        assert!(reg.open("a").await);
        assert!(!reg.open("a").await, "ids are unique while live");
        assert!(reg.contains("a").await);
        assert!(reg.attached().await.is_empty(), "opened but not attached");

        reg.attach("a", 7).await;
        reg.attach("b", 9).await;
        let mut attached = reg.attached().await;
        attached.sort();
        assert_eq!(attached, vec![("a".to_string(), 7), ("b".to_string(), 9)]);

        assert!(reg.close("a").await);
        assert!(!reg.close("a").await);
        assert!(!reg.contains("a").await);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn stale_unattached_sessions_are_pruned() {
        let reg: SessionRegistry<u32> = SessionRegistry::new();
        reg.open("pending").await;
        reg.open("ready").await;
        reg.attach("ready", 1).await;

        assert_eq!(reg.prune_unattached(Duration::from_secs(60)).await, 0);
        assert_eq!(reg.len().await, 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reg.prune_unattached(Duration::from_millis(10)).await, 1);
        assert!(!reg.contains("pending").await);
        assert!(reg.contains("ready").await, "attached sessions are kept");
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
