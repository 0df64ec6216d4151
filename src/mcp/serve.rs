use super::session::session_gate;
use super::weather::{PeerRegistry, spawn_tool_list_broadcaster};
use crate::error::{Error, Result};
use axum::{Router, middleware};
use rmcp::service::Peer;
use rmcp::transport::sse_server::SseServerConfig;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{SseServer, StreamableHttpServerConfig, StreamableHttpService, stdio};
use rmcp::{RoleServer, ServerHandler, ServiceExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn warn_if_exposed(addr: SocketAddr) {
    if !addr.ip().is_loopback() {
        warn!(
            %addr,
            "this server does not provide any authentication and you are binding it to an external address, use with caution!"
        );
    }
}

fn cancel_on_ctrl_c(ct: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(e) => warn!("unable to listen for Ctrl-C: {e}"),
        }
        ct.cancel();
    });
}

/// Serve one session over stdin/stdout until the peer hangs up.
pub async fn serve_stdio<S: ServerHandler>(service: S) -> Result<()> {
    info!("serving over stdio");
    let running = service
        .serve(stdio())
        .await
        .map_err(|e| Error::mcp(format!("stdio handshake failed: {e}")))?;
    let reason = running
        .waiting()
        .await
        .map_err(|e| Error::mcp(format!("server task failed: {e}")))?;
    info!(?reason, "stdio session ended");
    Ok(())
}

/// Router for `GET /sse` + `POST /messages?sessionId=...`. Every session
/// it spawns stops when `ct` is cancelled.
pub fn sse_router<S, F>(addr: SocketAddr, factory: F, ct: CancellationToken) -> Router
where
    S: ServerHandler,
    F: Fn() -> S + Send + 'static,
{
    let config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/messages".to_string(),
        ct,
        sse_keep_alive: None,
    };
    let (sse_server, router) = SseServer::new(config);
    sse_server.with_service(factory);
    router
}

/// Serve the SSE transport until Ctrl-C.
pub async fn serve_sse<S, F>(addr: SocketAddr, factory: F) -> Result<()>
where
    S: ServerHandler,
    F: Fn() -> S + Send + 'static,
{
    warn_if_exposed(addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let ct = CancellationToken::new();
    let router = sse_router(addr, factory, ct.clone());
    cancel_on_ctrl_c(ct.clone());

    info!("SSE server listening on http://{addr}/sse");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { ct.cancelled_owned().await })
        .await?;
    Ok(())
}

/// `/mcp` (streamable HTTP) nested behind the session gate. Sessions the
/// gate admits are recorded in `registry`.
pub fn streamable_router<S, F>(factory: F, registry: Arc<PeerRegistry>) -> Router
where
    S: ServerHandler,
    F: Fn() -> S + Send + Sync + 'static,
{
    let service = StreamableHttpService::new(
        move || Ok(factory()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    Router::new()
        .nest_service("/mcp", service)
        .layer(middleware::from_fn_with_state(
            registry,
            session_gate::<Peer<RoleServer>>,
        ))
}

/// Serve `/mcp` (streamable HTTP) behind the session gate, with the
/// tool-list-changed broadcaster running until Ctrl-C.
pub async fn serve_streamable<S, F>(
    addr: SocketAddr,
    factory: F,
    registry: Arc<PeerRegistry>,
    broadcast_every: Duration,
) -> Result<()>
where
    S: ServerHandler,
    F: Fn() -> S + Send + Sync + 'static,
{
    warn_if_exposed(addr);
    let router = streamable_router(factory, registry.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let broadcaster = spawn_tool_list_broadcaster(registry, broadcast_every);
    let ct = CancellationToken::new();
    cancel_on_ctrl_c(ct.clone());

    info!("streamable HTTP server listening on http://{addr}/mcp");
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move { ct.cancelled_owned().await })
        .await;
    broadcaster.abort();
    served?;
    Ok(())
}
