use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolrelay::mcp::client::{Endpoint, RemoteTools, ToolProvider};
use toolrelay::mcp::serve::{sse_router, streamable_router};
use toolrelay::mcp::session::SessionRegistry;
use toolrelay::mcp::social::SocialService;
use toolrelay::mcp::weather::{
    PeerRegistry, WEATHER_TOOL, WeatherService, broadcast_tool_list_changed,
};

async fn bind_local() -> (tokio::net::TcpListener, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn spawn_weather_http() -> (String, Arc<PeerRegistry>) {
    let registry = Arc::new(SessionRegistry::new());
    let for_factory = registry.clone();
    let router = streamable_router(
        move || WeatherService::new(for_factory.clone()),
        registry.clone(),
    );
    let (listener, addr) = bind_local().await;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/mcp"), registry)
}

/// Poll until `check(entries, attached)` holds for the registry.
async fn wait_for(registry: &PeerRegistry, what: &str, check: impl Fn(usize, usize) -> bool) {
    for _ in 0..100 {
        if check(registry.len().await, registry.attached().await.len()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn streamable_session_is_tracked_under_transport_id() {
    let (url, registry) = spawn_weather_http().await;
    let remote = RemoteTools::connect(&Endpoint::Http { url }).await.unwrap();

    wait_for(&registry, "initialized session", |_, attached| attached == 1).await;
    // The gate opened the transport's id on initialize; attaching under
    // any other id would leave a second entry behind.
    assert_eq!(registry.len().await, 1);
    let (id, _) = registry.attached().await.remove(0);
    assert!(registry.contains(&id).await);

    let out = remote
        .call_tool(WEATHER_TOOL, json!({"city": "Karachi"}))
        .await
        .unwrap();
    assert_eq!(
        out.to_model_text(),
        "The weather in Karachi is sunny with a temperature of 25°C."
    );

    assert_eq!(broadcast_tool_list_changed(&registry).await, 1);

    remote.close().await.unwrap();
    wait_for(&registry, "session removal", |entries, _| entries == 0).await;
}

#[tokio::test]
async fn sse_server_serves_social_tools() {
    let (listener, addr) = bind_local().await;
    let ct = CancellationToken::new();
    let router = sse_router(addr, || SocialService::new(None), ct.clone());
    let shutdown = ct.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
            .await
            .unwrap();
    });

    let remote = RemoteTools::connect(&Endpoint::Sse {
        url: format!("http://{addr}/sse"),
    })
    .await
    .unwrap();

    let mut names: Vec<_> = remote
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    names.sort();
    assert_eq!(names, ["createInstagramPost", "getWeather"]);

    let out = remote
        .call_tool("getWeather", json!({"city": "Lahore"}))
        .await
        .unwrap();
    assert_eq!(
        out.to_model_text(),
        "The weather in Lahore is sunny with a temperature of 25°C."
    );

    remote.close().await.unwrap();
    ct.cancel();
}
