use rmcp::model::{CallToolRequestParam, LoggingMessageNotificationParam};
use rmcp::service::NotificationContext;
use rmcp::{ClientHandler, RoleClient, ServiceExt};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use toolrelay::mcp::client::{RemoteTools, ToolProvider};
use toolrelay::mcp::session::SessionRegistry;
use toolrelay::mcp::weather::{
    PeerRegistry, WEATHER_TOOL, WeatherService, broadcast_tool_list_changed,
};

#[derive(Clone, Default)]
struct LogCollector {
    received: Arc<Mutex<Vec<LoggingMessageNotificationParam>>>,
    signal: Arc<Notify>,
}

impl ClientHandler for LogCollector {
    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        self.received.lock().unwrap().push(params);
        self.signal.notify_one();
    }
}

fn spawn_weather_server(registry: Arc<PeerRegistry>) -> tokio::io::DuplexStream {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let server = WeatherService::new(registry).serve(server_io).await?;
        server.waiting().await?;
        anyhow::Ok(())
    });
    client_io
}

async fn wait_for_sessions(registry: &PeerRegistry, expected: usize) {
    for _ in 0..100 {
        if registry.attached().await.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {expected} attached sessions, have {}",
        registry.attached().await.len()
    );
}

#[tokio::test]
async fn get_weather_answers_and_logs_to_caller() {
    let registry = Arc::new(SessionRegistry::new());
    let collector = LogCollector::default();
    let client = collector
        .clone()
        .serve(spawn_weather_server(registry))
        .await
        .unwrap();

    let result = client
        .call_tool(CallToolRequestParam {
            name: WEATHER_TOOL.into(),
            arguments: json!({"city": "Karachi"}).as_object().cloned(),
        })
        .await
        .unwrap();
    let raw = serde_json::to_value(&result).unwrap();
    assert_eq!(
        raw["content"][0]["text"],
        "The weather in Karachi is sunny with a temperature of 25°C."
    );

    tokio::time::timeout(Duration::from_secs(2), collector.signal.notified())
        .await
        .ok();
    let logs = collector.received.lock().unwrap().clone();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].data, json!("Getting the weather for: Karachi"));

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn invalid_calls_surface_as_errors() {
    let registry = Arc::new(SessionRegistry::new());
    let remote = RemoteTools::over(spawn_weather_server(registry))
        .await
        .unwrap();

    let tools = remote.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, WEATHER_TOOL);

    let err = remote
        .call_tool(WEATHER_TOOL, json!({"town": "Lahore"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("City name undefined."), "{err}");

    let err = remote.call_tool(WEATHER_TOOL, json!(null)).await.unwrap_err();
    assert!(err.to_string().contains("arguments undefined"), "{err}");

    let err = remote
        .call_tool("get-forecast", json!({"city": "Lahore"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Tool not found"), "{err}");

    remote.close().await.unwrap();
}

#[tokio::test]
async fn initialized_sessions_receive_broadcasts_until_they_leave() {
    let registry = Arc::new(SessionRegistry::new());
    let first = RemoteTools::over(spawn_weather_server(registry.clone()))
        .await
        .unwrap();
    let second = RemoteTools::over(spawn_weather_server(registry.clone()))
        .await
        .unwrap();
    wait_for_sessions(&registry, 2).await;

    assert_eq!(broadcast_tool_list_changed(&registry).await, 2);

    second.close().await.unwrap();
    // The server side notices the closed transport shortly after.
    let mut delivered = 2;
    for _ in 0..100 {
        delivered = broadcast_tool_list_changed(&registry).await;
        if delivered == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered, 1);
    assert_eq!(registry.len().await, 1);

    // The remaining client refreshed its cache and still sees the tool.
    let tools = first.list_tools().await.unwrap();
    assert_eq!(tools[0].name, WEATHER_TOOL);
    first.close().await.unwrap();
}
