use axum::{
    Json, Router,
    routing::get,
    response::IntoResponse,
    extract::{
        ws::{WebSocket, WebSocketUpgrade, Message},
        State, ConnectInfo,
    },
    http::StatusCode,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::protocol::BridgeEvent;
use crate::state::BotState;
use crate::transport::BridgeTransport;

#[derive(Clone)]
pub struct AppState {
    pub state: Arc<BotState>,
    pub transport: Arc<BridgeTransport>,
    pub events: mpsc::UnboundedSender<BridgeEvent>,
    pub metrics: Arc<Metrics>,
    pub config: Config,
}

pub async fn run(
    config: Config,
    state: Arc<BotState>,
    transport: Arc<BridgeTransport>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let app_state = AppState {
        state, transport, events, metrics,
        config: config.clone(),
    };

    let ws_path = config.server.ws_path.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats_handler))
        .route(&ws_path, get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    info!("Server listening on {} (bridge socket at {})", addr, ws_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn stats_handler(State(app): State<AppState>) -> impl IntoResponse {
    let groups: serde_json::Map<String, serde_json::Value> = app
        .state
        .stats
        .group_entries()
        .into_iter()
        .map(|(group, c)| {
            let usage: serde_json::Map<String, serde_json::Value> = app
                .state
                .stats
                .command_usage(&group)
                .into_iter()
                .map(|(command, count)| (command, json!(count)))
                .collect();
            (group, json!({
                "messages": c.messages,
                "commands": c.commands,
                "warnings": c.warnings,
                "kicks": c.kicks,
                "joins": c.joins,
                "leaves": c.leaves,
                "command_usage": usage,
            }))
        })
        .collect();

    Json(json!({
        "bridge_attached": app.transport.is_attached(),
        "rate_limit_records": app.state.limiter.tracked(),
        "groups": groups,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let max_frame = app.config.server.max_frame_bytes;
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, app, addr))
}

async fn handle_socket(socket: WebSocket, app: AppState, addr: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    if !app.transport.attach(outbound_tx.clone()) {
        warn!("Refusing second bridge connection from {}", addr);
        let _ = sink.send(Message::Close(None)).await;
        return;
    }
    app.metrics.set_bridge_connected(true);
    info!("Bridge connected from {}", addr);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !route_frame(&app.transport, &app.events, &text) {
                    error!("Event queue closed, dropping bridge");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    app.transport.detach(&outbound_tx);
    writer.abort();
    app.metrics.set_bridge_connected(app.transport.is_attached());
    info!("Bridge disconnected: {}", addr);
}

/// Hands `result` frames to the waiting request and queues everything else
/// for the event worker. Returns false once the queue is gone.
fn route_frame(
    transport: &BridgeTransport,
    events: &mpsc::UnboundedSender<BridgeEvent>,
    text: &str,
) -> bool {
    match serde_json::from_str::<BridgeEvent>(text) {
        Ok(BridgeEvent::Result { request_id, ok, data, error }) => {
            transport.resolve(&request_id, ok, data, error);
            true
        }
        Ok(event) => events.send(event).is_ok(),
        Err(e) => {
            warn!("Invalid bridge frame: {}", e);
            debug!("Frame: {}", text);
            true
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_events_are_queued_in_order() {
        let transport = BridgeTransport::new(Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(route_frame(
            &transport,
            &tx,
            r#"{"type":"participants_update","group":"1@g.us","action":"add","participants":["a@s.whatsapp.net"]}"#
        ));
        assert!(route_frame(&transport, &tx, r#"{"type":"connection_update","state":"open"}"#));
        assert!(route_frame(&transport, &tx, "not json"));

        assert!(matches!(rx.try_recv().unwrap(), BridgeEvent::ParticipantsUpdate { .. }));
        assert!(matches!(rx.try_recv().unwrap(), BridgeEvent::ConnectionUpdate { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats_expose_group_counters_and_usage() {
        let config = Config::default();
        let state = Arc::new(BotState::new(&config));
        state.stats.increment("1@g.us", crate::stats::GroupCounter::Messages);
        state.stats.log_command("1@g.us", "top");
        let (events, _rx) = mpsc::unbounded_channel();
        let app = AppState {
            state,
            transport: Arc::new(BridgeTransport::new(Duration::from_secs(1))),
            events,
            metrics: Arc::new(Metrics::new()),
            config,
        };

        let response = stats_handler(State(app)).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["bridge_attached"], false);
        assert_eq!(stats["groups"]["1@g.us"]["messages"], 1);
        assert_eq!(stats["groups"]["1@g.us"]["command_usage"]["top"], 1);
    }

    #[test]
    fn test_results_bypass_the_queue() {
        let transport = BridgeTransport::new(Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(route_frame(&transport, &tx, r#"{"type":"result","request_id":"x","ok":true}"#));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_stops_the_reader() {
        let transport = BridgeTransport::new(Duration::from_secs(1));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(!route_frame(&transport, &tx, r#"{"type":"connection_update","state":"closed"}"#));
    }
}
