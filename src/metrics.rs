use axum::{Router, routing::get};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::MetricsConfig;

#[derive(Default)]
pub struct Metrics {
    pub events_received: AtomicU64,
    pub messages_tracked: AtomicU64,
    pub commands_handled: AtomicU64,
    pub warnings_issued: AtomicU64,
    pub members_removed: AtomicU64,
    pub status_alerts: AtomicU64,
    pub ai_requests: AtomicU64,
    pub ai_failures: AtomicU64,
    pub rate_limits_hit: AtomicU64,
    pub transport_failures: AtomicU64,
    pub snapshots_saved: AtomicU64,
    pub snapshot_failures: AtomicU64,
    pub sweeps: AtomicU64,
    pub bridge_connected: AtomicU64,
}

fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_events(&self) {
        inc(&self.events_received);
    }

    pub fn inc_messages(&self) {
        inc(&self.messages_tracked);
    }

    pub fn inc_commands(&self) {
        inc(&self.commands_handled);
    }

    pub fn inc_warnings(&self) {
        inc(&self.warnings_issued);
    }

    pub fn inc_removals(&self) {
        inc(&self.members_removed);
    }

    pub fn inc_status_alerts(&self) {
        inc(&self.status_alerts);
    }

    pub fn inc_ai_requests(&self) {
        inc(&self.ai_requests);
    }

    pub fn inc_ai_failures(&self) {
        inc(&self.ai_failures);
    }

    pub fn inc_rate_limits(&self) {
        inc(&self.rate_limits_hit);
    }

    pub fn inc_transport_failures(&self) {
        inc(&self.transport_failures);
    }

    pub fn inc_snapshots(&self) {
        inc(&self.snapshots_saved);
    }

    pub fn inc_snapshot_failures(&self) {
        inc(&self.snapshot_failures);
    }

    pub fn inc_sweeps(&self) {
        inc(&self.sweeps);
    }

    pub fn set_bridge_connected(&self, connected: bool) {
        self.bridge_connected.store(connected as u64, Ordering::Relaxed);
    }

    fn format_prometheus(&self) -> String {
        let counters: [(&str, &str, &str, &AtomicU64); 14] = [
            ("events_received", "counter", "Bridge events received", &self.events_received),
            ("messages_tracked", "counter", "Group messages tracked", &self.messages_tracked),
            ("commands_handled", "counter", "Commands dispatched", &self.commands_handled),
            ("warnings_issued", "counter", "Moderation warnings issued", &self.warnings_issued),
            ("members_removed", "counter", "Members removed", &self.members_removed),
            ("status_alerts", "counter", "Status mention alerts", &self.status_alerts),
            ("ai_requests", "counter", "AI completions requested", &self.ai_requests),
            ("ai_failures", "counter", "AI completions failed", &self.ai_failures),
            ("rate_limits_hit", "counter", "Rate limits triggered", &self.rate_limits_hit),
            ("transport_failures", "counter", "Failed bridge requests", &self.transport_failures),
            ("snapshots_saved", "counter", "Snapshots written", &self.snapshots_saved),
            ("snapshot_failures", "counter", "Snapshot writes failed", &self.snapshot_failures),
            ("sweeps", "counter", "Compaction passes", &self.sweeps),
            ("bridge_connected", "gauge", "Bridge attached", &self.bridge_connected),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in counters {
            out.push_str(&format!(
                "# HELP warden_{name} {help}\n# TYPE warden_{name} {kind}\nwarden_{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

pub async fn run_metrics_server(config: MetricsConfig, metrics: Arc<Metrics>) {
    if !config.enable {
        return;
    }

    let path = config.path.clone();
    let app = Router::new()
        .route(&path, get(move || {
            let m = metrics.clone();
            async move { m.format_prometheus() }
        }));

    let addr: std::net::SocketAddr = match config.bind_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid metrics bind address: {}", e);
            return;
        }
    };

    info!("Metrics server listening on {}{}", addr, path);

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Metrics server stopped: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to bind metrics listener {}: {}", addr, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_exposition() {
        let metrics = Metrics::new();
        metrics.inc_warnings();
        metrics.inc_warnings();
        metrics.set_bridge_connected(true);

        let text = metrics.format_prometheus();
        assert!(text.contains("# TYPE warden_warnings_issued counter\nwarden_warnings_issued 2\n"));
        assert!(text.contains("# TYPE warden_bridge_connected gauge\nwarden_bridge_connected 1\n"));
        assert!(text.contains("warden_sweeps 0\n"));
    }
}
