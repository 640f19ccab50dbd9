// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics). Safe to call once per process;
/// a second call logs a warning instead of panicking.
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "replay_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
    }

    metrics::describe_counter!("replay_events_recorded_total", "Total number of events recorded");
    metrics::describe_counter!("replay_chunks_recorded_total", "Total number of stream chunks recorded");
    metrics::describe_histogram!("replay_record_event_duration_seconds", "Time to persist one event");
    metrics::describe_histogram!("replay_player_lookup_duration_seconds", "Time to resolve a recorded IO lookup");
    metrics::describe_counter!("replay_mismatch_total", "Total replay mismatches, by kind");
    metrics::describe_counter!("replay_match_total", "Total successful replay matches");
    metrics::describe_gauge!("replay_recorder_write_queue_depth", "Current depth of the recorder write queue");

    metrics::gauge!("replay_node_up", 1.0);
}

/// Render current metrics in Prometheus exposition format.
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
