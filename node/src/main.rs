// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use replay_node::config::EngineConfig;
use replay_node::server::{build_router, AppState};
use replay_node::telemetry;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let config = EngineConfig::default();
    tracing::info!(?config, "starting replay node");

    std::fs::create_dir_all(&config.output_dir).expect("failed to create output directory");

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    tracing::info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("failed to bind address");
    axum::serve(listener, app).await.expect("server error");
}
