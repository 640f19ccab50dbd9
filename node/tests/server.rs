// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Exercises the HTTP router directly, without binding a real socket.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use replay_node::config::EngineConfig;
use replay_node::server::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

fn config_with_output_dir(dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.output_dir = dir.to_path_buf();
    config
}

#[tokio::test]
async fn start_record_stop_and_list_round_trip_through_http() {
    let dir = tempdir().unwrap();
    let state = Arc::new(AppState::new(config_with_output_dir(dir.path())));
    let app = build_router(state);

    let start_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/recordings")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"adapter_name": "test-adapter", "adapter_version": "0.1"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start_response.status(), StatusCode::OK);
    let body = to_bytes(start_response.into_body(), usize::MAX).await.unwrap();
    let start_json: Value = serde_json::from_slice(&body).unwrap();
    let recording_id = start_json["recording_id"].as_str().unwrap().to_string();

    let event_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/recordings/{}/events", recording_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "event_type": "llm_call",
                        "adapter": "test-adapter",
                        "agent_id": "agent-1",
                        "tool_name": "gpt-4",
                        "input": {"prompt": "hi"},
                        "output": {"text": "hello"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(event_response.status(), StatusCode::OK);

    let stop_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/recordings/{}/stop", recording_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stop_response.status(), StatusCode::OK);

    let list_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/recordings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let body = to_bytes(list_response.into_body(), usize::MAX).await.unwrap();
    let recordings: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(recordings.as_array().unwrap().len(), 1);
    assert_eq!(recordings[0]["recording_id"], json!(recording_id));
    assert_eq!(recordings[0]["event_count"], json!(1));
}
