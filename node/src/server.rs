// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Minimal ambient HTTP surface over the Recorder/Player/StorageManager.
//! Hosts embedding this crate directly are expected to call into
//! `recorder`/`player`/`storage` rather than go through HTTP; this router
//! exists for local development and the demo generator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path as AxPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::{
    RecordEventRequest, RecordEventResponse, RecordingSummary, ReplayLookupRequest,
    ReplayLookupResponse, StartRecordingRequest, StartRecordingResponse, StopRecordingResponse,
};
use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::player::Player;
use crate::recorder::Recorder;
use crate::storage::StorageManager;

pub struct AppState {
    config: EngineConfig,
    recorders: Mutex<HashMap<String, Recorder>>,
    players: Mutex<HashMap<String, Player>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            recorders: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
        }
    }

    fn storage(&self) -> StorageManager {
        StorageManager::new(self.config.output_dir.clone(), self.config.manifest_hash_required)
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/recordings", post(start_recording).get(list_recordings))
        .route("/recordings/:id/events", post(record_event))
        .route("/recordings/:id/stop", post(stop_recording))
        .route("/replay/:id/lookup", post(replay_lookup))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn start_recording(
    State(state): State<SharedState>,
    Json(req): Json<StartRecordingRequest>,
) -> Result<Json<StartRecordingResponse>, ServiceError> {
    let recorder = Recorder::start_recording(
        &state.config.output_dir,
        &req.adapter_name,
        &req.adapter_version,
        state.config.redaction_level,
        state.config.hash_algorithm,
        state.config.compression_enabled,
        state.config.max_file_size_mb,
        state.config.write_queue_capacity,
    )?;
    let recording_id = recorder.recording_id().to_string();
    state
        .recorders
        .lock()
        .unwrap()
        .insert(recording_id.clone(), recorder);

    Ok(Json(StartRecordingResponse { recording_id }))
}

async fn record_event(
    State(state): State<SharedState>,
    AxPath(id): AxPath<String>,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<RecordEventResponse>, ServiceError> {
    let recorders = state.recorders.lock().unwrap();
    let recorder = recorders
        .get(&id)
        .ok_or_else(|| ServiceError::InvalidInput(format!("no active recording {}", id)))?;

    let io_key = recorder.record_event(
        &req.event_type,
        &req.adapter,
        &req.agent_id,
        &req.tool_name,
        req.input,
        req.output,
    )?;

    Ok(Json(RecordEventResponse {
        lookup_key: io_key.to_canonical_string(),
    }))
}

async fn stop_recording(
    State(state): State<SharedState>,
    AxPath(id): AxPath<String>,
) -> Result<Json<StopRecordingResponse>, ServiceError> {
    let recorder = state
        .recorders
        .lock()
        .unwrap()
        .remove(&id)
        .ok_or_else(|| ServiceError::InvalidInput(format!("no active recording {}", id)))?;

    let manifest = recorder.stop_recording()?;
    Ok(Json(StopRecordingResponse { manifest }))
}

async fn replay_lookup(
    State(state): State<SharedState>,
    AxPath(id): AxPath<String>,
    Json(req): Json<ReplayLookupRequest>,
) -> Result<Json<ReplayLookupResponse>, ServiceError> {
    let mut players = state.players.lock().unwrap();
    if !players.contains_key(&id) {
        let dir = state.config.output_dir.join(&id);
        let player = Player::load(&dir, state.config.replay_mode, state.config.manifest_hash_required)?;
        players.insert(id.clone(), player);
    }
    let player = players.get_mut(&id).expect("just inserted");

    let (matched, output) = player.get_recorded_output(
        &req.event_type,
        &req.adapter,
        &req.agent_id,
        &req.tool_name,
        &req.input,
        req.call_index,
    );

    if matched {
        metrics::counter!("replay_match_total", 1);
    } else {
        metrics::counter!("replay_mismatch_total", 1);
    }

    Ok(Json(ReplayLookupResponse { matched, output }))
}

async fn list_recordings(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RecordingSummary>>, ServiceError> {
    let recordings = state
        .storage()
        .list_recordings()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

    Ok(Json(
        recordings
            .into_iter()
            .map(|r| RecordingSummary {
                recording_id: r.recording_id,
                event_count: r.manifest.event_count,
                total_chunks: r.manifest.total_chunks,
                size_bytes: r.size_bytes,
            })
            .collect(),
    ))
}

async fn metrics() -> String {
    crate::telemetry::get_metrics()
}
