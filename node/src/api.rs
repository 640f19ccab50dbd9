// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Request/response DTOs for the HTTP surface in `server.rs`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use replay_kernel::RecordingManifest;

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    pub adapter_name: String,
    pub adapter_version: String,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub recording_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordEventRequest {
    pub event_type: String,
    pub adapter: String,
    pub agent_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
}

#[derive(Debug, Serialize)]
pub struct RecordEventResponse {
    pub lookup_key: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub manifest: RecordingManifest,
}

#[derive(Debug, Deserialize)]
pub struct ReplayLookupRequest {
    pub event_type: String,
    pub adapter: String,
    pub agent_id: String,
    pub tool_name: String,
    pub input: Value,
    pub call_index: u64,
}

#[derive(Debug, Serialize)]
pub struct ReplayLookupResponse {
    pub matched: bool,
    pub output: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RecordingSummary {
    pub recording_id: String,
    pub event_count: u64,
    pub total_chunks: u64,
    pub size_bytes: u64,
}
