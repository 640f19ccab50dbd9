// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Service-facing crate: configuration, telemetry, persistence (Recorder),
//! replay (Player), on-disk integrity checking, and recording storage
//! management, built on top of the deterministic core in `replay-kernel`.

pub mod api;
pub mod config;
pub mod errors;
pub mod integrity;
pub mod player;
pub mod recorder;
pub mod server;
pub mod storage;
pub mod telemetry;

pub use config::{EngineConfig, ReplayMode};
pub use errors::ServiceError;
pub use integrity::{IntegrityChecker, IntegrityError, IntegrityReport};
pub use player::{Player, PlayerError};
pub use recorder::{Recorder, RecorderError};
pub use server::{build_router, AppState, SharedState};
pub use storage::{RecordingInfo, StorageError, StorageManager};
