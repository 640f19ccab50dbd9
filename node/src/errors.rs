// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("engine error: {0}")]
    Engine(#[from] replay_kernel::EngineError),
    #[error("recorder error: {0}")]
    Recorder(#[from] crate::recorder::RecorderError),
    #[error("player error: {0}")]
    Player(#[from] crate::player::PlayerError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Player(crate::player::PlayerError::RecordingNotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
