//! Crate-wide error types.
//!
//! Each component raises its own error enum first; call sites that need a
//! single error type convert via `#[from]` into [`EngineError`], mirroring
//! the component-error-composition pattern used throughout this crate's
//! ancestor service layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("value could not be canonicalized: {0}")]
    Canonicalization(String),
}

#[derive(Debug, Error)]
pub enum DeterminismError {
    #[error("no more recorded {kind} values (requested index {index})")]
    Exhausted { kind: String, index: usize },
    #[error("{kind} parameters mismatch: expected ({expected_a},{expected_b}), got ({actual_a},{actual_b})")]
    ParamMismatch {
        kind: String,
        expected_a: String,
        expected_b: String,
        actual_a: String,
        actual_b: String,
    },
}

#[derive(Debug, Error)]
pub enum RedactionError {
    #[error("invalid redaction rule pattern {name}: {source}")]
    InvalidPattern { name: String, source: regex::Error },
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown stream id: {0}")]
    UnknownStream(String),
    #[error("stream {0} already has a final token")]
    AlreadyFinal(String),
    #[error("stream {0} has no final token and is not replayable")]
    NotFinalized(String),
}

/// Composed error type for the deterministic core (C1-C5). The Recorder,
/// Player, and Integrity Checker (C6-C8) live in the `node` crate and
/// define their own error enums there, since they own IO concerns this
/// crate does not (recording directories, manifests, on-disk layout).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error(transparent)]
    Determinism(#[from] DeterminismError),
    #[error(transparent)]
    Redaction(#[from] RedactionError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
