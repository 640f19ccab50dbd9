//! replay-kernel: deterministic record-replay core for agent IO.
//!
//! Canonical fingerprinting, event ordering, deterministic clock/RNG
//! providers, redaction, and streaming capture/replay. Persistence (the
//! Recorder and Player, §4.6-4.7), on-disk integrity verification (§4.8),
//! and service wiring live in the `node` crate, which depends on this one.

pub mod canonical;
pub mod determinism;
pub mod errors;
pub mod failure;
pub mod manifest;
pub mod ordering;
pub mod redaction;
pub mod streaming;

pub use canonical::{fingerprint, make_key, CanonicalValue, HashAlgorithm, IoKey};
pub use errors::EngineError;
pub use failure::{default_strategy, Disposition, FailureModeHandler, RecoveryStrategy};
pub use manifest::{FailureContext, FailureMode, FileHashEntry, RecordingManifest};
pub use ordering::{OrderedEvent, OrderingManager, StepContext};
pub use redaction::{RedactionFilter, RedactionLevel, RetentionClass, RetentionManager};
pub use streaming::{StreamRecorder, StreamReplay, StreamToken};
