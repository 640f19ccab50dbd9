//! Failure-Mode Handler (C9)
//!
//! Central taxonomy of recoverable/unrecoverable faults and the recovery
//! strategy applied to each, with an append-only failure history and
//! per-mode callback registration for hosts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::manifest::{FailureContext, FailureMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    FailFast,
    FallbackGraceful,
    RetryWithBackoff,
    RepairAndContinue,
    SkipAndLog,
}

/// Default recovery strategy per failure mode, carried unchanged from the
/// source system's `_get_default_strategies()` table.
pub fn default_strategy(mode: FailureMode) -> RecoveryStrategy {
    use FailureMode::*;
    use RecoveryStrategy::*;
    match mode {
        RecordingInitFailed => RetryWithBackoff,
        RecordingIoError => RetryWithBackoff,
        RecordingDiskFull => FailFast,
        RecordingPermissionDenied => FailFast,
        ReplayRecordingNotFound => FailFast,
        ReplayIntegrityCheckFailed => RepairAndContinue,
        ReplayManifestCorrupted => RepairAndContinue,
        ReplayEventsCorrupted => RepairAndContinue,
        ReplayLookupMismatch => FallbackGraceful,
        ReplayInputFingerprintMismatch => FallbackGraceful,
        SystemOutOfMemory => FailFast,
        SystemDependencyMissing => FallbackGraceful,
        SystemPermissionError => FailFast,
        DataCorruptionDetected => RepairAndContinue,
        DataPartialCorruption => RepairAndContinue,
        DataSchemaMismatch => FallbackGraceful,
    }
}

/// Outcome of asking the handler what to do about a failure: either the
/// caller should retry/continue per the strategy, or the fault is
/// unrecoverable and must propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Retry { attempt: u32, backoff: Duration },
    Propagate,
}

pub type FailureCallback = Box<dyn Fn(&FailureContext) + Send + Sync>;

pub struct FailureModeHandler {
    strategies: HashMap<FailureMode, RecoveryStrategy>,
    history: Mutex<Vec<FailureContext>>,
    callbacks: Mutex<HashMap<FailureMode, Vec<FailureCallback>>>,
}

const MAX_RETRY_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

impl FailureModeHandler {
    pub fn new() -> Self {
        let mut strategies = HashMap::new();
        for mode in [
            FailureMode::RecordingInitFailed,
            FailureMode::RecordingIoError,
            FailureMode::RecordingDiskFull,
            FailureMode::RecordingPermissionDenied,
            FailureMode::ReplayRecordingNotFound,
            FailureMode::ReplayIntegrityCheckFailed,
            FailureMode::ReplayManifestCorrupted,
            FailureMode::ReplayEventsCorrupted,
            FailureMode::ReplayLookupMismatch,
            FailureMode::ReplayInputFingerprintMismatch,
            FailureMode::SystemOutOfMemory,
            FailureMode::SystemDependencyMissing,
            FailureMode::SystemPermissionError,
            FailureMode::DataCorruptionDetected,
            FailureMode::DataPartialCorruption,
            FailureMode::DataSchemaMismatch,
        ] {
            strategies.insert(mode, default_strategy(mode));
        }
        Self {
            strategies,
            history: Mutex::new(Vec::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_strategies(strategies: HashMap<FailureMode, RecoveryStrategy>) -> Self {
        Self {
            strategies,
            history: Mutex::new(Vec::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_callback(&self, mode: FailureMode, callback: FailureCallback) {
        self.callbacks.lock().unwrap().entry(mode).or_default().push(callback);
    }

    /// Record a failure and decide what the caller should do. The decision
    /// does not perform repair itself (that is component-specific: e.g. the
    /// Player rehashes files, the Recorder salvages a truncated log) - this
    /// only returns the disposition and logs it to history/callbacks.
    pub fn handle_failure(
        &self,
        failure_mode: FailureMode,
        error: &str,
        context: BTreeMap<String, String>,
    ) -> Disposition {
        let strategy = *self
            .strategies
            .get(&failure_mode)
            .unwrap_or(&RecoveryStrategy::FailFast);

        let mut failure_context = FailureContext {
            failure_mode,
            error: error.to_string(),
            context,
            timestamp: Utc::now(),
            recovery_attempted: true,
            recovery_successful: false,
            traceback: None,
        };

        let disposition = match strategy {
            RecoveryStrategy::FailFast => Disposition::Propagate,
            RecoveryStrategy::FallbackGraceful => Disposition::Continue,
            RecoveryStrategy::SkipAndLog => Disposition::Continue,
            RecoveryStrategy::RepairAndContinue => Disposition::Continue,
            RecoveryStrategy::RetryWithBackoff => Disposition::Retry {
                attempt: 1,
                backoff: BASE_BACKOFF,
            },
        };

        failure_context.recovery_successful = !matches!(disposition, Disposition::Propagate);

        if matches!(disposition, Disposition::Propagate) {
            let callbacks = self.callbacks.lock().unwrap();
            if let Some(cbs) = callbacks.get(&failure_mode) {
                for cb in cbs {
                    cb(&failure_context);
                }
            }
        }

        self.history.lock().unwrap().push(failure_context);
        disposition
    }

    /// Compute the backoff for a given retry attempt (1-based), exponential
    /// and bounded by [`MAX_RETRY_ATTEMPTS`].
    pub fn backoff_for_attempt(attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > MAX_RETRY_ATTEMPTS {
            return None;
        }
        Some(BASE_BACKOFF * 2u32.pow(attempt - 1))
    }

    pub fn history(&self) -> Vec<FailureContext> {
        self.history.lock().unwrap().clone()
    }

    pub fn stats(&self) -> BTreeMap<String, usize> {
        let history = self.history.lock().unwrap();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for failure in history.iter() {
            *counts.entry(format!("{:?}", failure.failure_mode)).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for FailureModeHandler {
    fn default() -> Self {
        Self::new()
    }
}
