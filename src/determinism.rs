//! Determinism Providers (C3)
//!
//! `Clock` and `Rng` traits with three implementations each: live (backed by
//! the OS), recording (delegates to the live source while logging every
//! value produced), and replay (serves back the recorded sequence, checking
//! parameter equality where applicable).

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DeterminismError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

pub trait Rng: Send + Sync {
    fn float01(&mut self) -> f64;
    fn int_range(&mut self, lo: i64, hi: i64) -> i64;
    /// Returns an index in `0..len`.
    fn choice_index(&mut self, len: usize) -> usize;
    fn uuid(&mut self) -> Uuid;
}

/// One recorded RNG draw, tagged with the call that produced it so replay
/// can check parameter equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RngDraw {
    Float01 { value: f64 },
    IntRange { lo: i64, hi: i64, value: i64 },
    Choice { len: usize, value: usize },
    Uuid { value: Uuid },
}

// ---------------------------------------------------------------- live ----

pub struct LiveClock;

impl Clock for LiveClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct LiveRng {
    inner: rand::rngs::StdRng,
}

impl LiveRng {
    pub fn new() -> Self {
        Self {
            inner: rand::rngs::StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: rand::rngs::StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for LiveRng {
    fn default() -> Self {
        Self::new()
    }
}

impl Rng for LiveRng {
    fn float01(&mut self) -> f64 {
        (self.inner.next_u64() as f64) / (u64::MAX as f64)
    }

    fn int_range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo) as u64 + 1;
        lo + (self.inner.next_u64() % span) as i64
    }

    fn choice_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.inner.next_u64() as usize) % len
    }

    fn uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.inner.fill_bytes(&mut bytes);
        Uuid::from_bytes(bytes)
    }
}

// ----------------------------------------------------------- recording ----

/// Delegates to a live clock/RNG while logging every value produced, so the
/// manifest can attach the exact sequence for later replay.
pub struct RecordingClock<C: Clock> {
    inner: C,
    log: Mutex<Vec<DateTime<Utc>>>,
}

impl<C: Clock> RecordingClock<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn take_log(&self) -> Vec<DateTime<Utc>> {
        self.log.lock().unwrap().clone()
    }
}

impl<C: Clock> Clock for RecordingClock<C> {
    fn now(&self) -> DateTime<Utc> {
        let value = self.inner.now();
        self.log.lock().unwrap().push(value);
        value
    }

    fn sleep(&self, duration: Duration) {
        self.inner.sleep(duration);
    }
}

pub struct RecordingRng<R: Rng> {
    inner: R,
    log: Mutex<Vec<RngDraw>>,
}

impl<R: Rng> RecordingRng<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn take_log(&self) -> Vec<RngDraw> {
        self.log.lock().unwrap().clone()
    }
}

impl<R: Rng> Rng for RecordingRng<R> {
    fn float01(&mut self) -> f64 {
        let value = self.inner.float01();
        self.log.lock().unwrap().push(RngDraw::Float01 { value });
        value
    }

    fn int_range(&mut self, lo: i64, hi: i64) -> i64 {
        let value = self.inner.int_range(lo, hi);
        self.log
            .lock()
            .unwrap()
            .push(RngDraw::IntRange { lo, hi, value });
        value
    }

    fn choice_index(&mut self, len: usize) -> usize {
        let value = self.inner.choice_index(len);
        self.log
            .lock()
            .unwrap()
            .push(RngDraw::Choice { len, value });
        value
    }

    fn uuid(&mut self) -> Uuid {
        let value = self.inner.uuid();
        self.log.lock().unwrap().push(RngDraw::Uuid { value });
        value
    }
}

// --------------------------------------------------------------- replay ---

/// Clock frozen at a single recorded instant; `sleep` is a no-op.
pub struct FrozenClock {
    instant: DateTime<Utc>,
}

impl FrozenClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }

    fn sleep(&self, _duration: Duration) {}
}

/// Replays a recorded sequence of RNG draws, checking parameter equality on
/// draws that carry parameters (`int_range`, `choice_index`).
pub struct ReplayRng {
    draws: Vec<RngDraw>,
    next: usize,
}

impl ReplayRng {
    pub fn new(draws: Vec<RngDraw>) -> Self {
        Self { draws, next: 0 }
    }

    fn take(&mut self, kind: &str) -> Result<RngDraw, DeterminismError> {
        let draw = self
            .draws
            .get(self.next)
            .cloned()
            .ok_or_else(|| DeterminismError::Exhausted {
                kind: kind.to_string(),
                index: self.next,
            })?;
        self.next += 1;
        Ok(draw)
    }

    pub fn try_float01(&mut self) -> Result<f64, DeterminismError> {
        match self.take("float01")? {
            RngDraw::Float01 { value } => Ok(value),
            _ => Err(DeterminismError::ParamMismatch {
                kind: "float01".to_string(),
                expected_a: "-".into(),
                expected_b: "-".into(),
                actual_a: "-".into(),
                actual_b: "-".into(),
            }),
        }
    }

    pub fn try_int_range(&mut self, lo: i64, hi: i64) -> Result<i64, DeterminismError> {
        match self.take("int_range")? {
            RngDraw::IntRange {
                lo: rec_lo,
                hi: rec_hi,
                value,
            } => {
                if rec_lo != lo || rec_hi != hi {
                    return Err(DeterminismError::ParamMismatch {
                        kind: "int_range".to_string(),
                        expected_a: rec_lo.to_string(),
                        expected_b: rec_hi.to_string(),
                        actual_a: lo.to_string(),
                        actual_b: hi.to_string(),
                    });
                }
                Ok(value)
            }
            _ => Err(DeterminismError::Exhausted {
                kind: "int_range".to_string(),
                index: self.next,
            }),
        }
    }

    pub fn try_choice_index(&mut self, len: usize) -> Result<usize, DeterminismError> {
        match self.take("choice")? {
            RngDraw::Choice {
                len: rec_len,
                value,
            } => {
                if rec_len != len {
                    return Err(DeterminismError::ParamMismatch {
                        kind: "choice".to_string(),
                        expected_a: rec_len.to_string(),
                        expected_b: "-".into(),
                        actual_a: len.to_string(),
                        actual_b: "-".into(),
                    });
                }
                Ok(value)
            }
            _ => Err(DeterminismError::Exhausted {
                kind: "choice".to_string(),
                index: self.next,
            }),
        }
    }

    pub fn try_uuid(&mut self) -> Result<Uuid, DeterminismError> {
        match self.take("uuid")? {
            RngDraw::Uuid { value } => Ok(value),
            _ => Err(DeterminismError::Exhausted {
                kind: "uuid".to_string(),
                index: self.next,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_then_replay_reproduces_sequence() {
        let mut live = RecordingRng::new(LiveRng::seeded(42));
        let a = live.int_range(1, 10);
        let b = live.float01();
        let draws = live.take_log();

        let mut replay = ReplayRng::new(draws);
        assert_eq!(replay.try_int_range(1, 10).unwrap(), a);
        assert_eq!(replay.try_float01().unwrap(), b);
    }

    #[test]
    fn replay_detects_param_mismatch() {
        let mut live = RecordingRng::new(LiveRng::seeded(1));
        let _ = live.int_range(1, 10);
        let draws = live.take_log();

        let mut replay = ReplayRng::new(draws);
        let err = replay.try_int_range(2, 10).unwrap_err();
        matches!(err, DeterminismError::ParamMismatch { .. });
    }

    #[test]
    fn replay_detects_exhaustion() {
        let mut replay = ReplayRng::new(vec![]);
        let err = replay.try_float01().unwrap_err();
        matches!(err, DeterminismError::Exhausted { .. });
    }

    #[test]
    fn frozen_clock_always_returns_same_instant() {
        let now = Utc::now();
        let clock = FrozenClock::new(now);
        assert_eq!(clock.now(), now);
        assert_eq!(clock.now(), now);
    }
}
