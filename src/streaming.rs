//! Streaming Capture/Replay (C5)
//!
//! Captures token-by-token streaming output (e.g. LLM completions) with a
//! monotonic per-stream index and a single well-formed final token, and
//! replays the recorded sequence either immediately or with the original
//! inter-token timing (capped at one second per gap).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StreamError;

const MAX_REPLAY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamToken {
    pub content: String,
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Value>,
    pub is_final: bool,
}

struct StreamState {
    tokens: Vec<StreamToken>,
    closed: bool,
}

/// Captures chunks for any number of concurrently open streams.
pub struct StreamRecorder {
    streams: Mutex<HashMap<String, StreamState>>,
}

impl StreamRecorder {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_stream(&self, stream_id: &str) {
        self.streams.lock().unwrap().insert(
            stream_id.to_string(),
            StreamState {
                tokens: Vec::new(),
                closed: false,
            },
        );
    }

    /// Append a chunk with an auto-assigned monotonic index and the current
    /// timestamp. `is_final` closes the stream to further chunks.
    pub fn record_chunk(
        &self,
        stream_id: &str,
        content: &str,
        metadata: Option<Value>,
        is_final: bool,
    ) -> Result<(), StreamError> {
        let mut streams = self.streams.lock().unwrap();
        let state = streams
            .get_mut(stream_id)
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))?;
        if state.closed {
            return Err(StreamError::AlreadyFinal(stream_id.to_string()));
        }
        let index = state.tokens.len() as u64;
        state.tokens.push(StreamToken {
            content: content.to_string(),
            index,
            timestamp: Utc::now(),
            metadata,
            is_final,
        });
        if is_final {
            state.closed = true;
        }
        Ok(())
    }

    pub fn is_closed(&self, stream_id: &str) -> bool {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .map(|s| s.closed)
            .unwrap_or(false)
    }

    pub fn tokens(&self, stream_id: &str) -> Option<Vec<StreamToken>> {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .map(|s| s.tokens.clone())
    }

    /// Finalize a stream for writing, regardless of whether a final token
    /// was ever recorded (a stream without one is "partial"/"recoverable").
    pub fn finish_stream(&self, stream_id: &str) -> Result<Vec<StreamToken>, StreamError> {
        let streams = self.streams.lock().unwrap();
        let state = streams
            .get(stream_id)
            .ok_or_else(|| StreamError::UnknownStream(stream_id.to_string()))?;
        Ok(state.tokens.clone())
    }
}

impl Default for StreamRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replays a recorded token sequence in index order, optionally waiting
/// between tokens using the recorded inter-token delay (hard-capped at 1s).
pub struct StreamReplay {
    tokens: Vec<StreamToken>,
    preserve_timing: bool,
}

impl StreamReplay {
    pub fn new(tokens: Vec<StreamToken>) -> Self {
        let mut sorted = tokens;
        sorted.sort_by_key(|t| t.index);
        Self {
            tokens: sorted,
            preserve_timing: false,
        }
    }

    pub fn set_timing_mode(&mut self, preserve_timing: bool) {
        self.preserve_timing = preserve_timing;
    }

    /// Synchronous cooperative replay: calls `on_token` for each token in
    /// order, sleeping between tokens when timing preservation is enabled.
    pub fn replay_sync(&self, mut on_token: impl FnMut(&StreamToken)) {
        for (i, token) in self.tokens.iter().enumerate() {
            on_token(token);
            if self.preserve_timing {
                if let Some(next) = self.tokens.get(i + 1) {
                    let delta = (next.timestamp - token.timestamp)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    std::thread::sleep(delta.min(MAX_REPLAY_DELAY));
                }
            }
        }
    }

    pub async fn replay_async(&self, mut on_token: impl FnMut(&StreamToken)) {
        for (i, token) in self.tokens.iter().enumerate() {
            on_token(token);
            if self.preserve_timing {
                if let Some(next) = self.tokens.get(i + 1) {
                    let delta = (next.timestamp - token.timestamp)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    tokio::time::sleep(delta.min(MAX_REPLAY_DELAY)).await;
                }
            }
        }
    }

    pub fn full_content(&self) -> String {
        self.tokens
            .iter()
            .filter(|t| !t.is_final || !t.content.is_empty())
            .map(|t| t.content.as_str())
            .collect()
    }
}

/// Stream identity for an LLM call's streaming wrapper: agent id plus a
/// stable hash of the prompt, matching the lookup-key style used for
/// non-streaming IO edges.
pub fn stream_identity(agent_id: &str, prompt: &str, algorithm: crate::canonical::HashAlgorithm) -> String {
    let fp = crate::canonical::fingerprint(&serde_json::Value::String(prompt.to_string()), algorithm);
    format!("llm_stream_{}_{}", agent_id, &fp[..fp.len().min(10)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_stream_has_single_final_token() {
        let recorder = StreamRecorder::new();
        recorder.start_stream("s1");
        for chunk in ["Once", " upon", " a", " time"] {
            recorder.record_chunk("s1", chunk, None, false).unwrap();
        }
        recorder.record_chunk("s1", "", None, true).unwrap();

        let tokens = recorder.finish_stream("s1").unwrap();
        assert_eq!(tokens.iter().filter(|t| t.is_final).count(), 1);
        assert!(tokens.last().unwrap().is_final);
        let indices: Vec<u64> = tokens.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn chunk_after_final_is_rejected() {
        let recorder = StreamRecorder::new();
        recorder.start_stream("s1");
        recorder.record_chunk("s1", "x", None, true).unwrap();
        let err = recorder.record_chunk("s1", "y", None, false).unwrap_err();
        matches!(err, StreamError::AlreadyFinal(_));
    }

    #[test]
    fn replay_without_timing_yields_content_in_order() {
        let recorder = StreamRecorder::new();
        recorder.start_stream("s1");
        for chunk in ["Once", " upon", " a", " time"] {
            recorder.record_chunk("s1", chunk, None, false).unwrap();
        }
        recorder.record_chunk("s1", "", None, true).unwrap();
        let tokens = recorder.finish_stream("s1").unwrap();

        let replay = StreamReplay::new(tokens);
        let mut seen = Vec::new();
        replay.replay_sync(|t| seen.push(t.content.clone()));

        assert_eq!(seen.len(), 5);
        assert_eq!(
            seen.iter().filter(|c| !c.is_empty()).cloned().collect::<String>(),
            "Once upon a time"
        );
    }
}
