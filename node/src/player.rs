// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Player (C7)
//!
//! Loads a recorded session and substitutes IO edges with recorded outputs.
//! `load` validates the manifest and every listed file hash before building
//! an in-memory lookup map; `get_recorded_output` branches on replay mode
//! exactly as the `EnhancedPlayer.get_recorded_output` method this module is
//! modeled on: strict and warn both fail closed on a mismatch, hybrid serves
//! the recorded output anyway with a warning.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use replay_kernel::{
    canonical, Disposition, FailureMode, FailureModeHandler, HashAlgorithm, IoKey,
    RecordingManifest, StreamToken,
};

use crate::config::ReplayMode;
use crate::integrity::{IntegrityChecker, IntegrityError};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("recording not found: {0}")]
    RecordingNotFound(String),
    #[error("manifest corrupted: {0}")]
    ManifestCorrupted(String),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IntegrityError> for PlayerError {
    fn from(e: IntegrityError) -> Self {
        match e {
            IntegrityError::ManifestValidation(msg) => PlayerError::ManifestCorrupted(msg),
            other => PlayerError::IntegrityCheckFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RecordedIoLine {
    lookup_key: String,
    input_fingerprint: String,
    input_data: Value,
    output_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkLine {
    stream_id: String,
    content: String,
    index: u64,
    timestamp: chrono::DateTime<chrono::Utc>,
    metadata: Option<Value>,
    is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    MissingRecording,
    FingerprintMismatch,
}

#[derive(Debug, Default, Clone)]
pub struct ReplayStats {
    pub total_replays: u64,
    pub mismatch_count: u64,
    pub missing_count: u64,
    pub fingerprint_mismatch_count: u64,
}

/// Holds one loaded recording: its manifest, a lookup map of recorded IO
/// edges keyed by canonical lookup key, and grouped stream token sequences.
pub struct Player {
    current_run_id: String,
    manifest: RecordingManifest,
    recorded_ios: HashMap<String, RecordedIoLine>,
    recorded_streams: HashMap<String, Vec<StreamToken>>,
    replay_mode: ReplayMode,
    hash_algorithm: HashAlgorithm,
    stats: ReplayStats,
}

impl Player {
    /// Load a recorded session for replay: validate the manifest and file
    /// hashes, then build the in-memory lookup map and stream index. A
    /// failed integrity check is routed through the [`FailureModeHandler`]
    /// (C9): a repair-and-continue disposition salvages the corrupted
    /// `events_*` file via [`recover_events_file`] and retries the load from
    /// the recovered file before giving up, matching
    /// `EnhancedPlayer.load_recording`'s recovery path.
    pub fn load(
        dir: &Path,
        replay_mode: ReplayMode,
        manifest_hash_required: bool,
    ) -> Result<Self, PlayerError> {
        if !dir.exists() {
            return Err(PlayerError::RecordingNotFound(dir.display().to_string()));
        }

        let manifest_path = dir.join("manifest.yaml");
        let manifest = IntegrityChecker::verify_manifest_integrity(&manifest_path, manifest_hash_required)?;

        let manifest = match IntegrityChecker::verify_recording(dir, &manifest) {
            Ok(()) => manifest,
            Err(e) => Self::recover_from_integrity_failure(dir, manifest, e)?,
        };

        let mut recorded_ios = HashMap::new();
        for name in manifest.file_hashes.keys() {
            if name.starts_with("events_") {
                let path = dir.join(name);
                let compressed = !name.ends_with("_recovered.jsonl") && manifest.compression_enabled;
                let lines = read_ndjson_lines(&path, compressed)?;
                for line in lines {
                    if let Ok(parsed) = serde_json::from_str::<RecordedIoLine>(&line) {
                        recorded_ios.insert(parsed.lookup_key.clone(), parsed);
                    }
                }
            }
        }

        let mut recorded_streams: HashMap<String, Vec<StreamToken>> = HashMap::new();
        for name in manifest.file_hashes.keys() {
            if name.starts_with("chunks") {
                let path = dir.join(name);
                let lines = read_ndjson_lines(&path, manifest.compression_enabled)?;
                for line in lines {
                    if let Ok(parsed) = serde_json::from_str::<ChunkLine>(&line) {
                        recorded_streams
                            .entry(parsed.stream_id.clone())
                            .or_default()
                            .push(StreamToken {
                                content: parsed.content,
                                index: parsed.index,
                                timestamp: parsed.timestamp,
                                metadata: parsed.metadata,
                                is_final: parsed.is_final,
                            });
                    }
                }
            }
        }
        for tokens in recorded_streams.values_mut() {
            tokens.sort_by_key(|t| t.index);
        }

        let hash_algorithm = manifest.hash_algorithm;
        let current_run_id = manifest.recording_id.clone();

        Ok(Self {
            current_run_id,
            manifest,
            recorded_ios,
            recorded_streams,
            replay_mode,
            hash_algorithm,
            stats: ReplayStats::default(),
        })
    }

    /// Consult the failure-mode handler about an integrity failure and, on a
    /// repair-and-continue disposition, salvage every corrupted `events_*`
    /// file into a `*_recovered.jsonl` sibling and patch the in-memory
    /// manifest to read from it. Any other disposition propagates the
    /// original error.
    fn recover_from_integrity_failure(
        dir: &Path,
        manifest: RecordingManifest,
        cause: IntegrityError,
    ) -> Result<RecordingManifest, PlayerError> {
        let failure_mode = match &cause {
            IntegrityError::MissingFile(_) => FailureMode::ReplayRecordingNotFound,
            _ => FailureMode::ReplayEventsCorrupted,
        };

        let mut context = BTreeMap::new();
        context.insert("recording_id".to_string(), manifest.recording_id.clone());
        context.insert("recording_dir".to_string(), dir.display().to_string());

        let handler = FailureModeHandler::new();
        let disposition = handler.handle_failure(failure_mode, &cause.to_string(), context);

        if !matches!(disposition, Disposition::Continue) {
            return Err(cause.into());
        }

        tracing::warn!(
            error = %cause,
            recording_id = %manifest.recording_id,
            "integrity check failed, repairing corrupted event files and continuing"
        );

        let report = IntegrityChecker::check(dir, &manifest)?;
        let mut broken: Vec<&String> = report.hash_mismatches.iter().collect();
        if broken.is_empty() {
            // Nothing hash-mismatched (e.g. a missing events file some other
            // failure mode flagged); fall back to every events_* entry.
            broken = manifest.file_hashes.keys().filter(|n| n.starts_with("events_")).collect();
        }
        let broken_names: Vec<String> = broken
            .into_iter()
            .map(|entry| entry.split(' ').next().unwrap_or(entry).to_string())
            .filter(|name| name.starts_with("events_"))
            .collect();

        let mut manifest = manifest;
        for name in broken_names {
            let path = dir.join(&name);
            if !path.exists() {
                continue;
            }
            let was_compressed = name.ends_with(".zst");
            let recovered_path = recover_events_file(&path, was_compressed)?;
            let bytes = std::fs::read(&recovered_path)?;
            let recovered_name = recovered_path
                .file_name()
                .expect("recovered path has a file name")
                .to_string_lossy()
                .to_string();

            manifest.file_hashes.remove(&name);
            manifest.file_hashes.insert(
                recovered_name,
                replay_kernel::FileHashEntry {
                    hash: blake3::hash(&bytes).to_hex().to_string(),
                    size: bytes.len() as u64,
                    algorithm: "unknown".to_string(),
                },
            );
        }

        Ok(manifest)
    }

    pub fn recording_id(&self) -> &str {
        &self.current_run_id
    }

    pub fn manifest(&self) -> &RecordingManifest {
        &self.manifest
    }

    /// Resolve a recorded output for a given call. Returns `(matched,
    /// output)`; `output` is only meaningful when `matched` is true, except
    /// in hybrid mode on a fingerprint mismatch, where a recorded output is
    /// still returned alongside a warning the caller is expected to log.
    pub fn get_recorded_output(
        &mut self,
        event_type: &str,
        adapter: &str,
        agent_id: &str,
        tool_name: &str,
        input: &Value,
        call_index: u64,
    ) -> (bool, Option<Value>) {
        self.stats.total_replays += 1;

        let io_key = IoKey {
            event_type: event_type.to_string(),
            adapter: adapter.to_string(),
            agent_id: agent_id.to_string(),
            tool_name: tool_name.to_string(),
            call_index,
            input_fingerprint: canonical::fingerprint(input, self.hash_algorithm),
        };
        let lookup_key = io_key.to_canonical_string();

        let recorded = match self.recorded_ios.get(&lookup_key) {
            Some(r) => r.clone(),
            None => {
                self.stats.missing_count += 1;
                self.stats.mismatch_count += 1;
                tracing::warn!(lookup_key = %lookup_key, "replay: missing recording");
                return (false, None);
            }
        };

        if recorded.input_fingerprint != io_key.input_fingerprint {
            self.stats.fingerprint_mismatch_count += 1;
            self.stats.mismatch_count += 1;
            tracing::warn!(lookup_key = %lookup_key, "replay: input fingerprint mismatch");
            return match self.replay_mode {
                ReplayMode::Hybrid => (true, Some(recorded.output_data)),
                ReplayMode::Strict | ReplayMode::Warn => (false, None),
            };
        }

        tracing::debug!(lookup_key = %lookup_key, "replay: matched");
        (true, Some(recorded.output_data))
    }

    pub fn get_stream_tokens(&self, stream_id: &str) -> Option<&[StreamToken]> {
        self.recorded_streams.get(stream_id).map(|v| v.as_slice())
    }

    pub fn replay_stream(&self, stream_id: &str, preserve_timing: bool) -> Option<replay_kernel::StreamReplay> {
        let tokens = self.get_stream_tokens(stream_id)?.to_vec();
        let mut replay = replay_kernel::StreamReplay::new(tokens);
        replay.set_timing_mode(preserve_timing);
        Some(replay)
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }
}

/// Read an NDJSON file line by line, tolerating a truncated final line: if
/// the last line fails to parse as UTF-8/decompress and starts within the
/// trailing 100 bytes of the file, it is dropped as an incomplete tail
/// rather than treated as corruption.
fn read_ndjson_lines(path: &Path, compressed: bool) -> Result<Vec<String>, PlayerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read(path)?;
    let mut lines = Vec::new();
    let mut offset = 0usize;
    let total_len = raw.len();

    for (i, chunk) in raw.split(|b| *b == b'\n').enumerate() {
        if chunk.is_empty() {
            offset += 1;
            continue;
        }
        let chunk_start = offset;
        offset += chunk.len() + 1;
        let _ = i;

        if compressed {
            let mut decoder = match zstd::stream::read::Decoder::new(chunk) {
                Ok(d) => d,
                Err(_) => {
                    if total_len.saturating_sub(chunk_start) <= 100 {
                        break;
                    }
                    continue;
                }
            };
            let mut out = String::new();
            match decoder.read_to_string(&mut out) {
                Ok(_) => lines.push(out),
                Err(_) => {
                    if total_len.saturating_sub(chunk_start) <= 100 {
                        break;
                    }
                }
            }
        } else {
            match std::str::from_utf8(chunk) {
                Ok(s) => lines.push(s.to_string()),
                Err(_) => {
                    if total_len.saturating_sub(chunk_start) <= 100 {
                        break;
                    }
                }
            }
        }
    }

    Ok(lines)
}

/// Recover from a truncated events file: re-read every line independently,
/// discard unparseable records, and write a `*_recovered` sibling with the
/// salvaged ones. Used by the failure-mode handler's REPAIR_AND_CONTINUE
/// strategy for `ReplayEventsCorrupted`.
pub fn recover_events_file(path: &Path, compressed: bool) -> Result<PathBuf, PlayerError> {
    let lines = read_ndjson_lines(path, compressed)?;
    let valid: Vec<String> = lines
        .into_iter()
        .filter(|l| serde_json::from_str::<Value>(l).is_ok())
        .collect();

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let recovered_path = path.with_file_name(format!("{}_recovered.jsonl", stem));
    let mut out = String::new();
    for line in &valid {
        out.push_str(line);
        out.push('\n');
    }
    std::fs::write(&recovered_path, out)?;
    Ok(recovered_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use replay_kernel::{HashAlgorithm, RedactionLevel};
    use serde_json::json;
    use tempfile::tempdir;

    fn record_simple(dir: &Path) -> String {
        let recorder = Recorder::start_recording(
            dir,
            "test-adapter",
            "0.1",
            RedactionLevel::None,
            HashAlgorithm::Blake3,
            false,
            100,
            64,
        )
        .unwrap();
        recorder
            .record_event(
                "llm_call",
                "test-adapter",
                "agent-1",
                "gpt-4",
                json!({"prompt": "hi"}),
                json!({"text": "hello"}),
            )
            .unwrap();
        let manifest = recorder.stop_recording().unwrap();
        manifest.recording_id
    }

    #[test]
    fn replay_matches_identical_input() {
        let dir = tempdir().unwrap();
        let recording_id = record_simple(dir.path());
        let recording_dir = dir.path().join(&recording_id);

        let mut player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": "hi"}),
            0,
        );
        assert!(matched);
        assert_eq!(output.unwrap()["text"], "hello");
        assert_eq!(player.stats().mismatch_count, 0);
    }

    #[test]
    fn strict_mode_rejects_fingerprint_mismatch() {
        let dir = tempdir().unwrap();
        let recording_id = record_simple(dir.path());
        let recording_dir = dir.path().join(&recording_id);

        let mut player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": "bye"}),
            0,
        );
        assert!(!matched);
        assert!(output.is_none());
    }

    #[test]
    fn hybrid_mode_serves_output_despite_mismatch() {
        let dir = tempdir().unwrap();
        let recording_id = record_simple(dir.path());
        let recording_dir = dir.path().join(&recording_id);

        let mut player = Player::load(&recording_dir, ReplayMode::Hybrid, true).unwrap();
        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": "bye"}),
            0,
        );
        assert!(matched);
        assert!(output.is_some());
    }

    #[test]
    fn missing_recording_is_a_mismatch_in_every_mode() {
        let dir = tempdir().unwrap();
        let recording_id = record_simple(dir.path());
        let recording_dir = dir.path().join(&recording_id);

        let mut player = Player::load(&recording_dir, ReplayMode::Hybrid, true).unwrap();
        let (matched, _) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": "hi"}),
            5,
        );
        assert!(!matched);
    }

    #[test]
    fn load_repairs_a_truncated_events_file_and_succeeds() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::start_recording(
            dir.path(),
            "test-adapter",
            "0.1",
            RedactionLevel::None,
            HashAlgorithm::Blake3,
            false,
            100,
            64,
        )
        .unwrap();
        for i in 0..3 {
            recorder
                .record_event(
                    "llm_call",
                    "test-adapter",
                    "agent-1",
                    "gpt-4",
                    json!({"prompt": format!("p{}", i)}),
                    json!({"text": format!("r{}", i)}),
                )
                .unwrap();
        }
        let manifest = recorder.stop_recording().unwrap();
        let recording_dir = dir.path().join(&manifest.recording_id);
        let events_path = recording_dir.join("events_000.jsonl");

        let original = std::fs::read_to_string(&events_path).unwrap();
        let mut truncated = original.clone();
        truncated.truncate(original.len() - 5);
        std::fs::write(&events_path, &truncated).unwrap();

        let mut player = Player::load(&recording_dir, ReplayMode::Strict, false)
            .expect("corrupted recording should be repaired and load anyway");

        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": "p0"}),
            0,
        );
        assert!(matched, "the well-formed prior lines should still replay");
        assert_eq!(output.unwrap()["text"], "r0");
    }
}
