// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Recorder (C6)
//!
//! Owns one recording directory exclusively, accepts ordered events and
//! stream chunks, applies ordering/fingerprinting/redaction, and persists
//! everything through a single background writer so on-disk order matches
//! logical step order. Mirrors the `EnhancedRecorder` lifecycle
//! (`start_recording`/`record_event`/`start_streaming`/`record_chunk`/
//! `finish_streaming`/`checkpoint`/`stop_recording`) this crate's ancestor
//! event-log writer implements with length-prefixed fsync-per-append
//! framing; here the on-disk format is newline-delimited JSON per §6.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use replay_kernel::{
    canonical, CanonicalValue, FileHashEntry, HashAlgorithm, IoKey, OrderedEvent, OrderingManager,
    RecordingManifest, RedactionFilter, RedactionLevel, StreamRecorder, StreamToken,
};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to initialize recording directory {0}: {1}")]
    InitFailed(PathBuf, String),
    #[error("recording directory already owned by another recorder: {0}")]
    AlreadyOwned(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown stream: {0}")]
    UnknownStream(String),
}

struct WriterState {
    events_path: PathBuf,
    events_file: File,
    chunks_file: File,
    checkpoints_file: File,
    segment_index: u32,
    bytes_written: u64,
    max_file_size_bytes: u64,
    compression_enabled: bool,
}

impl WriterState {
    fn write_event_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.bytes_written >= self.max_file_size_bytes {
            self.rotate()?;
        }
        let framed = frame_line(line, self.compression_enabled);
        self.events_file.write_all(&framed)?;
        self.events_file.write_all(b"\n")?;
        self.events_file.sync_all()?;
        self.bytes_written += framed.len() as u64 + 1;
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.segment_index += 1;
        let dir = self.events_path.parent().unwrap();
        let ext = if self.compression_enabled { "jsonl.zst" } else { "jsonl" };
        let path = dir.join(format!("events_{:03}.{}", self.segment_index, ext));
        self.events_file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.events_path = path;
        self.bytes_written = 0;
        Ok(())
    }

    fn write_chunk_line(&mut self, line: &str) -> std::io::Result<()> {
        let framed = frame_line(line, self.compression_enabled);
        self.chunks_file.write_all(&framed)?;
        self.chunks_file.write_all(b"\n")?;
        self.chunks_file.sync_all()?;
        Ok(())
    }

    fn write_checkpoint_line(&mut self, line: &str) -> std::io::Result<()> {
        self.checkpoints_file.write_all(line.as_bytes())?;
        self.checkpoints_file.write_all(b"\n")?;
        self.checkpoints_file.sync_all()?;
        Ok(())
    }
}

fn frame_line(line: &str, compression_enabled: bool) -> Vec<u8> {
    if compression_enabled {
        zstd::encode_all(line.as_bytes(), 0).unwrap_or_else(|_| line.as_bytes().to_vec())
    } else {
        line.as_bytes().to_vec()
    }
}

#[derive(Serialize)]
struct RecordedIoLine {
    lookup_key: String,
    event_type: String,
    adapter: String,
    agent_id: String,
    tool_name: String,
    call_index: u64,
    input_fingerprint: String,
    input_data: Value,
    output_data: Value,
    step: u64,
    parent_step: Option<u64>,
    timestamp: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
struct ChunkLine {
    stream_id: String,
    #[serde(flatten)]
    token: StreamTokenOwned,
}

#[derive(Serialize)]
struct StreamTokenOwned {
    content: String,
    index: u64,
    timestamp: chrono::DateTime<Utc>,
    metadata: Option<Value>,
    is_final: bool,
}

impl From<&StreamToken> for StreamTokenOwned {
    fn from(t: &StreamToken) -> Self {
        Self {
            content: t.content.clone(),
            index: t.index,
            timestamp: t.timestamp,
            metadata: t.metadata.clone(),
            is_final: t.is_final,
        }
    }
}

#[derive(Serialize)]
struct CheckpointLine {
    label: String,
    timestamp: chrono::DateTime<Utc>,
    event_count: u64,
    metadata: BTreeMap<String, String>,
}

/// Owns one recording directory. The directory is locked via a `.lock` file
/// created at `start_recording` time and removed at `stop_recording`; a
/// second `Recorder` pointed at the same directory fails to start.
pub struct Recorder {
    recording_id: String,
    dir: PathBuf,
    adapter_name: String,
    adapter_version: String,
    ordering: Arc<OrderingManager>,
    redaction: RedactionFilter,
    redaction_applied: bool,
    hash_algorithm: HashAlgorithm,
    compression_enabled: bool,
    stream_recorder: StreamRecorder,
    event_count: Arc<Mutex<u64>>,
    total_chunks: Arc<Mutex<u64>>,
    sender: SyncSender<WriteItem>,
    writer_handle: Option<JoinHandle<WriterState>>,
    start_time: chrono::DateTime<Utc>,
    aborted: bool,
}

enum WriteItem {
    Event(String),
    Chunk(String),
    Checkpoint(String),
    Stop,
}

impl Recorder {
    pub fn start_recording(
        output_dir: &Path,
        adapter_name: &str,
        adapter_version: &str,
        redaction_level: RedactionLevel,
        hash_algorithm: HashAlgorithm,
        compression_enabled: bool,
        max_file_size_mb: u64,
        write_queue_capacity: usize,
    ) -> Result<Self, RecorderError> {
        let recording_id = format!(
            "rec_{}_{}",
            &Uuid::new_v4().simple().to_string()[..8],
            Utc::now().timestamp()
        );
        let dir = output_dir.join(&recording_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| RecorderError::InitFailed(dir.clone(), e.to_string()))?;

        let lock_path = dir.join(".lock");
        if lock_path.exists() {
            return Err(RecorderError::AlreadyOwned(dir));
        }
        File::create(&lock_path)?;

        let ext = if compression_enabled { "jsonl.zst" } else { "jsonl" };
        let events_path = dir.join(format!("events_000.{}", ext));
        let events_file = OpenOptions::new().create(true).append(true).open(&events_path)?;
        let chunks_path = dir.join(format!("chunks.{}", ext));
        let chunks_file = OpenOptions::new().create(true).append(true).open(&chunks_path)?;
        let checkpoints_path = dir.join("checkpoints.jsonl");
        let checkpoints_file = OpenOptions::new().create(true).append(true).open(&checkpoints_path)?;

        let mut state = WriterState {
            events_path,
            events_file,
            chunks_file,
            checkpoints_file,
            segment_index: 0,
            bytes_written: 0,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            compression_enabled,
        };

        let (tx, rx) = mpsc::sync_channel::<WriteItem>(write_queue_capacity.max(1));
        let writer_handle = std::thread::Builder::new()
            .name("recorder-writer".into())
            .spawn(move || {
                while let Ok(item) = rx.recv() {
                    match item {
                        WriteItem::Event(line) => {
                            let _ = state.write_event_line(&line);
                        }
                        WriteItem::Chunk(line) => {
                            let _ = state.write_chunk_line(&line);
                        }
                        WriteItem::Checkpoint(line) => {
                            let _ = state.write_checkpoint_line(&line);
                        }
                        WriteItem::Stop => break,
                    }
                }
                state
            })
            .expect("failed to spawn recorder writer thread");

        let ordering = OrderingManager::new();

        Ok(Self {
            recording_id,
            dir,
            adapter_name: adapter_name.to_string(),
            adapter_version: adapter_version.to_string(),
            ordering,
            redaction: RedactionFilter::new(redaction_level),
            redaction_applied: redaction_level != RedactionLevel::None,
            hash_algorithm,
            compression_enabled,
            stream_recorder: StreamRecorder::new(),
            event_count: Arc::new(Mutex::new(0)),
            total_chunks: Arc::new(Mutex::new(0)),
            sender: tx,
            writer_handle: Some(writer_handle),
            start_time: Utc::now(),
            aborted: false,
        })
    }

    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record one completed IO edge. Blocks if the write queue is full
    /// (backpressure, no silent drop).
    pub fn record_event(
        &self,
        event_type: &str,
        adapter: &str,
        agent_id: &str,
        tool_name: &str,
        input: Value,
        output: Value,
    ) -> Result<IoKey, RecorderError> {
        let canonical_input = canonical::canonicalize(&input);
        let redacted_input = self.redaction.redact(&canonical_input);
        let canonical_output = canonical::canonicalize(&output);
        let redacted_output = self.redaction.redact(&canonical_output);

        let call_index = self.ordering.call_index(agent_id, tool_name);
        let input_fingerprint = canonical::fingerprint(&input, self.hash_algorithm);

        let io_key = IoKey {
            event_type: event_type.to_string(),
            adapter: adapter.to_string(),
            agent_id: agent_id.to_string(),
            tool_name: tool_name.to_string(),
            call_index,
            input_fingerprint,
        };

        let event = self.ordering.create_event(
            event_type,
            agent_id,
            tool_name,
            serde_json::json!({ "io_key": io_key.to_canonical_string() }),
            None,
        );

        let line = RecordedIoLine {
            lookup_key: io_key.to_canonical_string(),
            event_type: event_type.to_string(),
            adapter: adapter.to_string(),
            agent_id: agent_id.to_string(),
            tool_name: tool_name.to_string(),
            call_index,
            input_fingerprint: io_key.input_fingerprint.clone(),
            input_data: canonical_value_to_json(&redacted_input),
            output_data: canonical_value_to_json(&redacted_output),
            step: event.step,
            parent_step: event.parent_step,
            timestamp: event.timestamp,
        };

        let serialized = serde_json::to_string(&line)
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        self.sender
            .send(WriteItem::Event(serialized))
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;

        *self.event_count.lock().unwrap() += 1;
        Ok(io_key)
    }

    pub fn start_stream(&self, stream_id: &str) {
        self.stream_recorder.start_stream(stream_id);
    }

    pub fn record_chunk(
        &self,
        stream_id: &str,
        content: &str,
        metadata: Option<Value>,
        is_final: bool,
    ) -> Result<(), RecorderError> {
        self.stream_recorder
            .record_chunk(stream_id, content, metadata, is_final)
            .map_err(|e| RecorderError::UnknownStream(e.to_string()))?;

        let token = self
            .stream_recorder
            .tokens(stream_id)
            .and_then(|tokens| tokens.last().cloned())
            .expect("chunk was just recorded");

        let line = ChunkLine {
            stream_id: stream_id.to_string(),
            token: StreamTokenOwned::from(&token),
        };
        let serialized = serde_json::to_string(&line)
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        self.sender
            .send(WriteItem::Chunk(serialized))
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;
        *self.total_chunks.lock().unwrap() += 1;
        Ok(())
    }

    pub fn finish_stream(&self, stream_id: &str) -> Result<Vec<StreamToken>, RecorderError> {
        self.stream_recorder
            .finish_stream(stream_id)
            .map_err(|e| RecorderError::UnknownStream(e.to_string()))
    }

    pub fn checkpoint(&self, label: &str, metadata: BTreeMap<String, String>) -> Result<(), RecorderError> {
        let line = CheckpointLine {
            label: label.to_string(),
            timestamp: Utc::now(),
            event_count: *self.event_count.lock().unwrap(),
            metadata,
        };
        let serialized = serde_json::to_string(&line)
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        self.sender
            .send(WriteItem::Checkpoint(serialized))
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;
        Ok(())
    }

    /// Mark the recording as aborted (cancellation mid-session): buffered
    /// events still flush, but the manifest records `aborted: true`.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Drain the write queue, emit `manifest.yaml`, and release the
    /// directory lock.
    pub fn stop_recording(mut self) -> Result<RecordingManifest, RecorderError> {
        let started_at = Instant::now();
        let _ = self.sender.send(WriteItem::Stop);

        let handle = self.writer_handle.take().expect("writer handle present");
        let _final_state = handle.join().ok();
        metrics::histogram!("replay_record_event_duration_seconds", started_at.elapsed().as_secs_f64());

        let mut file_hashes = BTreeMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name == ".lock" || name == "manifest.yaml" {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let hash_hex = blake3::hash(&bytes).to_hex().to_string();
            file_hashes.insert(
                name,
                FileHashEntry {
                    hash: hash_hex,
                    size: bytes.len() as u64,
                    algorithm: self.hash_algorithm.to_string(),
                },
            );
        }

        let artifacts_size_bytes: u64 = file_hashes.values().map(|e| e.size).sum();

        let mut hash_input = String::new();
        for (name, entry) in &file_hashes {
            hash_input.push_str(name);
            hash_input.push(':');
            hash_input.push_str(&entry.hash);
            hash_input.push('\n');
        }
        let manifest_hash = Some(blake3::hash(hash_input.as_bytes()).to_hex().to_string());

        let manifest = RecordingManifest {
            recording_id: self.recording_id.clone(),
            schema_version: "1.0".to_string(),
            start_time: self.start_time,
            end_time: Some(Utc::now()),
            adapter_name: self.adapter_name.clone(),
            adapter_version: self.adapter_version.clone(),
            config_digest: None,
            model_ids: Vec::new(),
            seeds: Vec::new(),
            git_sha: discover_git_sha(),
            hash_algorithm: self.hash_algorithm,
            file_hashes,
            event_count: *self.event_count.lock().unwrap(),
            total_chunks: *self.total_chunks.lock().unwrap(),
            redaction_applied: self.redaction_applied,
            compression_enabled: self.compression_enabled,
            artifacts_size_bytes,
            manifest_hash,
            reconstructed: false,
            aborted: self.aborted,
        };

        let yaml = serde_yaml::to_string(&manifest)
            .map_err(|e| RecorderError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        std::fs::write(self.dir.join("manifest.yaml"), yaml)?;
        let _ = std::fs::remove_file(self.dir.join(".lock"));

        Ok(manifest)
    }
}

fn canonical_value_to_json(value: &CanonicalValue) -> Value {
    let json_str = canonical::to_canonical_json(value);
    serde_json::from_str(&json_str).unwrap_or(Value::Null)
}

fn discover_git_sha() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
}
