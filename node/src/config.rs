// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::PathBuf;

use replay_kernel::{HashAlgorithm, RedactionLevel, RetentionClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Strict,
    Warn,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub compression_enabled: bool,
    pub max_file_size_mb: u64,
    pub hash_algorithm: HashAlgorithm,
    pub redaction_level: RedactionLevel,
    pub replay_mode: ReplayMode,
    pub preserve_timing: bool,
    pub retention_class: RetentionClass,
    pub write_queue_capacity: usize,
    pub manifest_hash_required: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let output_dir = std::env::var("REPLAY_OUTPUT_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("artifacts"));

        let bind_addr = std::env::var("REPLAY_BIND")
            .unwrap_or_else(|_| "127.0.0.1:3100".to_string())
            .parse()
            .expect("invalid bind address");

        let compression_enabled = std::env::var("REPLAY_COMPRESSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let max_file_size_mb = std::env::var("REPLAY_MAX_FILE_SIZE_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let hash_algorithm = std::env::var("REPLAY_HASH_ALGORITHM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let redaction_level = match std::env::var("REPLAY_REDACTION_LEVEL").as_deref() {
            Ok("none") => RedactionLevel::None,
            Ok("standard") => RedactionLevel::Standard,
            Ok("strict") => RedactionLevel::Strict,
            _ => RedactionLevel::Basic,
        };

        let replay_mode = match std::env::var("REPLAY_MODE").as_deref() {
            Ok("warn") => ReplayMode::Warn,
            Ok("hybrid") => ReplayMode::Hybrid,
            _ => ReplayMode::Strict,
        };

        let preserve_timing = std::env::var("REPLAY_PRESERVE_TIMING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let retention_class = match std::env::var("REPLAY_RETENTION_CLASS").as_deref() {
            Ok("ci") => RetentionClass::Ci,
            Ok("production") => RetentionClass::Production,
            Ok("audit") => RetentionClass::Audit,
            _ => RetentionClass::Development,
        };

        let write_queue_capacity = std::env::var("REPLAY_WRITE_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);

        let manifest_hash_required = std::env::var("REPLAY_MANIFEST_HASH_REQUIRED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(matches!(
                retention_class,
                RetentionClass::Production | RetentionClass::Audit
            ));

        Self {
            output_dir,
            bind_addr,
            compression_enabled,
            max_file_size_mb,
            hash_algorithm,
            redaction_level,
            replay_mode,
            preserve_timing,
            retention_class,
            write_queue_capacity,
            manifest_hash_required,
        }
    }
}
