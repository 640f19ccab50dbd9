//! Recording manifest and failure-context data model (§3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::canonical::HashAlgorithm;

/// One entry of `file_hashes`. The distilled format stores `{hash, size,
/// algorithm}`; a legacy bare-hex-string form must also be accepted on read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileHashEntry {
    pub hash: String,
    pub size: u64,
    pub algorithm: String,
}

fn deserialize_file_hashes<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, FileHashEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Legacy(String),
        Full(FileHashEntry),
    }

    let raw: BTreeMap<String, Entry> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let entry = match v {
                Entry::Legacy(hash) => FileHashEntry {
                    hash,
                    size: 0,
                    algorithm: "unknown".to_string(),
                },
                Entry::Full(entry) => entry,
            };
            (k, entry)
        })
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub recording_id: String,
    pub schema_version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub adapter_name: String,
    pub adapter_version: String,
    #[serde(default)]
    pub config_digest: Option<String>,
    #[serde(default)]
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub seeds: Vec<u64>,
    #[serde(default)]
    pub git_sha: Option<String>,
    pub hash_algorithm: HashAlgorithm,
    #[serde(deserialize_with = "deserialize_file_hashes")]
    pub file_hashes: BTreeMap<String, FileHashEntry>,
    pub event_count: u64,
    pub total_chunks: u64,
    pub redaction_applied: bool,
    pub compression_enabled: bool,
    pub artifacts_size_bytes: u64,
    #[serde(default)]
    pub manifest_hash: Option<String>,
    #[serde(default)]
    pub reconstructed: bool,
    #[serde(default)]
    pub aborted: bool,
}

impl RecordingManifest {
    pub fn schema_major_version(&self) -> Option<u32> {
        self.schema_version
            .split('.')
            .next()
            .and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    RecordingInitFailed,
    RecordingIoError,
    RecordingDiskFull,
    RecordingPermissionDenied,
    ReplayRecordingNotFound,
    ReplayIntegrityCheckFailed,
    ReplayManifestCorrupted,
    ReplayEventsCorrupted,
    ReplayLookupMismatch,
    ReplayInputFingerprintMismatch,
    SystemOutOfMemory,
    SystemDependencyMissing,
    SystemPermissionError,
    DataCorruptionDetected,
    DataPartialCorruption,
    DataSchemaMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub failure_mode: FailureMode,
    pub error: String,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub recovery_attempted: bool,
    pub recovery_successful: bool,
    pub traceback: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_bare_hash_string_deserializes() {
        let yaml = r#"
recording_id: rec_1
schema_version: "1.0"
start_time: "2026-01-01T00:00:00Z"
end_time: null
adapter_name: test
adapter_version: "0.1"
hash_algorithm: blake3
file_hashes:
  events_000.jsonl: "deadbeef"
event_count: 0
total_chunks: 0
redaction_applied: true
compression_enabled: false
artifacts_size_bytes: 0
"#;
        let manifest: RecordingManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            manifest.file_hashes.get("events_000.jsonl").unwrap().hash,
            "deadbeef"
        );
    }

    #[test]
    fn schema_major_version_parses() {
        let yaml = r#"
recording_id: rec_1
schema_version: "1.3"
start_time: "2026-01-01T00:00:00Z"
end_time: null
adapter_name: test
adapter_version: "0.1"
hash_algorithm: blake3
file_hashes: {}
event_count: 0
total_chunks: 0
redaction_applied: true
compression_enabled: false
artifacts_size_bytes: 0
"#;
        let manifest: RecordingManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.schema_major_version(), Some(1));
    }
}
