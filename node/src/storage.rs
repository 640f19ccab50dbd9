// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage Manager (supplemental, grounded on `storage.py`)
//!
//! Lists, inspects, and prunes recordings under an output directory.
//! Retention-driven cleanup and size accounting mirror `storage.py`'s
//! `cleanup_old_recordings`/`get_storage_stats`, adapted to the manifest
//! and retention-policy types this crate already defines.

use std::path::{Path, PathBuf};

use thiserror::Error;

use replay_kernel::{RecordingManifest, RetentionClass, RetentionManager};

use crate::integrity::{IntegrityChecker, IntegrityError, IntegrityReport};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("recording not found: {0}")]
    NotFound(String),
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub recording_id: String,
    pub dir: PathBuf,
    pub manifest: RecordingManifest,
    pub size_bytes: u64,
}

pub struct StorageManager {
    root: PathBuf,
    manifest_hash_required: bool,
}

impl StorageManager {
    pub fn new(root: PathBuf, manifest_hash_required: bool) -> Self {
        Self {
            root,
            manifest_hash_required,
        }
    }

    /// Enumerate every recording under the root that has a readable
    /// manifest. Recordings whose manifest fails to parse are skipped
    /// rather than surfaced as an error, since one corrupted recording
    /// should not block listing the rest.
    pub fn list_recordings(&self) -> Result<Vec<RecordingInfo>, StorageError> {
        let mut out = Vec::new();
        if !self.root.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            let manifest_path = dir.join("manifest.yaml");
            let manifest = match IntegrityChecker::verify_manifest_integrity(
                &manifest_path,
                self.manifest_hash_required,
            ) {
                Ok(m) => m,
                Err(_) => continue,
            };
            out.push(RecordingInfo {
                recording_id: manifest.recording_id.clone(),
                size_bytes: manifest.artifacts_size_bytes,
                manifest,
                dir,
            });
        }
        out.sort_by(|a, b| a.manifest.start_time.cmp(&b.manifest.start_time));
        Ok(out)
    }

    pub fn get_recording_info(&self, recording_id: &str) -> Result<RecordingInfo, StorageError> {
        self.list_recordings()?
            .into_iter()
            .find(|r| r.recording_id == recording_id)
            .ok_or_else(|| StorageError::NotFound(recording_id.to_string()))
    }

    pub fn delete_recording(&self, recording_id: &str) -> Result<(), StorageError> {
        let info = self.get_recording_info(recording_id)?;
        std::fs::remove_dir_all(&info.dir)?;
        Ok(())
    }

    /// Apply the retention class's age/size policy to every recording
    /// directory under the root. Returns the names of the directories
    /// removed (each is a recording id, since recordings are stored one per
    /// subdirectory).
    pub fn cleanup_old_recordings(&self, class: RetentionClass) -> Result<Vec<String>, StorageError> {
        if !class.policy().auto_cleanup {
            return Ok(Vec::new());
        }
        let (cleaned, _retained, errors) = RetentionManager::cleanup(&self.root, class, false)?;
        if let Some(first) = errors.first() {
            tracing::warn!(error = %first, "cleanup encountered errors on some entries");
        }
        Ok(cleaned)
    }

    pub fn verify_recording_integrity(&self, recording_id: &str) -> Result<IntegrityReport, StorageError> {
        let info = self.get_recording_info(recording_id)?;
        Ok(IntegrityChecker::check(&info.dir, &info.manifest)?)
    }

    pub fn total_size_bytes(&self) -> Result<u64, StorageError> {
        Ok(self.list_recordings()?.iter().map(|r| r.size_bytes).sum())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use replay_kernel::{HashAlgorithm, RedactionLevel};
    use serde_json::json;
    use tempfile::tempdir;

    fn record_one(root: &Path) -> String {
        let recorder = Recorder::start_recording(
            root,
            "a",
            "0.1",
            RedactionLevel::None,
            HashAlgorithm::Blake3,
            false,
            100,
            64,
        )
        .unwrap();
        recorder
            .record_event("llm_call", "a", "agent-1", "gpt-4", json!({"p": 1}), json!({"o": 1}))
            .unwrap();
        recorder.stop_recording().unwrap().recording_id
    }

    #[test]
    fn lists_and_deletes_recordings() {
        let dir = tempdir().unwrap();
        let id = record_one(dir.path());

        let manager = StorageManager::new(dir.path().to_path_buf(), false);
        let recordings = manager.list_recordings().unwrap();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].recording_id, id);

        manager.delete_recording(&id).unwrap();
        assert!(manager.list_recordings().unwrap().is_empty());
    }

    #[test]
    fn cleanup_respects_retention_policy() {
        let dir = tempdir().unwrap();
        record_one(dir.path());

        let manager = StorageManager::new(dir.path().to_path_buf(), false);
        // Freshly recorded, well under the development-class age/size cap:
        // nothing should be removed.
        let removed = manager
            .cleanup_old_recordings(replay_kernel::RetentionClass::Development)
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(manager.list_recordings().unwrap().len(), 1);
    }
}
