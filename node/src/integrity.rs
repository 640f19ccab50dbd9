// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Integrity Checker (C8)
//!
//! Validates a recording directory before it is handed to the Player:
//! manifest structural validation, per-file hash verification against
//! `manifest.yaml`, and detection of orphan files (present on disk, absent
//! from the manifest) or missing files (listed, absent from disk). Modeled
//! on `integrity.py`'s `verify_recording_integrity` and this crate's
//! streaming BLAKE3 file-hash computation in `event_proof.rs`.

use std::collections::BTreeSet;
use std::path::Path;

use thiserror::Error;

use replay_kernel::{HashAlgorithm, RecordingManifest};

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("manifest file missing: {0}")]
    ManifestMissing(std::path::PathBuf),
    #[error("manifest validation failed: {0}")]
    ManifestValidation(String),
    #[error("file hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("file listed in manifest but missing on disk: {0}")]
    MissingFile(String),
    #[error("file present on disk but not listed in manifest: {0}")]
    OrphanFile(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone)]
pub struct IntegrityReport {
    pub recording_id: String,
    pub hash_mismatches: Vec<String>,
    pub missing_files: Vec<String>,
    pub orphan_files: Vec<String>,
    pub ok: bool,
}

pub struct IntegrityChecker;

impl IntegrityChecker {
    /// Parse and structurally validate `manifest.yaml`: required fields
    /// present, schema major version known, event/chunk counts non-negative
    /// (guaranteed by the unsigned types), hash algorithm recognized. When
    /// `require_manifest_hash` is set (production/audit retention classes by
    /// default, see `EngineConfig::manifest_hash_required`), a manifest with
    /// no `manifest_hash` is rejected.
    pub fn verify_manifest_integrity(
        manifest_path: &Path,
        require_manifest_hash: bool,
    ) -> Result<RecordingManifest, IntegrityError> {
        if !manifest_path.exists() {
            return Err(IntegrityError::ManifestMissing(manifest_path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(manifest_path)?;
        let manifest: RecordingManifest = serde_yaml::from_str(&raw)
            .map_err(|e| IntegrityError::ManifestValidation(e.to_string()))?;

        match manifest.schema_major_version() {
            Some(1) => {}
            Some(other) => {
                return Err(IntegrityError::ManifestValidation(format!(
                    "unsupported schema major version {}",
                    other
                )))
            }
            None => {
                return Err(IntegrityError::ManifestValidation(
                    "unparsable schema_version".to_string(),
                ))
            }
        }

        if manifest.recording_id.is_empty() {
            return Err(IntegrityError::ManifestValidation(
                "recording_id must not be empty".to_string(),
            ));
        }

        if require_manifest_hash && manifest.manifest_hash.is_none() {
            return Err(IntegrityError::ManifestValidation(
                "manifest_hash is required but missing".to_string(),
            ));
        }

        Ok(manifest)
    }

    /// Verify every file the manifest lists against its recorded hash, and
    /// flag both missing-on-disk and orphan-on-disk files. Orphan files do
    /// not fail the check (a recorder may legitimately leave scratch files
    /// behind), but are reported for visibility.
    pub fn verify_recording(dir: &Path, manifest: &RecordingManifest) -> Result<(), IntegrityError> {
        let report = Self::check(dir, manifest)?;
        if !report.hash_mismatches.is_empty() {
            let first = report.hash_mismatches[0].clone();
            return Err(IntegrityError::ManifestValidation(format!(
                "hash mismatch(es) detected, first: {}",
                first
            )));
        }
        if !report.missing_files.is_empty() {
            return Err(IntegrityError::MissingFile(report.missing_files[0].clone()));
        }
        Ok(())
    }

    /// Full diagnostic pass producing an [`IntegrityReport`] rather than an
    /// error, for use by `storage.rs`'s `verify_recording_integrity` listing.
    pub fn check(dir: &Path, manifest: &RecordingManifest) -> Result<IntegrityReport, IntegrityError> {
        let mut report = IntegrityReport {
            recording_id: manifest.recording_id.clone(),
            ..Default::default()
        };

        let mut on_disk = BTreeSet::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == ".lock" || name == "manifest.yaml" {
                continue;
            }
            on_disk.insert(name);
        }

        for (name, expected) in manifest.file_hashes.iter() {
            if !on_disk.contains(name) {
                report.missing_files.push(name.clone());
                continue;
            }
            on_disk.remove(name);

            if expected.algorithm == "unknown" {
                continue;
            }
            let bytes = std::fs::read(dir.join(name))?;
            let algorithm: HashAlgorithm = expected
                .algorithm
                .parse()
                .unwrap_or(manifest.hash_algorithm);
            let actual = hash_bytes(algorithm, &bytes);
            if actual != expected.hash {
                report.hash_mismatches.push(format!(
                    "{} (expected {}, got {})",
                    name, expected.hash, actual
                ));
            }
        }

        report.orphan_files = on_disk.into_iter().collect();
        report.ok = report.hash_mismatches.is_empty() && report.missing_files.is_empty();
        Ok(report)
    }
}

fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        HashAlgorithm::Blake2b => {
            use blake2::Digest;
            let mut hasher = blake2::Blake2b512::new();
            hasher.update(bytes);
            hex_encode(hasher.finalize().as_slice())
        }
        HashAlgorithm::Sha256 => {
            use sha2::Digest;
            let mut hasher = sha2::Sha256::new();
            hasher.update(bytes);
            hex_encode(hasher.finalize().as_slice())
        }
        HashAlgorithm::Sha3_256 => {
            use sha3::Digest;
            let mut hasher = sha3::Sha3_256::new();
            hasher.update(bytes);
            hex_encode(hasher.finalize().as_slice())
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
