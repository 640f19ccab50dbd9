// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Standalone integrity verifier: loads a recording directory and prints a
//! JSON integrity report without starting the service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use replay_node::integrity::IntegrityChecker;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a recording directory (containing manifest.yaml)
    recording_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let manifest_path = args.recording_dir.join("manifest.yaml");
    let manifest = IntegrityChecker::verify_manifest_integrity(&manifest_path, false)
        .context("manifest failed structural validation")?;

    let report = IntegrityChecker::check(&args.recording_dir, &manifest)
        .context("failed to walk recording directory")?;

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "recording_id": report.recording_id,
        "ok": report.ok,
        "hash_mismatches": report.hash_mismatches,
        "missing_files": report.missing_files,
        "orphan_files": report.orphan_files,
    }))?;
    println!("{}", json);

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
