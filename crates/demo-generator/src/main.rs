// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Generates a small recording and immediately replays it, to demonstrate
//! the record -> replay round trip end to end against a scratch directory.

use anyhow::{Context, Result};
use replay_kernel::{HashAlgorithm, RedactionLevel};
use replay_node::config::ReplayMode;
use replay_node::player::Player;
use replay_node::recorder::Recorder;
use serde_json::json;
use std::path::Path;

fn main() -> Result<()> {
    let out_dir = Path::new("demo_recordings");
    if out_dir.exists() {
        std::fs::remove_dir_all(out_dir).context("failed to clear previous demo output")?;
    }
    std::fs::create_dir_all(out_dir)?;

    println!("Recording a short agent session...");
    let recorder = Recorder::start_recording(
        out_dir,
        "demo-adapter",
        "0.1.0",
        RedactionLevel::Basic,
        HashAlgorithm::Blake3,
        true,
        100,
        256,
    )
    .context("failed to start recording")?;

    recorder.record_event(
        "llm_call",
        "demo-adapter",
        "agent-1",
        "gpt-4",
        json!({"prompt": "What is the capital of France?"}),
        json!({"text": "Paris."}),
    )?;

    recorder.start_stream("stream-1");
    for chunk in ["The", " answer", " is", " Paris."] {
        recorder.record_chunk("stream-1", chunk, None, false)?;
    }
    recorder.record_chunk("stream-1", "", None, true)?;
    recorder.finish_stream("stream-1")?;

    recorder.record_event(
        "tool_call",
        "demo-adapter",
        "agent-1",
        "shell",
        json!({"command": "echo hello"}),
        json!({"stdout": "hello\n", "exit_code": 0}),
    )?;

    let manifest = recorder.stop_recording().context("failed to finalize recording")?;
    println!(
        "Recorded {} events, {} chunks, into {:?}",
        manifest.event_count, manifest.total_chunks, out_dir
    );

    let recording_dir = out_dir.join(&manifest.recording_id);
    println!("Replaying from {:?}...", recording_dir);

    let mut player = Player::load(&recording_dir, ReplayMode::Strict, true)
        .context("failed to load recording for replay")?;

    let (matched, output) = player.get_recorded_output(
        "llm_call",
        "demo-adapter",
        "agent-1",
        "gpt-4",
        &json!({"prompt": "What is the capital of France?"}),
        0,
    );
    println!("llm_call replay matched={} output={:?}", matched, output);

    if let Some(replay) = player.replay_stream("stream-1", false) {
        let content = replay.full_content();
        println!("stream-1 replayed content: {:?}", content);
    }

    println!("Done. Replay stats: {:?}", player.stats());
    Ok(())
}
