// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! End-to-end coverage of the seed scenarios (S1-S6): record through the
//! `Recorder`, then verify replay behavior through the `Player`.

use replay_kernel::{HashAlgorithm, RedactionLevel};
use replay_node::config::ReplayMode;
use replay_node::player::Player;
use replay_node::recorder::Recorder;
use serde_json::json;
use tempfile::tempdir;

fn start(dir: &std::path::Path) -> Recorder {
    Recorder::start_recording(
        dir,
        "test-adapter",
        "0.1",
        RedactionLevel::None,
        HashAlgorithm::Blake3,
        false,
        100,
        64,
    )
    .unwrap()
}

#[test]
fn s1_record_then_replay_a_deterministic_mock() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());

    for (prompt, reply) in [("p1", "r1"), ("p2", "r2"), ("p1", "r3")] {
        recorder
            .record_event(
                "llm_call",
                "test-adapter",
                "agent-1",
                "gpt-4",
                json!({"prompt": prompt}),
                json!({"text": reply}),
            )
            .unwrap();
    }
    let manifest = recorder.stop_recording().unwrap();
    let recording_dir = dir.path().join(&manifest.recording_id);

    let mut player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
    let mut outputs = Vec::new();
    for (prompt, call_index) in [("p1", 0u64), ("p2", 1u64), ("p1", 2u64)] {
        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": prompt}),
            call_index,
        );
        assert!(matched, "expected a match for prompt {}", prompt);
        outputs.push(output.unwrap()["text"].as_str().unwrap().to_string());
    }

    assert_eq!(outputs, vec!["r1", "r2", "r3"]);
    assert_eq!(player.stats().mismatch_count, 0);
}

#[test]
fn s2_fingerprint_insensitive_to_key_order() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());
    recorder
        .record_event(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            json!({"temperature": 0.7, "prompt": "hi"}),
            json!({"text": "ok"}),
        )
        .unwrap();
    let manifest = recorder.stop_recording().unwrap();
    let recording_dir = dir.path().join(&manifest.recording_id);

    let mut player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
    let (matched, _) = player.get_recorded_output(
        "llm_call",
        "test-adapter",
        "agent-1",
        "gpt-4",
        &json!({"prompt": "hi", "temperature": 0.7}),
        0,
    );
    assert!(matched);
}

#[test]
fn s3_whitespace_normalization() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());
    recorder
        .record_event(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            json!("hello    world\r\n\r\nhow?"),
            json!({"text": "ok"}),
        )
        .unwrap();
    let manifest = recorder.stop_recording().unwrap();
    let recording_dir = dir.path().join(&manifest.recording_id);

    let mut player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
    let (matched, _) = player.get_recorded_output(
        "llm_call",
        "test-adapter",
        "agent-1",
        "gpt-4",
        &json!("hello world\n\nhow?"),
        0,
    );
    assert!(matched);
}

#[test]
fn s4_fingerprint_mismatch_strict_vs_hybrid() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());
    recorder
        .record_event(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            json!({"prompt": "hi", "temperature": 0.7}),
            json!({"text": "ok"}),
        )
        .unwrap();
    let manifest = recorder.stop_recording().unwrap();
    let recording_dir = dir.path().join(&manifest.recording_id);

    let mut strict = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
    let (matched, output) = strict.get_recorded_output(
        "llm_call",
        "test-adapter",
        "agent-1",
        "gpt-4",
        &json!({"prompt": "hi", "temperature": 0.8}),
        0,
    );
    assert!(!matched);
    assert!(output.is_none());

    let mut hybrid = Player::load(&recording_dir, ReplayMode::Hybrid, true).unwrap();
    let (matched, output) = hybrid.get_recorded_output(
        "llm_call",
        "test-adapter",
        "agent-1",
        "gpt-4",
        &json!({"prompt": "hi", "temperature": 0.8}),
        0,
    );
    assert!(matched);
    assert!(output.is_some());
}

#[test]
fn s5_streaming_round_trip() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());

    recorder.start_stream("s1");
    for chunk in ["Once", " upon", " a", " time"] {
        recorder.record_chunk("s1", chunk, None, false).unwrap();
    }
    recorder.record_chunk("s1", "", None, true).unwrap();
    recorder.finish_stream("s1").unwrap();
    let manifest = recorder.stop_recording().unwrap();
    let recording_dir = dir.path().join(&manifest.recording_id);

    let player = Player::load(&recording_dir, ReplayMode::Strict, true).unwrap();
    let replay = player.replay_stream("s1", false).unwrap();

    let mut contents = Vec::new();
    replay.replay_sync(|t| contents.push(t.content.clone()));
    assert_eq!(contents, vec!["Once", " upon", " a", " time", ""]);
    assert_eq!(replay.full_content(), "Once upon a time");
}

#[test]
fn s6_corruption_recovery_recovers_well_formed_prior_lines() {
    let dir = tempdir().unwrap();
    let recorder = start(dir.path());
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

    // Exercise the helper directly: the truncated final line is dropped, the
    // well-formed prior ones survive.
    let recovered_path = replay_node::player::recover_events_file(&events_path, false).unwrap();
    let recovered = std::fs::read_to_string(&recovered_path).unwrap();
    let recovered_lines: Vec<&str> = recovered.lines().collect();
    assert_eq!(recovered_lines.len(), 2, "the truncated final line must be dropped");
    for line in &recovered_lines {
        assert!(serde_json::from_str::<serde_json::Value>(line).is_ok());
    }
    std::fs::remove_file(&recovered_path).unwrap();

    // The actual scenario: Player::load hits the integrity failure itself,
    // repairs in place through the failure-mode handler, and still answers
    // replay lookups for the events that survived the truncation.
    let mut player = Player::load(&recording_dir, ReplayMode::Strict, false)
        .expect("Player::load should repair the corruption and succeed");
    for (i, expected) in [(0, "r0"), (1, "r1")] {
        let (matched, output) = player.get_recorded_output(
            "llm_call",
            "test-adapter",
            "agent-1",
            "gpt-4",
            &json!({"prompt": format!("p{}", i)}),
            i as u64,
        );
        assert!(matched, "call {} should still replay after repair", i);
        assert_eq!(output.unwrap()["text"], expected);
    }
}
