// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end scenarios driving the headless IPC adapter over its real
/// stdin/stdout protocol, exercising protocol-version compatibility and the
/// decode-error recovery path without touching the network.
use std::io::Cursor;

use serde_json::Value;

async fn run_lines(input: &str) -> (i32, Vec<Value>) {
    let reader = tokio::io::BufReader::new(Cursor::new(input.as_bytes().to_vec()));
    let mut out: Vec<u8> = Vec::new();
    let code = heddle_ipc::run(reader, &mut out).await;
    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (code, lines)
}

/// Scenario F: `init` carrying a protocol_version with a different major
/// component is rejected before any session is created, and the process
/// exits non-zero after exactly one response line.
#[tokio::test]
async fn scenario_f_protocol_version_major_mismatch() {
    let (code, responses) =
        run_lines(r#"{"type":"init","id":"1","protocol_version":"1.1.0"}"#).await;

    assert_eq!(code, 1);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["type"], "result");
    assert_eq!(responses[0]["status"], "error");
    assert_eq!(responses[0]["error"], "protocol_version_mismatch");
    assert_eq!(responses[0]["tool_calls_made"], serde_json::json!([]));
    assert_eq!(responses[0]["iterations"], 0);
}

/// A malformed line does not kill the worker: it gets an error result and
/// reading continues, so a well-formed request right after it still gets a
/// normal answer.
#[tokio::test]
async fn malformed_request_recovers_and_keeps_reading() {
    let (code, responses) =
        run_lines("{not valid json\n{\"type\":\"status\",\"id\":\"2\"}\n").await;

    assert_eq!(code, 0);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["status"], "error");
    assert_eq!(responses[0]["error"], "Invalid JSON");
    assert_eq!(responses[1]["type"], "result");
    assert_eq!(responses[1]["error"], "Not initialized. Send 'init' first.");
}

/// `send` before `init` is a recoverable operational error, not a crash —
/// the worker keeps draining the remaining input afterward.
#[tokio::test]
async fn send_before_init_is_recoverable() {
    let (code, responses) = run_lines(
        "{\"type\":\"send\",\"id\":\"1\",\"message\":\"hi\"}\n{\"type\":\"status\",\"id\":\"2\"}\n",
    )
    .await;

    assert_eq!(code, 0);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], "1");
    assert!(responses[0]["error"].as_str().unwrap().contains("Not initialized"));
    assert_eq!(responses[1]["id"], "2");
}

/// `shutdown` ends the worker immediately with exit code 0, regardless of
/// what is still queued behind it on stdin.
#[tokio::test]
async fn shutdown_ends_the_worker() {
    let (code, responses) =
        run_lines("{\"type\":\"shutdown\",\"id\":\"1\"}\n{\"type\":\"status\",\"id\":\"2\"}\n").await;

    assert_eq!(code, 0);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["type"], "shutdown_ok");
}

/// A `cancel` whose target never becomes active produces no response and
/// does not otherwise disturb the stream.
#[tokio::test]
async fn cancel_of_unknown_target_is_silently_dropped() {
    let (code, responses) = run_lines(
        "{\"type\":\"cancel\",\"id\":\"1\",\"target_id\":\"never-active\"}\n{\"type\":\"status\",\"id\":\"2\"}\n",
    )
    .await;

    assert_eq!(code, 0);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], "2");
}
