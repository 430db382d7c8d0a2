// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use heddle_model::{Message, Usage};

/// Events yielded by one run of the agent loop.
///
/// A lazy, finite, single-consumer sequence; suspension occurs only at
/// event boundaries (`heddle-ipc`'s event pump relies on this to observe
/// cancellation between events, never mid-event).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A textual fragment of the assistant's reply (streaming variant only).
    ContentDelta(String),
    /// The fully assembled assistant message for this iteration, appended to
    /// the conversation just before this event is yielded.
    AssistantMessage(Message),
    /// A tool call is about to execute.
    ToolStart { name: String, call_id: String, args: serde_json::Value },
    /// A tool call finished; `result` is its string output.
    ToolEnd { name: String, call_id: String, result: String, is_error: bool },
    /// Token usage reported by the provider for this iteration.
    Usage(Usage),
    /// The doom-loop detector fired: the last `count` tool-call fingerprints
    /// were all equal. Terminal.
    LoopDetected { count: usize },
    /// A recoverable, loop-terminating condition (e.g. "no choice in
    /// response", "max iterations reached"). Terminal.
    Error(String),
}
