// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The headless worker loop: reads one JSON request per stdin line, runs the
//! agent loop for `send`, writes one JSON response per stdout line.
//!
//! Single-threaded and cooperative — at most one `send` is ever in flight,
//! and everything else (`status`, `cancel`) is either answered immediately
//! or queued until the active `send` finishes.
use std::collections::VecDeque;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use heddle_core::{AgentEvent, Session};
use heddle_model::Message;

use crate::codec;
use crate::normalize::{self, NormalizedError};
use crate::protocol::{InitConfig, IpcRequest, IpcResponse, ToolCallMade, UsageInfo, WorkerEvent};
use crate::version;

enum LineEvent {
    Line(String),
    Eof,
}

struct WorkerState {
    session: Option<Session>,
    active_id: Option<String>,
    cancel_target_id: Option<String>,
    queue: VecDeque<IpcRequest>,
    stdin_closed: bool,
}

/// Drive the worker loop to completion and return the process exit code.
pub async fn run(
    input: impl AsyncBufRead + Unpin + Send + 'static,
    mut output: impl AsyncWrite + Unpin,
) -> i32 {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_lines(input, line_tx));

    let mut state = WorkerState {
        session: None,
        active_id: None,
        cancel_target_id: None,
        queue: VecDeque::new(),
        stdin_closed: false,
    };

    loop {
        if state.queue.is_empty() && !state.stdin_closed {
            match line_rx.recv().await {
                None | Some(LineEvent::Eof) => state.stdin_closed = true,
                Some(LineEvent::Line(line)) => enqueue_line(&mut state, &line, &mut output).await,
            }
        }

        while let Some(req) = state.queue.pop_front() {
            if let Some(code) = dispatch(&mut state, req, &mut line_rx, &mut output).await {
                return code;
            }
        }

        if state.stdin_closed && state.queue.is_empty() {
            break;
        }
    }

    0
}

async fn read_lines(input: impl AsyncBufRead + Unpin, tx: mpsc::UnboundedSender<LineEvent>) {
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(LineEvent::Line(line)).is_err() {
                    return;
                }
            }
            Ok(None) | Err(_) => {
                let _ = tx.send(LineEvent::Eof);
                return;
            }
        }
    }
}

async fn enqueue_line(state: &mut WorkerState, line: &str, output: &mut (impl AsyncWrite + Unpin)) {
    match codec::decode_request(line) {
        Ok(req) => state.queue.push_back(req),
        Err(err) => {
            let id = err.id.unwrap_or_else(|| "unknown".to_string());
            write_response(output, &IpcResponse::error_result(id, err.message)).await;
        }
    }
}

async fn dispatch(
    state: &mut WorkerState,
    req: IpcRequest,
    line_rx: &mut mpsc::UnboundedReceiver<LineEvent>,
    output: &mut (impl AsyncWrite + Unpin),
) -> Option<i32> {
    match req {
        IpcRequest::Init { id, protocol_version, config } => {
            handle_init(state, id, protocol_version, config, output).await
        }
        IpcRequest::Send { id, message } => {
            handle_send(state, id, message, line_rx, output).await;
            None
        }
        IpcRequest::Status { id } => {
            handle_status(state, id, output).await;
            None
        }
        IpcRequest::Shutdown { id } => {
            write_response(output, &IpcResponse::ShutdownOk { id }).await;
            Some(0)
        }
        IpcRequest::Cancel { id: _, target_id } => {
            handle_cancel(state, target_id);
            None
        }
    }
}

async fn handle_init(
    state: &mut WorkerState,
    id: String,
    protocol_version: Option<String>,
    config: InitConfig,
    output: &mut (impl AsyncWrite + Unpin),
) -> Option<i32> {
    let own = version::own_version();

    if let Some(peer) = &protocol_version {
        match version::check(&own, peer) {
            Ok(version::Compatibility::Incompatible) => {
                write_response(output, &IpcResponse::error_result(id, "protocol_version_mismatch")).await;
                return Some(1);
            }
            Ok(version::Compatibility::CompatibleWithWarning) => {
                debug!(own = %own, peer = %peer, "protocol_version minor differs, continuing");
            }
            Ok(_) => {}
            Err(e) => {
                write_response(output, &IpcResponse::error_result(id, format!("malformed protocol_version: {e}")))
                    .await;
                return None;
            }
        }
    }

    let options = heddle_bootstrap::SessionOptions {
        model: config.model,
        system_prompt: config.system_prompt,
        tools: (!config.tools.is_empty()).then_some(config.tools),
        cwd: None,
        max_iterations: config.max_iterations,
    };

    match heddle_bootstrap::create_session(options) {
        Ok(session) => {
            let session_id = session.id.clone();
            state.session = Some(session);
            write_response(
                output,
                &IpcResponse::InitOk { id, session_id, protocol_version: own, error: None },
            )
            .await;
        }
        Err(e) => write_response(output, &IpcResponse::error_result(id, e.to_string())).await,
    }
    None
}

async fn handle_status(state: &WorkerState, id: String, output: &mut (impl AsyncWrite + Unpin)) {
    match &state.session {
        None => {
            write_response(output, &IpcResponse::error_result(id, "Not initialized. Send 'init' first.")).await
        }
        Some(session) => {
            write_response(
                output,
                &IpcResponse::StatusOk {
                    id,
                    model: session.model.clone(),
                    messages_count: session.conversation.len(),
                    session_id: session.id.clone(),
                    active: state.active_id.is_some(),
                },
            )
            .await;
        }
    }
}

fn handle_cancel(state: &mut WorkerState, target_id: String) {
    if state.active_id.as_deref() == Some(target_id.as_str()) {
        state.cancel_target_id = Some(target_id);
    }
    // A cancel whose target never becomes active is simply dropped — there
    // is no response type for `cancel`.
}

/// Drain any requests that arrived on stdin since the last check, answering
/// malformed lines immediately and routing a matching `cancel` back as a
/// cancellation signal. Anything else is queued for after the active `send`.
async fn check_cancel(
    cancel_target_id: &mut Option<String>,
    queue: &mut VecDeque<IpcRequest>,
    stdin_closed: &mut bool,
    line_rx: &mut mpsc::UnboundedReceiver<LineEvent>,
    active_id: &str,
    output: &mut (impl AsyncWrite + Unpin),
) -> bool {
    if cancel_target_id.as_deref() == Some(active_id) {
        return true;
    }

    while let Ok(event) = line_rx.try_recv() {
        match event {
            LineEvent::Eof => *stdin_closed = true,
            LineEvent::Line(line) => match codec::decode_request(&line) {
                Ok(IpcRequest::Cancel { target_id, .. }) if target_id == active_id => return true,
                Ok(req) => queue.push_back(req),
                Err(err) => {
                    let id = err.id.unwrap_or_else(|| "unknown".to_string());
                    write_response(output, &IpcResponse::error_result(id, err.message)).await;
                }
            },
        }
    }

    false
}

#[allow(clippy::too_many_arguments)]
async fn handle_send(
    state: &mut WorkerState,
    id: String,
    message: String,
    line_rx: &mut mpsc::UnboundedReceiver<LineEvent>,
    output: &mut (impl AsyncWrite + Unpin),
) {
    if state.session.is_none() {
        write_response(output, &IpcResponse::error_result(id, "Not initialized. Send 'init' first.")).await;
        return;
    }
    if state.active_id.is_some() {
        write_response(output, &IpcResponse::error_result(id, "A send is already in progress.")).await;
        return;
    }

    state.active_id = Some(id.clone());
    state.cancel_target_id = None;

    // Taken out of `state` for the duration of the run so `check_cancel`
    // below can still take `&mut state.{queue,cancel_target_id,stdin_closed}`
    // while the agent loop holds a live borrow of the session's conversation.
    let mut session = state.session.take().expect("checked above");

    let user_message = Message::user(message);
    session.conversation.push(user_message.clone());
    if let Err(e) = heddle_core::append_message(&session.session_file, &user_message) {
        write_response(output, &IpcResponse::error_result(id, format!("journal write failed: {e}"))).await;
        state.session = Some(session);
        state.active_id = None;
        return;
    }
    let baseline = session.conversation.len();

    let provider = session.provider.clone();
    let options = session.agent_options.clone();
    let (tx, mut rx) = mpsc::channel(64);

    let mut iterations = 0usize;
    let mut tool_calls_made: Vec<ToolCallMade> = Vec::new();
    let mut last_usage: Option<UsageInfo> = None;
    let mut response_candidate: Option<String> = None;
    let mut pending_error: Option<NormalizedError> = None;
    let mut cancelled = false;
    let agent_result;

    {
        let agent_task =
            heddle_core::run_streaming(provider.as_ref(), &session.tool_registry, &mut session.conversation, &options, tx);
        tokio::pin!(agent_task);

        let mut done = false;
        let mut result = Ok(());

        'pump: loop {
            if check_cancel(&mut state.cancel_target_id, &mut state.queue, &mut state.stdin_closed, line_rx, &id, output).await
            {
                cancelled = true;
                break 'pump;
            }

            tokio::select! {
                biased;
                res = &mut agent_task, if !done => {
                    result = res;
                    done = true;
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            handle_agent_event(
                                event,
                                output,
                                &mut iterations,
                                &mut tool_calls_made,
                                &mut last_usage,
                                &mut response_candidate,
                                &mut pending_error,
                            )
                            .await;
                        }
                        None => break 'pump,
                    }
                }
            }
        }

        agent_result = result;
    }

    for m in session.conversation[baseline.min(session.conversation.len())..].to_vec() {
        let _ = heddle_core::append_message(&session.session_file, &m);
    }

    state.session = Some(session);
    state.active_id = None;

    if cancelled {
        write_response(
            output,
            &IpcResponse::Result {
                id,
                status: "error".to_string(),
                response: None,
                tool_calls_made,
                usage: last_usage,
                iterations,
                error: Some("cancelled".to_string()),
            },
        )
        .await;
        return;
    }

    if let Err(e) = agent_result {
        let normalized = normalize::normalize(&e.to_string());
        write_response(
            output,
            &IpcResponse::Event {
                event: WorkerEvent::Error {
                    error: normalized.error.clone(),
                    code: Some(normalized.code.clone()),
                    provider: normalized.provider.clone(),
                    details: normalized.details.clone(),
                },
            },
        )
        .await;
        pending_error = Some(normalized);
    }

    let (status, error) = match pending_error {
        Some(err) => ("error".to_string(), Some(err.error)),
        None => ("ok".to_string(), None),
    };

    write_response(
        output,
        &IpcResponse::Result { id, status, response: response_candidate, tool_calls_made, usage: last_usage, iterations, error },
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn handle_agent_event(
    event: AgentEvent,
    output: &mut (impl AsyncWrite + Unpin),
    iterations: &mut usize,
    tool_calls_made: &mut Vec<ToolCallMade>,
    last_usage: &mut Option<UsageInfo>,
    response_candidate: &mut Option<String>,
    pending_error: &mut Option<NormalizedError>,
) {
    match event {
        AgentEvent::ContentDelta(text) => {
            write_response(output, &IpcResponse::Event { event: WorkerEvent::ContentDelta { text } }).await;
        }
        AgentEvent::AssistantMessage(message) => {
            *iterations += 1;
            *response_candidate = message.text().map(str::to_string);
        }
        AgentEvent::ToolStart { name, args, .. } => {
            tool_calls_made.push(ToolCallMade { name: name.clone(), args: args.clone() });
            write_response(output, &IpcResponse::Event { event: WorkerEvent::ToolStart { name, args } }).await;
        }
        AgentEvent::ToolEnd { name, result, .. } => {
            let result_preview: String = result.chars().take(500).collect();
            write_response(output, &IpcResponse::Event { event: WorkerEvent::ToolEnd { name, result_preview } }).await;
        }
        AgentEvent::Usage(usage) => {
            let info = UsageInfo {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            };
            *last_usage = Some(info.clone());
            write_response(
                output,
                &IpcResponse::Event {
                    event: WorkerEvent::Usage {
                        prompt_tokens: info.prompt_tokens,
                        completion_tokens: info.completion_tokens,
                        total_tokens: info.total_tokens,
                    },
                },
            )
            .await;
        }
        AgentEvent::LoopDetected { count } => {
            let error = format!("Doom loop detected: {count} iterations");
            *pending_error =
                Some(NormalizedError { error: error.clone(), code: "loop_detected".to_string(), provider: None, details: None });
            write_response(
                output,
                &IpcResponse::Event {
                    event: WorkerEvent::Error { error, code: Some("loop_detected".to_string()), provider: None, details: None },
                },
            )
            .await;
        }
        AgentEvent::Error(message) => {
            *pending_error =
                Some(NormalizedError { error: message.clone(), code: "agent_error".to_string(), provider: None, details: None });
            write_response(
                output,
                &IpcResponse::Event {
                    event: WorkerEvent::Error { error: message, code: Some("agent_error".to_string()), provider: None, details: None },
                },
            )
            .await;
        }
    }
}

async fn write_response(output: &mut (impl AsyncWrite + Unpin), response: &IpcResponse) {
    let line = codec::encode_response(response);
    let _ = output.write_all(line.as_bytes()).await;
    let _ = output.write_all(b"\n").await;
    let _ = output.flush().await;
}
