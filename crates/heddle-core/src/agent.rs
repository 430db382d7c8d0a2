// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent loop: the send/tool/respond state machine described in the
//! component design. Two entry points — [`run_streaming`] and
//! [`run_non_streaming`] — share one iteration body and differ only in how
//! they obtain the assembled assistant message for a turn (the streaming
//! variant additionally emits [`AgentEvent::ContentDelta`] as text arrives).
use std::collections::{BTreeMap, VecDeque};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use heddle_model::{FunctionCall, Message, ModelProvider, ToolCallKind, ToolDefinition, Usage};
use heddle_tools::{ToolCall as ToolInvocation, ToolRegistry};

use crate::events::AgentEvent;

/// Tunables for one run of the agent loop.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Outer-loop iteration cap before giving up with a terminal `error`.
    pub max_iterations: usize,
    /// Number of identical consecutive tool-call fingerprints that signal a
    /// doom loop.
    pub doom_loop_threshold: usize,
    /// Per-call provider overrides (temperature, max_tokens, ...), forwarded
    /// verbatim to the provider client on every call this run makes.
    pub request_overrides: Option<Value>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self { max_iterations: 20, doom_loop_threshold: 3, request_overrides: None }
    }
}

/// Run the loop using the streaming provider call, emitting `ContentDelta`
/// events as text arrives. `conversation` is appended to in place.
pub async fn run_streaming(
    provider: &dyn ModelProvider,
    tools: &ToolRegistry,
    conversation: &mut Vec<Message>,
    options: &AgentOptions,
    tx: mpsc::Sender<AgentEvent>,
) -> anyhow::Result<()> {
    run_loop(provider, tools, conversation, options, tx, true).await
}

/// Run the loop using the non-streaming provider call. Same events as
/// [`run_streaming`] except no `ContentDelta` is ever emitted.
pub async fn run_non_streaming(
    provider: &dyn ModelProvider,
    tools: &ToolRegistry,
    conversation: &mut Vec<Message>,
    options: &AgentOptions,
    tx: mpsc::Sender<AgentEvent>,
) -> anyhow::Result<()> {
    run_loop(provider, tools, conversation, options, tx, false).await
}

async fn run_loop(
    provider: &dyn ModelProvider,
    tools: &ToolRegistry,
    conversation: &mut Vec<Message>,
    options: &AgentOptions,
    tx: mpsc::Sender<AgentEvent>,
    streaming: bool,
) -> anyhow::Result<()> {
    let tool_defs: Vec<ToolDefinition> = tools
        .schemas()
        .into_iter()
        .map(|s| ToolDefinition::new(s.name, s.description, s.parameters))
        .collect();

    let mut recent_fingerprints: VecDeque<String> = VecDeque::with_capacity(options.doom_loop_threshold);

    for _ in 0..options.max_iterations {
        let turn = if streaming {
            assemble_from_stream(provider, &tool_defs, conversation, options.request_overrides.as_ref(), &tx).await?
        } else {
            match call_once(provider, &tool_defs, conversation, options.request_overrides.as_ref()).await? {
                Some(turn) => turn,
                None => {
                    let _ = tx.send(AgentEvent::Error("No choice in response".to_string())).await;
                    return Ok(());
                }
            }
        };

        conversation.push(turn.message.clone());
        let _ = tx.send(AgentEvent::AssistantMessage(turn.message.clone())).await;
        if let Some(usage) = turn.usage {
            let _ = tx.send(AgentEvent::Usage(usage)).await;
        }

        let calls = turn.message.tool_calls().to_vec();
        if calls.is_empty() {
            return Ok(());
        }

        for call in &calls {
            let args = parse_args_or_empty(&call.function.arguments);
            let _ = tx
                .send(AgentEvent::ToolStart { name: call.function.name.clone(), call_id: call.id.clone(), args })
                .await;

            let (result, is_error) = execute_tool(tools, &call.id, &call.function.name, &call.function.arguments).await?;

            let _ = tx
                .send(AgentEvent::ToolEnd {
                    name: call.function.name.clone(),
                    call_id: call.id.clone(),
                    result: result.clone(),
                    is_error,
                })
                .await;

            conversation.push(Message::tool(call.id.clone(), result));
        }

        let fingerprint = iteration_fingerprint(&calls);
        if recent_fingerprints.len() == options.doom_loop_threshold {
            recent_fingerprints.pop_front();
        }
        recent_fingerprints.push_back(fingerprint);

        if recent_fingerprints.len() == options.doom_loop_threshold
            && recent_fingerprints.iter().all(|f| f == &recent_fingerprints[0])
        {
            let _ = tx.send(AgentEvent::LoopDetected { count: options.doom_loop_threshold }).await;
            return Ok(());
        }
    }

    let _ = tx
        .send(AgentEvent::Error(format!(
            "Max iterations ({}) reached — possible infinite loop",
            options.max_iterations
        )))
        .await;
    Ok(())
}

/// One fully-assembled assistant turn, plus whatever usage the provider
/// reported for it.
struct AssembledTurn {
    message: Message,
    usage: Option<Usage>,
}

async fn call_once(
    provider: &dyn ModelProvider,
    tool_defs: &[ToolDefinition],
    conversation: &[Message],
    overrides: Option<&Value>,
) -> anyhow::Result<Option<AssembledTurn>> {
    let response = provider.send(conversation, tool_defs, overrides).await?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Ok(None);
    };
    Ok(Some(AssembledTurn { message: choice.message, usage: response.usage }))
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

async fn assemble_from_stream(
    provider: &dyn ModelProvider,
    tool_defs: &[ToolDefinition],
    conversation: &[Message],
    overrides: Option<&Value>,
    tx: &mpsc::Sender<AgentEvent>,
) -> anyhow::Result<AssembledTurn> {
    let mut stream = provider.stream(conversation, tool_defs, overrides).await?;

    let mut content = String::new();
    let mut tool_calls: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
    let mut usage = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(u) = chunk.usage {
            usage = Some(u);
        }
        for choice in &chunk.choices {
            if let Some(delta_content) = &choice.delta.content {
                if !delta_content.is_empty() {
                    content.push_str(delta_content);
                    let _ = tx.send(AgentEvent::ContentDelta(delta_content.clone())).await;
                }
            }
            for fragment in &choice.delta.tool_calls {
                let entry = tool_calls.entry(fragment.index).or_default();
                if let Some(id) = &fragment.id {
                    if !id.is_empty() {
                        entry.id = id.clone();
                    }
                }
                if let Some(function) = &fragment.function {
                    if let Some(name) = &function.name {
                        entry.name.push_str(name);
                    }
                    if let Some(arguments) = &function.arguments {
                        entry.arguments.push_str(arguments);
                    }
                }
            }
        }
    }

    let text = if content.is_empty() { None } else { Some(content) };
    let message = if tool_calls.is_empty() {
        Message::Assistant { content: text, tool_calls: None }
    } else {
        let calls = tool_calls
            .into_iter()
            .map(|(_, partial)| heddle_model::ToolCall {
                id: partial.id,
                kind: ToolCallKind::Function,
                function: FunctionCall { name: partial.name, arguments: partial.arguments },
            })
            .collect();
        Message::Assistant { content: text, tool_calls: Some(calls) }
    };

    Ok(AssembledTurn { message, usage })
}

fn parse_args_or_empty(arguments: &str) -> Value {
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Execute one tool call, bridging the raw argument string into the tool
/// registry's JSON-value contract.
///
/// Unknown tool names are a hard failure that propagates out of the loop
/// (the registry itself rejects them, via the `?` at the call site).
/// Invalid-JSON arguments and tool-reported errors are both recovered as an
/// `"Error: ..."` string fed back to the model as the tool's result.
async fn execute_tool(
    tools: &ToolRegistry,
    call_id: &str,
    name: &str,
    arguments_json: &str,
) -> anyhow::Result<(String, bool)> {
    let args: Value = match serde_json::from_str(arguments_json) {
        Ok(v) => v,
        Err(_) => return Ok((format!("Error: Invalid JSON arguments: {arguments_json}"), true)),
    };

    let call = ToolInvocation { id: call_id.to_string(), name: name.to_string(), args };
    let output = tools.execute(&call).await?;
    if output.is_error {
        Ok((format!("Error: {}", output.content), true))
    } else {
        Ok((output.content, false))
    }
}

/// `"<name>:<normalizedArgs>"` per call, joined with `"|"` in call order.
/// `normalizedArgs` is the re-serialized JSON value when the arguments parse,
/// otherwise the raw argument string verbatim.
fn iteration_fingerprint(calls: &[heddle_model::ToolCall]) -> String {
    calls
        .iter()
        .map(|call| {
            let normalized = match serde_json::from_str::<Value>(&call.function.arguments) {
                Ok(v) => v.to_string(),
                Err(_) => call.function.arguments.clone(),
            };
            format!("{}:{normalized}", call.function.name)
        })
        .collect::<Vec<_>>()
        .join("|")
}
