// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-call request-parameter overrides, validated field by field.
//!
//! Unknown fields are dropped with a debug note; known fields are filtered,
//! not coerced — a value that doesn't satisfy the field's constraint is
//! dropped rather than clamped.

use serde_json::{Map, Value};
use tracing::debug;

const REASONING_EFFORTS: &[&str] = &["xhigh", "high", "medium", "low", "minimal", "none"];
const REASONING_SUMMARIES: &[&str] = &["auto", "concise", "detailed"];
const ROUTES: &[&str] = &["fallback", "sort"];

/// Validate a raw JSON object of per-call overrides, dropping anything that
/// doesn't satisfy its field's constraint.
pub fn validate_overrides(raw: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(obj) = raw.as_object() else {
        return out;
    };

    for (key, value) in obj {
        match key.as_str() {
            "temperature" => {
                if let Some(n) = value.as_f64() {
                    if (0.0..=2.0).contains(&n) {
                        out.insert(key.clone(), value.clone());
                        continue;
                    }
                }
                debug!(field = %key, "dropped unknown/invalid override field");
            }
            "max_tokens" => {
                if let Some(n) = value.as_i64() {
                    if n > 0 {
                        out.insert(key.clone(), value.clone());
                        continue;
                    }
                }
                debug!(field = %key, "dropped unknown/invalid override field");
            }
            "top_p" | "seed" | "frequency_penalty" | "presence_penalty" => {
                if value.is_number() {
                    out.insert(key.clone(), value.clone());
                    continue;
                }
                debug!(field = %key, "dropped unknown/invalid override field");
            }
            "stop" => {
                let ok = value.is_string()
                    || value.as_array().map(|a| a.iter().all(|v| v.is_string())).unwrap_or(false);
                if ok {
                    out.insert(key.clone(), value.clone());
                } else {
                    debug!(field = %key, "dropped unknown/invalid override field");
                }
            }
            "route" => {
                if value.as_str().map(|s| ROUTES.contains(&s)).unwrap_or(false) {
                    out.insert(key.clone(), value.clone());
                } else {
                    debug!(field = %key, "dropped unknown/invalid override field");
                }
            }
            "models" => {
                if value.as_array().map(|a| a.iter().all(|v| v.is_string())).unwrap_or(false) {
                    out.insert(key.clone(), value.clone());
                } else {
                    debug!(field = %key, "dropped unknown/invalid override field");
                }
            }
            "reasoning" => {
                if let Some(reasoning) = validate_reasoning(value) {
                    out.insert(key.clone(), reasoning);
                } else {
                    debug!(field = %key, "dropped unknown/invalid override field");
                }
            }
            "session_id" => {
                if value.as_str().map(|s| s.chars().count() <= 128).unwrap_or(false) {
                    out.insert(key.clone(), value.clone());
                } else {
                    debug!(field = %key, "dropped unknown/invalid override field");
                }
            }
            "model" | "response_format" | "tool_choice" | "plugins" | "provider" | "debug" => {
                out.insert(key.clone(), value.clone());
            }
            _ => {
                debug!(field = %key, "dropped unknown override field");
            }
        }
    }

    out
}

/// Validate the `reasoning` sub-object. Returns `None` if no sub-field
/// survives validation (the field is then omitted entirely).
fn validate_reasoning(value: &Value) -> Option<Value> {
    let obj = value.as_object()?;
    let mut out = Map::new();

    if let Some(effort) = obj.get("effort") {
        if effort.as_str().map(|s| REASONING_EFFORTS.contains(&s)).unwrap_or(false) {
            out.insert("effort".into(), effort.clone());
        }
    }
    if let Some(max_tokens) = obj.get("max_tokens") {
        if max_tokens.as_i64().map(|n| n > 0).unwrap_or(false) {
            out.insert("max_tokens".into(), max_tokens.clone());
        }
    }
    if let Some(excluded) = obj.get("excluded") {
        if excluded.is_boolean() {
            out.insert("excluded".into(), excluded.clone());
        }
    }
    if let Some(summary) = obj.get("summary") {
        if summary.as_str().map(|s| REASONING_SUMMARIES.contains(&s)).unwrap_or(false) {
            out.insert("summary".into(), summary.clone());
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(Value::Object(out))
    }
}
