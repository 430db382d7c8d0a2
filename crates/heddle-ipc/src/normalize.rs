// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Error normalization (§4.7.2): turns an arbitrary error message into the
//! `{error, code, provider?, details?}` shape surfaced to the controller.
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct NormalizedError {
    pub error: String,
    pub code: String,
    pub provider: Option<String>,
    pub details: Option<Value>,
}

fn provider_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+?)\s+API error\s+\((\d+)\):\s*([\s\S]*)$").unwrap())
}

fn label_for_code(code: &str) -> &'static str {
    match code {
        "provider_error" => "Provider error",
        "tool_error" => "Tool error",
        "protocol_error" => "Protocol error",
        "loop_detected" => "Doom loop detected",
        "timeout" => "Timeout",
        _ => "Error",
    }
}

/// Normalize an exception message propagating out of the agent loop.
pub fn normalize(raw: &str) -> NormalizedError {
    if let Some(caps) = provider_error_pattern().captures(raw) {
        let provider = caps[1].to_lowercase();
        let raw_details = caps[3].to_string();
        let code = "provider_error".to_string();

        let parsed: Option<Value> = serde_json::from_str(&raw_details).ok();

        let message_from_parsed = parsed.as_ref().and_then(|v| {
            let err = v.get("error")?;
            if let Some(m) = err.get("message").and_then(Value::as_str) {
                Some(m.to_string())
            } else {
                err.as_str().map(str::to_string)
            }
        });

        let message = message_from_parsed
            .or_else(|| {
                if parsed.is_none() && !raw_details.trim().is_empty() {
                    Some(raw_details.trim().to_string())
                } else {
                    None
                }
            })
            .unwrap_or_else(|| label_for_code(&code).to_string());

        let details = parsed.or_else(|| (!raw_details.is_empty()).then(|| Value::String(raw_details.clone())));

        NormalizedError { error: message, code, provider: Some(provider), details }
    } else if raw.contains("API error") {
        let code = "provider_error".to_string();
        NormalizedError {
            error: label_for_code(&code).to_string(),
            code,
            provider: None,
            details: Some(Value::String(raw.to_string())),
        }
    } else {
        NormalizedError { error: raw.to_string(), code: "unknown".to_string(), provider: None, details: None }
    }
}
