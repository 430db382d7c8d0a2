// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_max_tool_rounds() -> usize {
    20
}

fn default_doom_loop_threshold() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

/// Top-level merged configuration.
///
/// Loaded by [`crate::load`] as the merge (in increasing precedence) of
/// built-in defaults, the global config file, the local project file, and
/// environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Provider / model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier forwarded to the provider, e.g. `"openai/gpt-4o"`.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    /// Defaults to `OPENROUTER_API_KEY` when unset.
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer `api_key_env` in config files to avoid
    /// committing secrets.
    pub api_key: Option<String>,
    /// Base URL override. Defaults to the OpenRouter-style endpoint, or
    /// `HEDDLE_BASE_URL` when set.
    pub base_url: Option<String>,
    /// Maximum output tokens requested in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: Option<f32>,
    /// Number of retries on HTTP 429, honoring `Retry-After` when present.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Base backoff delay in milliseconds for retries without a usable
    /// `Retry-After` header (`base · 2^attempt`).
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Free-form extra fields merged verbatim into every request body
    /// (the provider-specific escape hatch).
    #[serde(default)]
    pub driver_options: serde_json::Value,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "openrouter/auto".to_string(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            retries: default_retries(),
            retry_base_delay_ms: default_base_delay_ms(),
            driver_options: serde_json::Value::Null,
        }
    }
}

/// Agent-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum outer loop iterations before giving up (`maxIterations`).
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Number of identical consecutive tool-call fingerprints that indicate
    /// a doom loop.
    #[serde(default = "default_doom_loop_threshold")]
    pub doom_loop_threshold: usize,
    /// System prompt. When unset, the session-setup collaborator supplies a
    /// minimal default.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            doom_loop_threshold: default_doom_loop_threshold(),
            system_prompt: None,
        }
    }
}

fn default_auto_approve_patterns() -> Vec<String> {
    vec!["cat *".to_string(), "ls *".to_string(), "ls".to_string()]
}

/// Tool-execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of tools to register. Empty means "all built-ins".
    #[serde(default)]
    pub enabled: Vec<String>,
    /// Timeout applied to `run_terminal_command` invocations.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Shell-glob patterns (`*`/`?`) matched against `run_terminal_command`
    /// invocations that should run without approval.
    #[serde(default = "default_auto_approve_patterns")]
    pub auto_approve_patterns: Vec<String>,
    /// Shell-glob patterns matched against invocations that must never run.
    /// Checked before `auto_approve_patterns`.
    #[serde(default)]
    pub deny_patterns: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            timeout_secs: default_timeout_secs(),
            auto_approve_patterns: default_auto_approve_patterns(),
            deny_patterns: Vec::new(),
        }
    }
}
