// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The session-setup collaborator: turns a small set of options into a
//! ready-to-run [`Session`], consumed by both the headless IPC adapter and
//! any future REPL frontend.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use uuid::Uuid;

use heddle_core::{write_session_meta, AgentOptions, Session, SessionMeta};

use crate::context::compose_system_prompt;
use crate::registry::build_tool_registry;

/// Inputs to [`create_session`]. All fields are optional overrides layered
/// on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub tools: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    /// Overrides the configured `agent.max_tool_rounds` for this session.
    pub max_iterations: Option<usize>,
}

/// Build a fresh [`Session`]: resolve the working directory, load layered
/// configuration, construct a provider and tool registry, then generate a
/// session id/journal path and persist the header and system message.
pub fn create_session(options: SessionOptions) -> anyhow::Result<Session> {
    let cwd = resolve_cwd(options.cwd.as_deref())?;

    let mut config = heddle_config::load(None).context("loading configuration")?;
    if let Some(model) = &options.model {
        config.model.name = model.clone();
    }
    if let Some(prompt) = &options.system_prompt {
        config.agent.system_prompt = Some(prompt.clone());
    }

    require_credential(&config.model)?;

    let provider = heddle_model::from_config(&config.model).context("constructing provider")?;
    let tool_registry = build_tool_registry(&config.tools, options.tools.as_deref());

    let session_id = Uuid::new_v4().to_string();
    let session_file = session_file_path(&cwd, &session_id);

    let meta = SessionMeta::new(session_id.clone(), cwd.display().to_string(), config.model.name.clone());
    write_session_meta(&session_file, &meta)?;

    let mut session = Session::new(
        session_file.clone(),
        config.model.name.clone(),
        cwd.clone(),
        Arc::new(provider),
        tool_registry,
    );
    session.id = session_id;
    session.agent_options = AgentOptions {
        max_iterations: options.max_iterations.unwrap_or(config.agent.max_tool_rounds),
        doom_loop_threshold: config.agent.doom_loop_threshold,
        ..AgentOptions::default()
    };

    let system_prompt = compose_system_prompt(&cwd, config.agent.system_prompt.as_deref());
    let system_message = heddle_model::Message::system(system_prompt);
    heddle_core::append_message(&session_file, &system_message)?;
    session.conversation.push(system_message);

    Ok(session)
}

/// Validate and change into `cwd` if given; otherwise use the process's
/// current directory unmodified.
fn resolve_cwd(cwd: Option<&Path>) -> anyhow::Result<PathBuf> {
    match cwd {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("cwd does not exist or is not a directory: {}", dir.display());
            }
            std::env::set_current_dir(dir).with_context(|| format!("changing into {}", dir.display()))?;
            dir.canonicalize().context("resolving cwd")
        }
        None => std::env::current_dir().context("reading current directory"),
    }
}

/// Fails with a clear message when no credential can be resolved, rather
/// than silently sending requests with an empty API key — `from_config`'s
/// own resolution falls back to `""` if nothing is found.
fn require_credential(model: &heddle_config::ModelConfig) -> anyhow::Result<()> {
    if model.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        return Ok(());
    }
    let env_var = model.api_key_env.as_deref().unwrap_or("OPENROUTER_API_KEY");
    match std::env::var(env_var) {
        Ok(v) if !v.is_empty() => Ok(()),
        _ => bail!(
            "no API credential found: set `model.api_key` in config, or the {env_var} \
             environment variable"
        ),
    }
}

/// `<heddle_home>/projects/<dash-encoded-cwd>/sessions/<uuid>.jsonl`
fn session_file_path(cwd: &Path, session_id: &str) -> PathBuf {
    let encoded = dash_encode(cwd);
    heddle_config::heddle_home().join("projects").join(encoded).join("sessions").join(format!("{session_id}.jsonl"))
}

/// Encode a cwd as a single path segment, replacing path separators with
/// dashes, matching the session-journal layout.
fn dash_encode(cwd: &Path) -> String {
    cwd.display().to_string().replace(['/', '\\'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_encode_replaces_separators() {
        assert_eq!(dash_encode(Path::new("/home/user/project")), "-home-user-project");
    }

    #[test]
    fn resolve_cwd_rejects_missing_directory() {
        let err = resolve_cwd(Some(Path::new("/nonexistent/path/xyz"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn resolve_cwd_none_uses_current_dir() {
        let resolved = resolve_cwd(None).unwrap();
        assert_eq!(resolved, std::env::current_dir().unwrap());
    }

    #[test]
    fn require_credential_accepts_explicit_api_key() {
        let cfg = heddle_config::ModelConfig { api_key: Some("k".into()), ..heddle_config::ModelConfig::default() };
        assert!(require_credential(&cfg).is_ok());
    }

    #[test]
    fn require_credential_accepts_named_env_var() {
        std::env::set_var("HEDDLE_BOOTSTRAP_TEST_KEY", "present");
        let cfg = heddle_config::ModelConfig {
            api_key_env: Some("HEDDLE_BOOTSTRAP_TEST_KEY".into()),
            ..heddle_config::ModelConfig::default()
        };
        assert!(require_credential(&cfg).is_ok());
        std::env::remove_var("HEDDLE_BOOTSTRAP_TEST_KEY");
    }

    #[test]
    fn require_credential_fails_without_any_source() {
        std::env::remove_var("OPENROUTER_API_KEY");
        let cfg = heddle_config::ModelConfig::default();
        let err = require_credential(&cfg).unwrap_err();
        assert!(err.to_string().contains("no API credential"));
    }

    #[test]
    fn create_session_fails_without_credential() {
        std::env::remove_var("OPENROUTER_API_KEY");
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HEDDLE_HOME", tmp.path());
        let err = create_session(SessionOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no API credential"));
        std::env::remove_var("HEDDLE_HOME");
    }

    #[test]
    fn create_session_succeeds_and_writes_journal() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HEDDLE_HOME", tmp.path());
        std::env::set_var("OPENROUTER_API_KEY", "test-key-for-bootstrap");

        let session = create_session(SessionOptions::default()).unwrap();
        assert!(session.session_file.exists());
        assert_eq!(session.conversation.len(), 1);
        assert!(heddle_core::load_session_meta(&session.session_file).unwrap().is_some());

        std::env::remove_var("HEDDLE_HOME");
        std::env::remove_var("OPENROUTER_API_KEY");
    }

    #[test]
    fn create_session_default_agent_options_come_from_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HEDDLE_HOME", tmp.path());
        std::env::set_var("OPENROUTER_API_KEY", "test-key-for-bootstrap");

        let session = create_session(SessionOptions::default()).unwrap();
        let defaults = heddle_config::AgentConfig::default();
        assert_eq!(session.agent_options.max_iterations, defaults.max_tool_rounds);
        assert_eq!(session.agent_options.doom_loop_threshold, defaults.doom_loop_threshold);

        std::env::remove_var("HEDDLE_HOME");
        std::env::remove_var("OPENROUTER_API_KEY");
    }

    #[test]
    fn create_session_max_iterations_override_wins_over_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HEDDLE_HOME", tmp.path());
        std::env::set_var("OPENROUTER_API_KEY", "test-key-for-bootstrap");

        let options = SessionOptions { max_iterations: Some(7), ..SessionOptions::default() };
        let session = create_session(options).unwrap();
        assert_eq!(session.agent_options.max_iterations, 7);

        std::env::remove_var("HEDDLE_HOME");
        std::env::remove_var("OPENROUTER_API_KEY");
    }

    #[test]
    fn create_session_applies_tool_filter() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HEDDLE_HOME", tmp.path());
        std::env::set_var("OPENROUTER_API_KEY", "test-key-for-bootstrap");

        let options = SessionOptions { tools: Some(vec!["grep".to_string()]), ..SessionOptions::default() };
        let session = create_session(options).unwrap();
        assert_eq!(session.tool_registry.names(), vec!["grep".to_string()]);

        std::env::remove_var("HEDDLE_HOME");
        std::env::remove_var("OPENROUTER_API_KEY");
    }
}
