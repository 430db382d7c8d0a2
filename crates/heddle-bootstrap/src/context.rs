// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Project-context discovery and the default system prompt.
use std::path::Path;

const MAX_CONTEXT_FILE_BYTES: usize = 16 * 1024;

/// Load a project-level agents-context file, tried in order:
/// 1. `.heddle/context.md`
/// 2. `AGENTS.md`
/// 3. `CLAUDE.md`
///
/// The first candidate that exists and is non-empty after trimming wins.
/// Files larger than [`MAX_CONTEXT_FILE_BYTES`] are truncated with a note
/// appended.
pub fn load_project_context_file(cwd: &Path) -> Option<String> {
    let candidates =
        [cwd.join(".heddle").join("context.md"), cwd.join("AGENTS.md"), cwd.join("CLAUDE.md")];

    for path in &candidates {
        if !path.exists() {
            continue;
        }
        let Ok(bytes) = std::fs::read(path) else { continue };

        let (content, truncated) = if bytes.len() > MAX_CONTEXT_FILE_BYTES {
            let safe = &bytes[..MAX_CONTEXT_FILE_BYTES];
            (String::from_utf8_lossy(safe).trim_end().to_string(), true)
        } else {
            (String::from_utf8_lossy(&bytes).trim().to_string(), false)
        };

        if content.is_empty() {
            continue;
        }

        return Some(if truncated {
            format!("{content}\n\n*(Context file truncated at {MAX_CONTEXT_FILE_BYTES} bytes)*")
        } else {
            content
        });
    }
    None
}

/// Minimal system prompt used when no `agent.system_prompt` is configured.
pub fn default_system_prompt() -> String {
    "You are heddle, a terminal coding agent. You have access to a small set \
     of tools for reading, writing, and searching the local filesystem and for \
     running shell commands.\n\
     \n\
     - Prefer `read_file`/`grep`/`glob` to explore before acting.\n\
     - Use `edit_file` for targeted changes to existing files; reserve \
       `write_file` for genuinely new files.\n\
     - `run_terminal_command` output is truncated; re-run with a narrower \
       command if you need more detail.\n\
     - Keep responses concise. State what you changed, not what you're about \
       to do."
        .to_string()
}

/// Compose the full system message: the project context file (if any),
/// prepended to the configured or default system prompt.
pub fn compose_system_prompt(cwd: &Path, configured: Option<&str>) -> String {
    let base = configured.map(str::to_string).unwrap_or_else(default_system_prompt);
    match load_project_context_file(cwd) {
        Some(context) => format!("{context}\n\n{base}"),
        None => base,
    }
}
