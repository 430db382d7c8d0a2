// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Builds the default tool registry: read, write, edit, glob, grep, bash.
use heddle_config::ToolsConfig;
use heddle_tools::{
    EditFileTool, GlobFileSearchTool, GrepTool, ReadFileTool, RunTerminalCommandTool, Tool,
    ToolRegistry, WriteTool,
};

/// Register the built-in tools, optionally filtered by name.
///
/// An empty or absent `filter` is treated as "register everything" — this
/// matches the session-setup rule that an empty tool list means unset, not
/// "register nothing".
pub fn build_tool_registry(tools_config: &ToolsConfig, filter: Option<&[String]>) -> ToolRegistry {
    let filter = filter.filter(|f| !f.is_empty());

    let mut registry = ToolRegistry::new();
    let run_terminal = RunTerminalCommandTool { timeout_secs: tools_config.timeout_secs };

    register_if_allowed(&mut registry, filter, ReadFileTool);
    register_if_allowed(&mut registry, filter, WriteTool);
    register_if_allowed(&mut registry, filter, EditFileTool);
    register_if_allowed(&mut registry, filter, GlobFileSearchTool);
    register_if_allowed(&mut registry, filter, GrepTool);
    register_if_allowed(&mut registry, filter, run_terminal);

    registry
}

fn register_if_allowed<T: heddle_tools::Tool + 'static>(
    registry: &mut ToolRegistry,
    filter: Option<&[String]>,
    tool: T,
) {
    let allowed = match filter {
        Some(names) => names.iter().any(|n| n == tool.name()),
        None => true,
    };
    if allowed {
        let _ = registry.register(tool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_registers_all_six_builtins() {
        let registry = build_tool_registry(&ToolsConfig::default(), None);
        let mut names = registry.names();
        names.sort();
        assert_eq!(
            names,
            vec!["edit_file", "glob", "grep", "read_file", "run_terminal_command", "write_file"]
        );
    }

    #[test]
    fn empty_filter_is_treated_as_unset() {
        let registry = build_tool_registry(&ToolsConfig::default(), Some(&[]));
        assert_eq!(registry.names().len(), 6);
    }

    #[test]
    fn non_empty_filter_restricts_registration() {
        let filter = vec!["read_file".to_string(), "grep".to_string()];
        let registry = build_tool_registry(&ToolsConfig::default(), Some(&filter));
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["grep", "read_file"]);
    }

    #[test]
    fn run_terminal_command_honors_configured_timeout() {
        let config = ToolsConfig { timeout_secs: 5, ..ToolsConfig::default() };
        let registry = build_tool_registry(&config, None);
        assert!(registry.get("run_terminal_command").is_some());
    }
}
