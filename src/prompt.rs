//! Assembly of the task-oriented system prompt.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AssistantError;

/// Built-in prompt template; `{tool_definitions}` is replaced with the
/// pretty-printed JSON tool list.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a task-oriented assistant for a smart solar panel maintenance system.
Your goal is to understand user commands and use the available tools to operate drones and rovers,
or to query the status of the system.

You have access to the following tools:
{tool_definitions}

When a user gives a command, you should first determine which tool(s) to use.
Then, respond with the appropriate tool call in the specified format. If no tool is needed, respond in natural language.
";

const TOOL_DEFINITIONS_SLOT: &str = "{tool_definitions}";

/// A tool description shown to the model, as read from the tools file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema-shaped parameter description, passed through verbatim.
    #[serde(default)]
    pub parameters: Value,
}

/// Reads tool definitions from a JSON file. A missing file is tolerated
/// (the assistant then advertises no tools); a malformed one is not.
pub fn load_tool_definitions(path: &Path) -> Result<Vec<ToolDefinition>, AssistantError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::warn!(
                "tools file {} not found, advertising no tools",
                path.display()
            );
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(AssistantError::Generic(format!(
                "failed to read tools file {}: {err}",
                path.display()
            )))
        }
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Builds the system prompt by injecting tool definitions into a template.
pub struct PromptBuilder {
    template: String,
    tools: Vec<ToolDefinition>,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            template: template.into(),
            tools,
        }
    }

    pub fn build_system_prompt(&self) -> String {
        let definitions =
            serde_json::to_string_pretty(&self.tools).unwrap_or_else(|_| "[]".to_string());
        self.template.replace(TOOL_DEFINITIONS_SLOT, &definitions)
    }
}
