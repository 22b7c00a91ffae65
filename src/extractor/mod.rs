//! Extraction of embedded tool invocations from free-form model output.
//!
//! Models signal a tool call by naming a recipient (`to=<tool>`) followed by
//! a message marker and a JSON parameter object. Anything else is a plain
//! natural-language answer.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Current marker format: `to=<tool> ... <|message|> <json>`.
pub const TOOL_CALL_PATTERN: &str = r"(?s)to=(\w*).*?<\|message\|>(.*)";

/// Legacy marker format with a namespace prefix:
/// `to=functions.<tool> ... <|message|> <json>`.
pub const LEGACY_TOOL_CALL_PATTERN: &str = r"(?s)to=functions\.(\w*).*?<\|message\|>(.*)";

/// A tool invocation extracted from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

/// Outcome of scanning a model reply for a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A well-formed tool call.
    Call(ToolCall),
    /// A marker was present but the call could not be decoded. Recoverable:
    /// the orchestrator records it as a failed tool result and carries on.
    Malformed {
        tool_name: Option<String>,
        reason: String,
    },
    /// No marker found; the text is the answer itself.
    NoCall,
}

fn primary_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TOOL_CALL_PATTERN).expect("valid tool call pattern"))
}

fn legacy_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LEGACY_TOOL_CALL_PATTERN).expect("valid legacy pattern"))
}

/// Scan `text` for the first tool-call marker, trying the current pattern
/// and then the legacy pattern.
pub fn extract_tool_call(text: &str) -> Extraction {
    if let Some(caps) = primary_pattern().captures(text) {
        if let (Some(name), Some(params)) = (caps.get(1), caps.get(2)) {
            // A capture followed by '.' is the legacy namespace prefix, not
            // a tool name; let the legacy pattern claim it.
            if !text[name.end()..].starts_with('.') {
                return decode(name.as_str(), params.as_str());
            }
        }
    }
    if let Some(caps) = legacy_pattern().captures(text) {
        if let (Some(name), Some(params)) = (caps.get(1), caps.get(2)) {
            return decode(name.as_str(), params.as_str());
        }
    }
    Extraction::NoCall
}

fn decode(name: &str, raw_params: &str) -> Extraction {
    let name = name.trim();
    if name.is_empty() {
        return Extraction::Malformed {
            tool_name: None,
            reason: "tool call marker with empty tool name".to_string(),
        };
    }
    match serde_json::from_str::<Value>(raw_params.trim()) {
        Ok(Value::Object(parameters)) => Extraction::Call(ToolCall {
            tool_name: name.to_string(),
            parameters,
        }),
        Ok(other) => Extraction::Malformed {
            tool_name: Some(name.to_string()),
            reason: format!("tool parameters must be a JSON object, got: {other}"),
        },
        Err(err) => Extraction::Malformed {
            tool_name: Some(name.to_string()),
            reason: format!("invalid tool parameter JSON: {err}"),
        },
    }
}
