//! Result helpers for MCP tool responses

use rmcp::model::{CallToolResult, Content};
use std::fmt::Display;

/// Create a successful plain text response
pub fn text_success(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Create a failed tool response: one line, `Error executing <tool>: <error>`
///
/// The error text is flattened so driver diagnostics spanning several lines
/// cannot leak a multi-line dump to the caller.
pub fn tool_failure(tool: &str, error: impl Display) -> CallToolResult {
    let message = error.to_string();
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    CallToolResult::error(vec![Content::text(format!(
        "Error executing {tool}: {message}"
    ))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::RawContent;

    fn text_of(result: &CallToolResult) -> String {
        match &result.content[0].raw {
            RawContent::Text(t) => t.text.clone(),
            _ => panic!("expected text content"),
        }
    }

    #[test]
    fn test_text_success() {
        let result = text_success("hello world");
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(text_of(&result), "hello world");
    }

    #[test]
    fn test_tool_failure_is_single_prefixed_line() {
        let result = tool_failure("execute_query", "syntax error\n  near \"FORM\"");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            text_of(&result),
            "Error executing execute_query: syntax error near \"FORM\""
        );
    }
}
