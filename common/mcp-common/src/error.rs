//! MCP protocol error helpers

use rmcp::ErrorData as McpError;

/// Create an internal error with a message
///
/// For failures of the server itself (e.g. a response that cannot be
/// encoded), as opposed to failures of the requested operation, which tools
/// report through [`crate::tool_failure`].
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error() {
        let err = internal_error("encoding failed");
        assert!(err.message.contains("encoding failed"));
    }
}
