//! In-process dispatch by tool name
//!
//! [`EmbeddableMcp`] lets a host call a server's tools directly, without the
//! stdio transport. `call_tool` is the dispatch boundary: unknown names and
//! argument maps that do not fit the tool's parameters fail here with an
//! [`EmbeddableError`] before any tool logic runs.
//!
//! ```rust,ignore
//! let server = WarehouseMcpServer::new(config)?;
//! let result = server
//!     .call_tool("execute_query", serde_json::json!({ "query": "SELECT 1" }))
//!     .await?;
//! ```

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Dispatch-boundary failures
#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    /// No tool is registered under this name
    #[error("unknown operation: {0}")]
    ToolNotFound(String),

    /// The argument map does not fit the tool's parameters
    #[error("{tool}: invalid parameters: {message}")]
    InvalidParams { tool: String, message: String },

    /// MCP protocol error raised by the tool itself
    #[error("mcp error: {0}")]
    McpError(String),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::McpError(err.message.to_string())
    }
}

/// Result type for embeddable MCP operations
pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// Decode `tool`'s argument map, reporting mismatches as `InvalidParams`
pub fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> EmbeddableResult<T> {
    // Tools without arguments are commonly called with `null`
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| EmbeddableError::InvalidParams {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// MCP servers that can be called in-process
///
/// Implementations must be `Send + Sync`: a host may issue tool calls from
/// many tasks at once.
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Server name as used in MCP configuration files
    fn server_name(&self) -> &str;

    /// All available tools with their descriptions and input schemas
    fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool by name with a JSON argument map
    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }

    fn server_version(&self) -> Option<&str> {
        None
    }
}
