//! MCP Common - Shared utilities for MCP servers
//!
//! - **Lifecycle**: [`ServerLifecycle`] and the `serve_stdio!` macro for
//!   startup, stdio serving and shutdown
//! - **Results**: helpers for building `CallToolResult` responses, including
//!   the single-line failure form tools report to callers
//! - **Embeddable**: [`EmbeddableMcp`] for in-process dispatch by tool name
//!
//! # Example
//!
//! ```rust,ignore
//! // main.rs
//! mcp_common::serve_stdio!(MyServer, "my_mcp");
//!
//! // a tool body
//! match run() {
//!     Ok(text) => Ok(mcp_common::text_success(text)),
//!     Err(e) => Ok(mcp_common::tool_failure("my_tool", e)),
//! }
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;

pub use embeddable::{parse_params, EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::internal_error;
pub use init::{init_tracing, ServerLifecycle};
pub use result::{text_success, tool_failure};

pub use rmcp::{
    model::{CallToolResult, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;
