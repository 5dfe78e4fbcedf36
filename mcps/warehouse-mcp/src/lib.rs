//! Warehouse MCP Library
//!
//! Read-only SQL gateway over a single persistent data-store connection.
//! Queries are validated against a read-only policy before they reach the
//! store, executed on a bounded blocking pool under an exclusive connection
//! lease, and returned with their execution id, tag and a capped row set.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use warehouse_mcp::{EmbeddableMcp, GatewayConfig, WarehouseMcpServer};
//!
//! let server = WarehouseMcpServer::new(GatewayConfig::for_database("sales.db"))?;
//! let result = server
//!     .call_tool("execute_query", serde_json::json!({ "query": "SELECT 1" }))
//!     .await?;
//! ```
//!
//! # Usage as Binary
//!
//! Run directly: `WAREHOUSE_DATABASE_PATH=sales.db warehouse-mcp`
//!
//! Or configure in `.mcp.json`:
//! ```json
//! { "mcpServers": { "warehouse": { "command": "./warehouse-mcp" } } }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod params;
pub mod pool;
pub mod server;
pub mod store;
pub mod validator;

#[cfg(test)]
mod testing;

pub use config::GatewayConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::GatewayError;
pub use executor::{QueryExecutor, QueryRequest, QueryResult};
pub use server::WarehouseMcpServer;
pub use store::{Connector, Session, SqliteConnector, StoreError};
pub use validator::{classify, Verdict};

// Re-export parameter types for direct API usage
pub use params::{CheckDatabaseParams, DescribeTableParams, QueryParams, SchemasParams, TablesParams};

// Re-export EmbeddableMcp trait for in-process usage
pub use mcp_common::{EmbeddableError, EmbeddableMcp, EmbeddableResult, ServerLifecycle};
