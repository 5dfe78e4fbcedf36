//! MCP Server implementation for the read-only warehouse gateway
//!
//! Tools are declared on the rmcp router for the stdio transport; the same
//! tools are reachable in-process through [`EmbeddableMcp::call_tool`], which
//! is the dispatch boundary for operation names and argument maps.

use std::sync::Arc;

use mcp_common::{
    async_trait, parse_params, CallToolResult, EmbeddableError, EmbeddableMcp, EmbeddableResult,
    McpError, ServerLifecycle,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::executor::QueryExecutor;
use crate::handlers;
use crate::params::*;
use crate::store::{Connector, SqliteConnector};

const INSTRUCTIONS: &str = "Read-only SQL gateway over a persistent data-store connection. \
     Queries must start with SELECT, WITH, SHOW, DESCRIBE, DESC or EXPLAIN; \
     mutating and administrative statements are rejected before reaching the store. \
     Catalog tools list databases, schemas and tables and describe table structure.";

/// The Warehouse MCP Server
#[derive(Clone)]
pub struct WarehouseMcpServer {
    executor: QueryExecutor,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl WarehouseMcpServer {
    /// Create a server backed by the SQLite store described in `config`
    ///
    /// Nothing connects until the first tool call.
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let connector = SqliteConnector::new(&config);
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Create a server over an arbitrary store
    pub fn with_connector(config: GatewayConfig, connector: Arc<dyn Connector>) -> Self {
        tracing::info!(
            database = %config.store.database_name(),
            timeout_secs = config.query.timeout_secs,
            max_rows = config.query.max_rows,
            workers = config.pool.workers,
            "Warehouse gateway configured"
        );
        Self {
            executor: QueryExecutor::new(Arc::new(config), connector),
            tool_router: Self::tool_router(),
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    #[tool(
        description = "Execute a read-only SQL query. Supports SELECT, WITH (CTEs), SHOW, DESCRIBE and EXPLAIN. \
                       Returns the execution id, query tag, columns and up to the configured row cap of rows."
    )]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::execute_query(&self.executor, params).await
    }

    #[tool(description = "List all databases")]
    async fn list_databases(&self) -> Result<CallToolResult, McpError> {
        handlers::list_databases(&self.executor).await
    }

    #[tool(description = "List all schemas in a database")]
    async fn list_schemas(
        &self,
        Parameters(params): Parameters<SchemasParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_schemas(&self.executor, params).await
    }

    #[tool(description = "List all tables in a database schema")]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<TablesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_tables(&self.executor, params).await
    }

    #[tool(description = "Describe the columns of a table in a database schema")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_table(&self.executor, params).await
    }

    #[tool(
        description = "Check that a database exists and is accessible. Optionally check a schema within it."
    )]
    async fn check_database_exists(
        &self,
        Parameters(params): Parameters<CheckDatabaseParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::check_database_exists(&self.executor, params).await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for WarehouseMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[async_trait]
impl ServerLifecycle for WarehouseMcpServer {
    fn from_env() -> anyhow::Result<Self> {
        Self::new(GatewayConfig::load()?)
    }

    async fn shutdown(&self) {
        if self.executor.shutdown().await {
            tracing::info!("Connection closed");
        }
    }
}

// ============================================================================
// EmbeddableMcp Implementation
// ============================================================================

#[async_trait]
impl EmbeddableMcp for WarehouseMcpServer {
    fn server_name(&self) -> &str {
        "warehouse"
    }

    fn server_description(&self) -> Option<&str> {
        Some(INSTRUCTIONS)
    }

    fn server_version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        match name {
            "execute_query" => {
                let params: QueryParams = parse_params(name, params)?;
                self.execute_query(Parameters(params)).await.map_err(Into::into)
            }

            "list_databases" => self.list_databases().await.map_err(Into::into),

            "list_schemas" => {
                let params: SchemasParams = parse_params(name, params)?;
                self.list_schemas(Parameters(params)).await.map_err(Into::into)
            }

            "list_tables" => {
                let params: TablesParams = parse_params(name, params)?;
                self.list_tables(Parameters(params)).await.map_err(Into::into)
            }

            "describe_table" => {
                let params: DescribeTableParams = parse_params(name, params)?;
                self.describe_table(Parameters(params)).await.map_err(Into::into)
            }

            "check_database_exists" => {
                let params: CheckDatabaseParams = parse_params(name, params)?;
                self.check_database_exists(Parameters(params))
                    .await
                    .map_err(Into::into)
            }

            _ => {
                tracing::warn!(operation = name, "Unknown operation");
                Err(EmbeddableError::ToolNotFound(name.to_string()))
            }
        }
    }
}
