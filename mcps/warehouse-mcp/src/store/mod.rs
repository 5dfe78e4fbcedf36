//! Blocking data-store interface
//!
//! The gateway only talks to the store through these traits. Every method
//! may block the calling thread until the store answers, so callers run them
//! on the blocking worker pool.

pub mod sqlite;

use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

pub use sqlite::SqliteConnector;

/// One row as a column → value mapping in column order
pub type Row = Map<String, Value>;

/// Errors raised by a store driver
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not connect: {0}")]
    Connect(String),

    /// The physical connection is gone; the handle must be replaced
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("query timed out after {timeout_secs} seconds")]
    Timeout {
        timeout_secs: u64,
        execution_id: Option<String>,
    },

    #[error("{message}")]
    Query {
        message: String,
        execution_id: Option<String>,
    },

    #[error("failed to set session option: {0}")]
    SessionOption(String),
}

impl StoreError {
    /// Execution id assigned before the failure, if the store got that far
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            StoreError::Timeout { execution_id, .. } | StoreError::Query { execution_id, .. } => {
                execution_id.as_deref()
            }
            _ => None,
        }
    }

    /// Whether the failure means the connection itself is unusable
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, StoreError::ConnectionLost(_))
    }
}

/// Rows fetched by one execution
#[derive(Debug, Clone)]
pub struct Fetched {
    pub execution_id: String,
    pub columns: Vec<String>,
    /// At most the requested fetch limit
    pub rows: Vec<Row>,
}

/// Session-scoped options as currently set on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub use_cached_result: bool,
    pub query_tag: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            use_cached_result: true,
            query_tag: None,
        }
    }
}

/// Opens physical connections
pub trait Connector: Send + Sync {
    /// Establish a new physical session
    fn connect(&self) -> Result<Box<dyn Session>, StoreError>;

    /// Query text for catalog browsing in this store's dialect
    fn catalog(&self) -> &dyn Catalog;
}

/// A live session with the store
pub trait Session: Send {
    /// Cheap liveness probe
    fn is_alive(&mut self) -> bool;

    /// Enable or disable the store's result cache for this session
    fn set_result_cache(&mut self, enabled: bool) -> Result<(), StoreError>;

    /// Set or clear the tag attached to subsequent executions
    fn set_query_tag(&mut self, tag: Option<&str>) -> Result<(), StoreError>;

    /// Current session-scoped options
    fn options(&self) -> SessionOptions;

    /// Run `sql` with a store-enforced timeout and fetch at most
    /// `fetch_limit` rows
    fn execute(
        &mut self,
        sql: &str,
        timeout: Duration,
        fetch_limit: usize,
    ) -> Result<Fetched, StoreError>;

    /// Close the physical connection
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// Catalog browsing queries in a store dialect
///
/// Table listings return `name`, `kind` and `comment` columns; table
/// descriptions return `name`, `type`, `null?` (`Y`/`N`), `default` and
/// `comment`. Arguments are plain identifiers checked by the caller.
pub trait Catalog: Send + Sync {
    fn list_databases(&self) -> String;

    fn list_schemas(&self, database: &str) -> String;

    fn list_tables(&self, database: &str, schema: &str) -> String;

    fn describe_table(&self, database: &str, schema: &str, table: &str) -> String;
}
