//! Per-request failure kinds

use thiserror::Error;

use crate::pool::PoolError;
use crate::store::StoreError;

/// Failures of one query execution
///
/// Unknown operations and malformed argument maps never get this far; they
/// are reported as [`mcp_common::EmbeddableError`] at the dispatch boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Rejected input; the store was not touched
    #[error("{0}")]
    Validation(String),

    /// The connection could not be (re)established
    #[error("Could not establish connection to data store: {0}")]
    Connect(String),

    /// The store accepted the session but the query failed or timed out
    #[error("{message}")]
    Execution {
        message: String,
        execution_id: Option<String>,
    },
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    /// Execution id of the failed query, when the store assigned one
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            GatewayError::Execution { execution_id, .. } => execution_id.as_deref(),
            _ => None,
        }
    }

    /// Message flattened onto one line for caller-facing output
    pub fn single_line(&self) -> String {
        self.to_string().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connect(message) => GatewayError::Connect(message),
            StoreError::Timeout {
                timeout_secs,
                execution_id,
            } => GatewayError::Execution {
                message: with_execution_id(
                    format!("Query timed out after {timeout_secs} seconds"),
                    execution_id.as_deref(),
                ),
                execution_id,
            },
            StoreError::Query {
                message,
                execution_id,
            } => GatewayError::Execution {
                message: with_execution_id(
                    format!("Query failed: {message}"),
                    execution_id.as_deref(),
                ),
                execution_id,
            },
            other @ (StoreError::ConnectionLost(_) | StoreError::SessionOption(_)) => {
                GatewayError::Execution {
                    message: format!("Query failed: {other}"),
                    execution_id: None,
                }
            }
        }
    }
}

impl From<PoolError> for GatewayError {
    fn from(err: PoolError) -> Self {
        let message = match err {
            PoolError::DeadlineExceeded(limit) => format!(
                "Query exceeded client deadline of {} seconds; the store did not honor its timeout",
                limit.as_secs()
            ),
            other => format!("Query failed: {other}"),
        };
        GatewayError::Execution {
            message,
            execution_id: None,
        }
    }
}

fn with_execution_id(message: String, execution_id: Option<&str>) -> String {
    match execution_id {
        Some(id) => format!("{message} (execution id: {id})"),
        None => message,
    }
}
