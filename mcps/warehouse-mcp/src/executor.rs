//! Query execution pipeline
//!
//! Validate, resolve options, then hand the whole store conversation to a
//! blocking worker while holding the connection lease:
//! acquire → set session options → run → fetch `cap + 1` rows → reset options.
//! The reset runs from a drop guard, so it happens on every exit path.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{GatewayConfig, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::connection::{ConnectionManager, ConnectionState, Lease};
use crate::error::GatewayError;
use crate::pool::BlockingPool;
use crate::store::{Catalog, Connector, Row, Session, StoreError};
use crate::validator::{self, Verdict};

static TAG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// One query invocation
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    /// Overrides the configured default timeout (1-3600 seconds)
    pub timeout_secs: Option<u64>,
    /// Caller label; auto-generated when absent
    pub tag: Option<String>,
    /// Disable the store's result cache for this query
    pub disable_cache: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timeout_secs: None,
            tag: None,
            disable_cache: true,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Result of one successful execution
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub execution_id: String,
    pub query_tag: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub has_more_rows: bool,
    pub max_rows_returned: usize,
    pub timeout_secs: u64,
    pub cache_disabled: bool,
}

/// Fully resolved parameters for the blocking part of an execution
#[derive(Debug)]
struct ExecutionPlan {
    query: String,
    timeout_secs: u64,
    tag: String,
    disable_cache: bool,
    max_rows: usize,
}

/// Runs validated queries against the shared connection
#[derive(Clone)]
pub struct QueryExecutor {
    config: Arc<GatewayConfig>,
    connections: ConnectionManager,
    pool: BlockingPool,
}

impl QueryExecutor {
    pub fn new(config: Arc<GatewayConfig>, connector: Arc<dyn Connector>) -> Self {
        let pool = BlockingPool::new(config.pool.workers);
        Self {
            connections: ConnectionManager::new(connector),
            pool,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.connections.connector().catalog()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connections.state().await
    }

    /// Timeout in force for a request: the override if given, else the
    /// configured default, bounded to 1-3600 seconds
    pub fn resolve_timeout(&self, requested: Option<u64>) -> Result<u64, GatewayError> {
        let secs = requested.unwrap_or(self.config.query.timeout_secs);
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
            return Err(GatewayError::validation(format!(
                "Timeout must be an integer between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, secs
            )));
        }
        Ok(secs)
    }

    /// Validate and run one query
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryResult, GatewayError> {
        if let Verdict::Rejected(reason) = validator::classify(&request.query) {
            tracing::warn!(reason = %reason, "Rejected query");
            return Err(GatewayError::validation(format!(
                "Query validation failed: {reason}"
            )));
        }

        let timeout_secs = self.resolve_timeout(request.timeout_secs)?;
        let tag = request
            .tag
            .filter(|tag| !tag.trim().is_empty())
            .unwrap_or_else(generate_tag);

        let plan = ExecutionPlan {
            query: request.query,
            timeout_secs,
            tag,
            disable_cache: request.disable_cache,
            max_rows: self.config.query.max_rows,
        };
        tracing::debug!(tag = %plan.tag, query = %plan.query, "Executing query");

        let deadline = Duration::from_secs(timeout_secs + self.config.query.deadline_grace_secs);
        let started = Instant::now();
        let lease = self.connections.lease().await;
        let result = self
            .pool
            .run(Some(deadline), move || run_on_lease(lease, plan))
            .await?;

        match &result {
            Ok(done) => tracing::info!(
                tag = %done.query_tag,
                execution_id = %done.execution_id,
                rows = done.row_count,
                has_more = done.has_more_rows,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Query completed"
            ),
            Err(e) => tracing::warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Query failed: {}",
                e
            ),
        }
        result
    }

    /// Close the connection once in-flight executions have released it.
    /// Returns whether a live connection was closed.
    pub async fn shutdown(&self) -> bool {
        let mut lease = self.connections.lease().await;
        self.pool
            .run(None, move || lease.teardown())
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Connection teardown failed: {}", e);
                false
            })
    }
}

/// The blocking half of an execution. Holds the lease throughout.
fn run_on_lease(mut lease: Lease, plan: ExecutionPlan) -> Result<QueryResult, GatewayError> {
    let handle = lease.acquire()?;
    tracing::debug!(connection = handle.id(), tag = %plan.tag, "Running query");

    let outcome = {
        let mut scope = SessionScope::enter(handle.session());
        scope.apply(&plan).and_then(|()| {
            scope.session().execute(
                &plan.query,
                Duration::from_secs(plan.timeout_secs),
                plan.max_rows.saturating_add(1),
            )
        })
    };

    let fetched = match outcome {
        Ok(fetched) => fetched,
        Err(e) => {
            if e.is_connection_loss() {
                lease.invalidate();
            }
            return Err(e.into());
        }
    };

    let mut rows = fetched.rows;
    let has_more_rows = rows.len() > plan.max_rows;
    rows.truncate(plan.max_rows);

    Ok(QueryResult {
        execution_id: fetched.execution_id,
        query_tag: plan.tag,
        columns: fetched.columns,
        row_count: rows.len(),
        rows,
        has_more_rows,
        max_rows_returned: plan.max_rows,
        timeout_secs: plan.timeout_secs,
        cache_disabled: plan.disable_cache,
    })
}

/// Session options in force for one query; restored to neutral on drop
struct SessionScope<'a> {
    session: &'a mut dyn Session,
}

impl<'a> SessionScope<'a> {
    fn enter(session: &'a mut dyn Session) -> Self {
        Self { session }
    }

    fn apply(&mut self, plan: &ExecutionPlan) -> Result<(), StoreError> {
        if plan.disable_cache {
            self.session.set_result_cache(false)?;
        }
        self.session.set_query_tag(Some(&plan.tag))
    }

    fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.session.set_query_tag(None) {
            tracing::warn!("Failed to clear query tag: {}", e);
        }
        if let Err(e) = self.session.set_result_cache(true) {
            tracing::warn!("Failed to re-enable result cache: {}", e);
        }
    }
}

/// Tag unique within the process: timestamp to the millisecond plus a
/// sequence number
fn generate_tag() -> String {
    let seq = TAG_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("mcp_{}_{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionOptions;
    use crate::testing::ScriptedConnector;
    use std::collections::HashSet;

    fn executor_with(rows: usize, max_rows: usize) -> (ScriptedConnector, QueryExecutor) {
        let connector = ScriptedConnector::new();
        connector.state().available_rows = rows;
        let mut config = GatewayConfig::for_database("/tmp/unused.db");
        config.query.max_rows = max_rows;
        let executor = QueryExecutor::new(Arc::new(config), Arc::new(connector.clone()));
        (connector, executor)
    }

    #[tokio::test]
    async fn test_rows_above_cap_are_truncated() {
        let (_connector, executor) = executor_with(5, 3);
        let result = executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();

        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows.len(), 3);
        assert!(result.has_more_rows);
        assert_eq!(result.max_rows_returned, 3);
    }

    #[tokio::test]
    async fn test_rows_at_or_below_cap_are_complete() {
        for available in [0, 2, 3] {
            let (_connector, executor) = executor_with(available, 3);
            let result = executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
            assert_eq!(result.row_count, available);
            assert!(!result.has_more_rows, "available = {available}");
        }
    }

    #[tokio::test]
    async fn test_store_is_asked_for_one_extra_row() {
        let (connector, executor) = executor_with(100, 10);
        executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
        assert_eq!(connector.state().fetch_limits, vec![11]);
    }

    #[tokio::test]
    async fn test_rejected_query_never_touches_store() {
        let (connector, executor) = executor_with(1, 10);
        let err = executor
            .execute(QueryRequest::new("-- comment\nDROP TABLE t"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("DROP"));
        assert_eq!(connector.state().connects, 0);
    }

    #[tokio::test]
    async fn test_timeout_out_of_bounds_is_validation_error() {
        let (connector, executor) = executor_with(1, 10);
        for timeout in [0, 3601, 9999] {
            let err = executor
                .execute(QueryRequest::new("SELECT 1").with_timeout(timeout))
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)));
        }
        assert_eq!(connector.state().connects, 0);
    }

    #[tokio::test]
    async fn test_timeout_override_and_default_reach_store() {
        let (connector, executor) = executor_with(1, 10);
        let result = executor
            .execute(QueryRequest::new("SELECT 1").with_timeout(120))
            .await
            .unwrap();
        assert_eq!(result.timeout_secs, 120);

        let result = executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
        assert_eq!(result.timeout_secs, 30);

        let state = connector.state();
        assert_eq!(state.executions[0].1, Duration::from_secs(120));
        assert_eq!(state.executions[1].1, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_session_options_applied_then_reset_on_success() {
        let (connector, executor) = executor_with(1, 10);
        executor
            .execute(QueryRequest::new("SELECT 1").with_tag("before_optimization"))
            .await
            .unwrap();

        let state = connector.state();
        let (_, _, during) = &state.executions[0];
        assert!(!during.use_cached_result);
        assert_eq!(during.query_tag.as_deref(), Some("before_optimization"));
        assert_eq!(state.options, SessionOptions::default());
    }

    #[tokio::test]
    async fn test_session_options_reset_after_query_failure() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().fail_query = Some("division by zero".to_string());

        let err = executor
            .execute(QueryRequest::new("SELECT 1 / 0"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Execution { .. }));
        assert_eq!(err.execution_id(), Some("exec-1"));
        assert!(err.to_string().contains("division by zero"));
        assert_eq!(connector.state().options, SessionOptions::default());
    }

    #[tokio::test]
    async fn test_session_option_failure_resets_and_keeps_connection() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().fail_option = true;

        // the cache is switched off before the tag is refused
        let err = executor
            .execute(QueryRequest::new("SELECT 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Execution { execution_id: None, .. }));
        assert!(err.to_string().contains("query tag rejected"));
        {
            let state = connector.state();
            assert!(state.executions.is_empty());
            assert_eq!(state.options, SessionOptions::default());
        }
        assert!(matches!(
            executor.connection_state().await,
            ConnectionState::Live { .. }
        ));

        connector.state().fail_option = false;
        executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
        assert_eq!(connector.state().connects, 1);
    }

    #[tokio::test]
    async fn test_query_failure_keeps_connection() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().fail_query = Some("bad column".to_string());
        assert!(executor.execute(QueryRequest::new("SELECT x")).await.is_err());

        connector.state().fail_query = None;
        executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
        assert_eq!(connector.state().connects, 1);
    }

    #[tokio::test]
    async fn test_connection_loss_forces_reconnect() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().lose_connection = true;
        assert!(executor.execute(QueryRequest::new("SELECT 1")).await.is_err());
        assert_eq!(executor.connection_state().await, ConnectionState::Absent);

        connector.state().lose_connection = false;
        executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
        assert_eq!(connector.state().connects, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_reported_then_retried() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().fail_connect = true;
        let err = executor.execute(QueryRequest::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Connect(_)));

        connector.state().fail_connect = false;
        assert!(executor.execute(QueryRequest::new("SELECT 1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_left_enabled_when_requested() {
        let (connector, executor) = executor_with(1, 10);
        let mut request = QueryRequest::new("SELECT 1");
        request.disable_cache = false;
        let result = executor.execute(request).await.unwrap();

        assert!(!result.cache_disabled);
        assert!(connector.state().executions[0].2.use_cached_result);
    }

    #[tokio::test]
    async fn test_auto_tags_are_unique() {
        let (_connector, executor) = executor_with(1, 10);
        let mut tags = HashSet::new();
        for _ in 0..20 {
            let result = executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();
            assert!(result.query_tag.starts_with("mcp_"));
            tags.insert(result.query_tag);
        }
        assert_eq!(tags.len(), 20);
    }

    #[tokio::test]
    async fn test_blank_tag_is_replaced() {
        let (_connector, executor) = executor_with(1, 10);
        let result = executor
            .execute(QueryRequest::new("SELECT 1").with_tag("  "))
            .await
            .unwrap();
        assert!(result.query_tag.starts_with("mcp_"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_executions_are_serialized() {
        let (connector, executor) = executor_with(1, 10);
        connector.state().latency = Duration::from_millis(30);

        let mut tasks = Vec::new();
        for i in 0..5 {
            let executor = executor.clone();
            tasks.push(tokio::spawn(async move {
                executor
                    .execute(QueryRequest::new("SELECT 1").with_tag(format!("t{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let state = connector.state();
        assert_eq!(state.peak_in_flight, 1);
        assert_eq!(state.connects, 1);
        // each query ran under its own tag
        let seen: HashSet<_> = state
            .executions
            .iter()
            .filter_map(|(_, _, options)| options.query_tag.clone())
            .collect();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_deadline_abandons_stuck_worker() {
        let connector = ScriptedConnector::new();
        connector.state().latency = Duration::from_millis(1500);
        let mut config = GatewayConfig::for_database("/tmp/unused.db");
        config.query.deadline_grace_secs = 0;
        let executor = QueryExecutor::new(Arc::new(config), Arc::new(connector.clone()));

        let err = executor
            .execute(QueryRequest::new("SELECT 1").with_timeout(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("client deadline"));

        // the abandoned worker still holds the lease and resets on completion
        assert!(matches!(
            executor.connection_state().await,
            ConnectionState::Live { .. }
        ));
        assert_eq!(connector.state().options, SessionOptions::default());
    }

    #[tokio::test]
    async fn test_shutdown_closes_once() {
        let (connector, executor) = executor_with(1, 10);
        executor.execute(QueryRequest::new("SELECT 1")).await.unwrap();

        assert!(executor.shutdown().await);
        assert!(!executor.shutdown().await);
        assert_eq!(connector.state().closes, 1);
    }
}
