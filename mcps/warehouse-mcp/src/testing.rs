//! Scripted in-memory store for unit tests

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::store::{Catalog, Connector, Fetched, Row, Session, SessionOptions, StoreError};

/// Shared, inspectable state behind every scripted session
#[derive(Debug)]
pub struct StoreState {
    /// Physical connects performed
    pub connects: usize,
    /// Physical closes performed
    pub closes: usize,
    /// Next connect attempt fails
    pub fail_connect: bool,
    /// Liveness probe result
    pub alive: bool,
    /// Rows the store would produce for any query
    pub available_rows: usize,
    /// Next executions fail with this message
    pub fail_query: Option<String>,
    /// Next executions report the connection as lost
    pub lose_connection: bool,
    /// Setting a query tag fails
    pub fail_option: bool,
    /// How long each execution blocks
    pub latency: Duration,
    /// Options as currently set on the session
    pub options: SessionOptions,
    /// Options in force when each query ran, with its text and timeout
    pub executions: Vec<(String, Duration, SessionOptions)>,
    /// Fetch limit requested by each execution
    pub fetch_limits: Vec<usize>,
    /// Largest number of executions observed in flight at once
    pub peak_in_flight: usize,
    in_flight: usize,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            connects: 0,
            closes: 0,
            fail_connect: false,
            alive: true,
            available_rows: 3,
            fail_query: None,
            lose_connection: false,
            fail_option: false,
            latency: Duration::ZERO,
            options: SessionOptions::default(),
            executions: Vec::new(),
            fetch_limits: Vec::new(),
            peak_in_flight: 0,
            in_flight: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<StoreState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> Result<Box<dyn Session>, StoreError> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(StoreError::Connect("store unreachable".to_string()));
        }
        state.connects += 1;
        state.alive = true;
        state.options = SessionOptions::default();
        Ok(Box::new(ScriptedSession {
            state: self.state.clone(),
        }))
    }

    fn catalog(&self) -> &dyn Catalog {
        &ScriptedCatalog
    }
}

struct ScriptedSession {
    state: Arc<Mutex<StoreState>>,
}

impl ScriptedSession {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }
}

impl Session for ScriptedSession {
    fn is_alive(&mut self) -> bool {
        self.state().alive
    }

    fn set_result_cache(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.state().options.use_cached_result = enabled;
        Ok(())
    }

    fn set_query_tag(&mut self, tag: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_option && tag.is_some() {
            return Err(StoreError::SessionOption("query tag rejected".to_string()));
        }
        state.options.query_tag = tag.map(str::to_string);
        Ok(())
    }

    fn options(&self) -> SessionOptions {
        self.state().options.clone()
    }

    fn execute(
        &mut self,
        sql: &str,
        timeout: Duration,
        fetch_limit: usize,
    ) -> Result<Fetched, StoreError> {
        let latency = {
            let mut state = self.state();
            let options = state.options.clone();
            state.executions.push((sql.to_string(), timeout, options));
            state.fetch_limits.push(fetch_limit);
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
            state.latency
        };

        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = self.state();
        state.in_flight -= 1;
        let execution_id = format!("exec-{}", state.executions.len());

        if state.lose_connection {
            state.alive = false;
            return Err(StoreError::ConnectionLost("socket closed".to_string()));
        }
        if let Some(message) = state.fail_query.clone() {
            return Err(StoreError::Query {
                message,
                execution_id: Some(execution_id),
            });
        }

        let rows = (0..state.available_rows.min(fetch_limit))
            .map(|i| {
                let mut row = Row::new();
                row.insert("name".to_string(), Value::String(format!("item{i}")));
                row.insert("n".to_string(), serde_json::json!(i));
                row
            })
            .collect();

        Ok(Fetched {
            execution_id,
            columns: vec!["name".to_string(), "n".to_string()],
            rows,
        })
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.state().closes += 1;
        Ok(())
    }
}

struct ScriptedCatalog;

impl Catalog for ScriptedCatalog {
    fn list_databases(&self) -> String {
        "SHOW DATABASES".to_string()
    }

    fn list_schemas(&self, database: &str) -> String {
        format!("SHOW SCHEMAS IN DATABASE {database}")
    }

    fn list_tables(&self, database: &str, schema: &str) -> String {
        format!("SHOW TABLES IN SCHEMA {database}.{schema}")
    }

    fn describe_table(&self, database: &str, schema: &str, table: &str) -> String {
        format!("DESCRIBE TABLE {database}.{schema}.{table}")
    }
}
