//! SQLite store backend
//!
//! The configured database file is the single exposed database; its schemas
//! are `main`, `temp` and every attached file. SQLite has no result cache or
//! query tags, so those session options are tracked but only used for
//! logging.

use rusqlite::{types::Value as SqlValue, Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{Catalog, Connector, Fetched, Row, Session, SessionOptions, StoreError};
use crate::config::{GatewayConfig, StoreConfig};
use crate::validator::{has_trailing_statement, is_identifier};

/// VM steps between deadline checks
const PROGRESS_STEPS: i32 = 1_000;

/// Longest query tag accepted, in characters
pub const MAX_QUERY_TAG_LEN: usize = 2_000;

/// Opens SQLite sessions for the configured database file
pub struct SqliteConnector {
    store: StoreConfig,
    busy_timeout: Duration,
    catalog: SqliteCatalog,
}

impl SqliteConnector {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            store: config.store.clone(),
            busy_timeout: Duration::from_secs(config.query.timeout_secs),
            catalog: SqliteCatalog {
                database: config.store.database_name(),
            },
        }
    }

    fn open_flags(&self) -> OpenFlags {
        let mode = if self.store.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn Session>, StoreError> {
        let path = &self.store.path;
        let conn = Connection::open_with_flags(path, self.open_flags())
            .map_err(|e| StoreError::Connect(format!("{}: {}", path.display(), e)))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        for (schema, file) in &self.store.attach {
            if !is_identifier(schema) {
                return Err(StoreError::Connect(format!(
                    "invalid schema name for attached database: {schema}"
                )));
            }
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)),
                [file.to_string_lossy().into_owned()],
            )
            .map_err(|e| {
                StoreError::Connect(format!("attach {} ({}): {}", schema, file.display(), e))
            })?;
        }

        tracing::debug!(path = %path.display(), attached = self.store.attach.len(), "Opened SQLite session");

        Ok(Box::new(SqliteSession {
            conn,
            options: SessionOptions::default(),
        }))
    }

    fn catalog(&self) -> &dyn Catalog {
        &self.catalog
    }
}

/// One open SQLite connection plus its session-scoped options
pub struct SqliteSession {
    conn: Connection,
    options: SessionOptions,
}

impl SqliteSession {
    fn fetch(&self, sql: &str, fetch_limit: usize) -> rusqlite::Result<(Vec<String>, Vec<Row>)> {
        // prepare() compiles the first statement and drops the rest
        if has_trailing_statement(sql) {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some("only one statement per query is supported".to_string()),
            ));
        }

        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
                Some("statement would modify the database".to_string()),
            ));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut fetched = Vec::new();
        while fetched.len() < fetch_limit {
            let Some(row) = rows.next()? else {
                break;
            };
            let mut values = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                values.insert(column.clone(), to_json(value));
            }
            fetched.push(values);
        }

        Ok((columns, fetched))
    }
}

impl Session for SqliteSession {
    fn is_alive(&mut self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn set_result_cache(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.options.use_cached_result = enabled;
        Ok(())
    }

    fn set_query_tag(&mut self, tag: Option<&str>) -> Result<(), StoreError> {
        if let Some(len) = tag.map(|t| t.chars().count()).filter(|n| *n > MAX_QUERY_TAG_LEN) {
            return Err(StoreError::SessionOption(format!(
                "query tag is {len} characters, limit is {MAX_QUERY_TAG_LEN}"
            )));
        }
        self.options.query_tag = tag.map(str::to_string);
        Ok(())
    }

    fn options(&self) -> SessionOptions {
        self.options.clone()
    }

    fn execute(
        &mut self,
        sql: &str,
        timeout: Duration,
        fetch_limit: usize,
    ) -> Result<Fetched, StoreError> {
        let execution_id = Uuid::new_v4().to_string();
        tracing::debug!(
            execution_id = %execution_id,
            tag = self.options.query_tag.as_deref().unwrap_or(""),
            "Executing on SQLite"
        );

        let deadline = Instant::now() + timeout;
        self.conn
            .progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
        let result = self.fetch(sql, fetch_limit);
        self.conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Ok((columns, rows)) => Ok(Fetched {
                execution_id,
                columns,
                rows,
            }),
            Err(e) => Err(classify_error(e, execution_id, timeout)),
        }
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn
            .close()
            .map_err(|(_, e)| StoreError::ConnectionLost(format!("close failed: {e}")))
    }
}

/// Map a driver error onto the gateway's failure kinds
fn classify_error(err: rusqlite::Error, execution_id: String, timeout: Duration) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => StoreError::Timeout {
            timeout_secs: timeout.as_secs(),
            execution_id: Some(execution_id),
        },
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::SystemIoFailure,
        ) => StoreError::ConnectionLost(err.to_string()),
        _ => StoreError::Query {
            message: err.to_string(),
            execution_id: Some(execution_id),
        },
    }
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => serde_json::json!(i),
        SqlValue::Real(f) => serde_json::json!(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Catalog queries over SQLite's schema tables and pragma functions
struct SqliteCatalog {
    database: String,
}

impl SqliteCatalog {
    /// Extra predicate that empties the result for any other database name
    fn only_this_database(&self, database: &str) -> &'static str {
        if database.eq_ignore_ascii_case(&self.database) {
            "1"
        } else {
            "0"
        }
    }
}

impl Catalog for SqliteCatalog {
    fn list_databases(&self) -> String {
        format!("SELECT {} AS name", quote_literal(&self.database))
    }

    fn list_schemas(&self, database: &str) -> String {
        format!(
            "SELECT name FROM pragma_database_list WHERE {} ORDER BY seq",
            self.only_this_database(database)
        )
    }

    fn list_tables(&self, database: &str, schema: &str) -> String {
        format!(
            "SELECT name, type AS kind, NULL AS comment FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND {} ORDER BY name",
            quote_ident(schema),
            self.only_this_database(database)
        )
    }

    fn describe_table(&self, database: &str, schema: &str, table: &str) -> String {
        format!(
            "SELECT name, type, CASE WHEN \"notnull\" = 0 THEN 'Y' ELSE 'N' END AS \"null?\", \
             dflt_value AS \"default\", NULL AS comment \
             FROM pragma_table_info({}, {}) WHERE {} ORDER BY cid",
            quote_literal(table),
            quote_literal(schema),
            self.only_this_database(database)
        )
    }
}
