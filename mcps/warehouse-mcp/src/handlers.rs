//! Tool handlers
//!
//! Each handler maps its parameters onto the executor and renders the
//! outcome as caller-facing text. Operation failures become error results
//! (`Error executing <tool>: ...`); only a response that cannot be encoded
//! is reported as a protocol error.

use mcp_common::{internal_error, text_success, tool_failure, CallToolResult, McpError};
use serde_json::Value;

use crate::error::GatewayError;
use crate::executor::{QueryExecutor, QueryRequest, QueryResult};
use crate::params::*;
use crate::store::Row;
use crate::validator;

// ============================================================================
// Helper Functions
// ============================================================================

fn failure(tool: &str, err: &GatewayError) -> CallToolResult {
    tracing::error!(tool, "Error executing {}: {}", tool, err.single_line());
    tool_failure(tool, err.single_line())
}

fn require_identifier(kind: &str, name: &str) -> Result<(), GatewayError> {
    if validator::is_identifier(name) {
        Ok(())
    } else {
        Err(GatewayError::validation(format!(
            "Invalid {kind} name '{name}': expected letters, digits, '_' or '$', not starting with a digit"
        )))
    }
}

/// Run catalog SQL with default options
async fn catalog_query(executor: &QueryExecutor, sql: String) -> Result<QueryResult, GatewayError> {
    executor.execute(QueryRequest::new(sql)).await
}

/// Display form of one cell; NULL and missing columns render empty
fn cell(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Rendering
// ============================================================================

fn render_query_result(result: &QueryResult, rows_json: &str) -> String {
    let mut out = String::from("Query executed successfully!\n\n");
    out.push_str(&format!("Query ID: {}\n", result.execution_id));
    out.push_str(&format!("Query tag: {}\n", result.query_tag));
    out.push_str(&format!(
        "Result cache: {}\n",
        if result.cache_disabled { "DISABLED" } else { "ENABLED" }
    ));
    out.push_str(&format!(
        "Timeout: {} seconds ({:.1} minutes)\n",
        result.timeout_secs,
        result.timeout_secs as f64 / 60.0
    ));
    out.push_str(&format!("Columns: {}\n", result.columns.join(", ")));
    out.push_str(&format!("Rows returned: {}\n", result.row_count));
    if result.has_more_rows {
        out.push_str(&format!(
            "Warning: results limited to {} rows. Query returned more data.\n",
            result.max_rows_returned
        ));
    }
    out.push_str("\nResults:\n");
    out.push_str(rows_json);
    out
}

fn render_tables(database: &str, schema: &str, rows: &[Row]) -> String {
    let tables: Vec<String> = rows
        .iter()
        .map(|row| {
            let kind = match cell(row, "kind") {
                kind if kind.is_empty() => "TABLE".to_string(),
                kind => kind.to_uppercase(),
            };
            let mut line = format!("{} ({kind})", cell(row, "name"));
            let comment = cell(row, "comment");
            if !comment.is_empty() {
                line.push_str(&format!(" - {comment}"));
            }
            line
        })
        .collect();

    format!(
        "Tables in {database}.{schema} ({}):\n{}",
        tables.len(),
        bullets(&tables)
    )
}

fn render_table_structure(qualified: &str, rows: &[Row]) -> String {
    let mut out = format!("Structure of table {qualified}:\n\n");
    out.push_str(&format!(
        "{:<30} {:<20} {:<8} {:<15} {}\n",
        "Column", "Type", "Null?", "Default", "Comment"
    ));
    out.push_str(&"-".repeat(90));
    out.push('\n');

    for row in rows {
        let nullable = if cell(row, "null?") == "Y" { "YES" } else { "NO" };
        out.push_str(&format!(
            "{:<30} {:<20} {:<8} {:<15} {}\n",
            clip(&cell(row, "name"), 29),
            clip(&cell(row, "type"), 19),
            nullable,
            clip(&cell(row, "default"), 14),
            cell(row, "comment")
        ));
    }
    out
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn execute_query(
    executor: &QueryExecutor,
    params: QueryParams,
) -> Result<CallToolResult, McpError> {
    let request = QueryRequest {
        query: params.query,
        timeout_secs: params.timeout_seconds,
        tag: params.query_tag,
        disable_cache: params.disable_cache.unwrap_or(true),
    };

    let result = match executor.execute(request).await {
        Ok(result) => result,
        Err(e) => return Ok(failure("execute_query", &e)),
    };

    let rows_json = serde_json::to_string_pretty(&result.rows)
        .map_err(|e| internal_error(format!("Failed to encode rows: {e}")))?;

    Ok(text_success(render_query_result(&result, &rows_json)))
}

pub async fn list_databases(executor: &QueryExecutor) -> Result<CallToolResult, McpError> {
    let sql = executor.catalog().list_databases();
    match catalog_query(executor, sql).await {
        Ok(result) => {
            let names: Vec<String> = result.rows.iter().map(|row| cell(row, "name")).collect();
            Ok(text_success(format!(
                "Available databases ({}):\n{}",
                names.len(),
                bullets(&names)
            )))
        }
        Err(e) => Ok(failure("list_databases", &e)),
    }
}

pub async fn list_schemas(
    executor: &QueryExecutor,
    params: SchemasParams,
) -> Result<CallToolResult, McpError> {
    let outcome = async {
        require_identifier("database", &params.database)?;
        let sql = executor.catalog().list_schemas(&params.database);
        catalog_query(executor, sql).await
    }
    .await;

    match outcome {
        Ok(result) => {
            let names: Vec<String> = result.rows.iter().map(|row| cell(row, "name")).collect();
            Ok(text_success(format!(
                "Available schemas ({}) in database {}:\n{}",
                names.len(),
                params.database,
                bullets(&names)
            )))
        }
        Err(e) => Ok(failure("list_schemas", &e)),
    }
}

pub async fn list_tables(
    executor: &QueryExecutor,
    params: TablesParams,
) -> Result<CallToolResult, McpError> {
    let outcome = async {
        require_identifier("database", &params.database)?;
        require_identifier("schema", &params.schema)?;
        let sql = executor
            .catalog()
            .list_tables(&params.database, &params.schema);
        catalog_query(executor, sql).await
    }
    .await;

    match outcome {
        Ok(result) => Ok(text_success(render_tables(
            &params.database,
            &params.schema,
            &result.rows,
        ))),
        Err(e) => Ok(failure("list_tables", &e)),
    }
}

pub async fn describe_table(
    executor: &QueryExecutor,
    params: DescribeTableParams,
) -> Result<CallToolResult, McpError> {
    let qualified = format!("{}.{}.{}", params.database, params.schema, params.table);
    let outcome = async {
        require_identifier("database", &params.database)?;
        require_identifier("schema", &params.schema)?;
        require_identifier("table", &params.table)?;
        let sql = executor
            .catalog()
            .describe_table(&params.database, &params.schema, &params.table);
        let result = catalog_query(executor, sql).await?;
        if result.rows.is_empty() {
            return Err(GatewayError::Execution {
                message: format!("table {qualified} not found"),
                execution_id: Some(result.execution_id),
            });
        }
        Ok(result)
    }
    .await;

    match outcome {
        Ok(result) => Ok(text_success(render_table_structure(&qualified, &result.rows))),
        Err(e) => Ok(failure("describe_table", &e)),
    }
}

/// Probe database (and optionally schema) access. An inaccessible database
/// is a normal answer, not a failure.
pub async fn check_database_exists(
    executor: &QueryExecutor,
    params: CheckDatabaseParams,
) -> Result<CallToolResult, McpError> {
    let database = &params.database;
    let schema = params.schema.as_deref().filter(|s| !s.is_empty());

    let checked = require_identifier("database", database)
        .and_then(|()| schema.map_or(Ok(()), |s| require_identifier("schema", s)));
    if let Err(e) = checked {
        return Ok(failure("check_database_exists", &e));
    }

    let sql = executor.catalog().list_schemas(database);
    let schema_count = match catalog_query(executor, sql).await {
        Ok(result) if result.row_count > 0 => result.row_count,
        Ok(_) => {
            return Ok(text_success(format!(
                "Cannot access database '{database}': database not found"
            )))
        }
        Err(e) => {
            return Ok(text_success(format!(
                "Cannot access database '{database}': {}",
                e.single_line()
            )))
        }
    };

    let mut out = format!("Database '{database}' exists and is accessible.\n");
    out.push_str(&format!("   Found {schema_count} schemas in this database.\n\n"));

    if let Some(schema) = schema {
        let sql = executor.catalog().list_tables(database, schema);
        match catalog_query(executor, sql).await {
            Ok(result) => out.push_str(&format!(
                "Schema '{schema}' is accessible with {} tables.\n\n",
                result.row_count
            )),
            Err(e) => out.push_str(&format!(
                "Schema '{schema}' may not be accessible: {}\n\n",
                e.single_line()
            )),
        }
    }

    out.push_str("To query this database, use fully qualified names like:\n");
    out.push_str(&format!("   SELECT * FROM {database}.schema_name.table_name"));

    Ok(text_success(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn result(has_more_rows: bool) -> QueryResult {
        QueryResult {
            execution_id: "01b2".to_string(),
            query_tag: "nightly".to_string(),
            columns: vec!["ID".to_string(), "NAME".to_string()],
            rows: vec![row(&[("ID", json!(1)), ("NAME", json!("a"))])],
            row_count: 1,
            has_more_rows,
            max_rows_returned: 1,
            timeout_secs: 90,
            cache_disabled: true,
        }
    }

    #[test]
    fn test_query_result_header() {
        let text = render_query_result(&result(false), "[]");
        assert!(text.starts_with("Query executed successfully!\n\n"));
        assert!(text.contains("Query ID: 01b2\n"));
        assert!(text.contains("Query tag: nightly\n"));
        assert!(text.contains("Result cache: DISABLED\n"));
        assert!(text.contains("Timeout: 90 seconds (1.5 minutes)\n"));
        assert!(text.contains("Columns: ID, NAME\n"));
        assert!(text.contains("Rows returned: 1\n"));
        assert!(!text.contains("limited to"));
        assert!(text.ends_with("\nResults:\n[]"));
    }

    #[test]
    fn test_query_result_truncation_warning() {
        let text = render_query_result(&result(true), "[]");
        assert!(text.contains("results limited to 1 rows"));
    }

    #[test]
    fn test_tables_with_kind_and_comment() {
        let rows = vec![
            row(&[("name", json!("orders")), ("kind", json!("table")), ("comment", Value::Null)]),
            row(&[("name", json!("v_sales")), ("kind", json!("view")), ("comment", json!("rollup"))]),
        ];
        assert_eq!(
            render_tables("sales", "main", &rows),
            "Tables in sales.main (2):\n• orders (TABLE)\n• v_sales (VIEW) - rollup"
        );
    }

    #[test]
    fn test_table_structure_alignment() {
        let long_name = "c".repeat(40);
        let rows = vec![
            row(&[
                ("name", json!("id")),
                ("type", json!("INTEGER")),
                ("null?", json!("N")),
                ("default", Value::Null),
            ]),
            row(&[
                ("name", json!(long_name)),
                ("type", json!("TEXT")),
                ("null?", json!("Y")),
                ("default", json!("'x'")),
            ]),
        ];
        let text = render_table_structure("sales.main.orders", &rows);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Structure of table sales.main.orders:");
        assert!(lines[2].starts_with("Column"));
        assert_eq!(&lines[2][31..35], "Type");
        assert_eq!(lines[3], "-".repeat(90));
        assert!(lines[4].starts_with(&format!("{:<30} {:<20} NO ", "id", "INTEGER")));
        assert!(lines[5].starts_with(&format!("{} {:<20} YES", "c".repeat(29) + " ", "TEXT")));
    }

    #[test]
    fn test_identifier_rejection_message() {
        let err = require_identifier("schema", "main; DROP").unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("Invalid schema name 'main; DROP'"));
    }

    #[test]
    fn test_cell_display() {
        let r = row(&[("a", json!(1.5)), ("b", Value::Null), ("c", json!("x"))]);
        assert_eq!(cell(&r, "a"), "1.5");
        assert_eq!(cell(&r, "b"), "");
        assert_eq!(cell(&r, "c"), "x");
        assert_eq!(cell(&r, "missing"), "");
    }
}
