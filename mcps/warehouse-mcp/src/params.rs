//! Parameter types for Warehouse MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(description = "SQL query to execute (read-only operations only)")]
    pub query: String,

    #[schemars(
        description = "Timeout in seconds for this query (1-3600), overriding the server default. \
                       Use for long-running queries or to set a shorter limit.",
        range(min = 1, max = 3600)
    )]
    #[serde(default, alias = "timeout_secs")]
    pub timeout_seconds: Option<u64>,

    #[schemars(
        description = "Tag identifying this query for later analysis, e.g. 'before_optimization'. \
                       Generated when omitted."
    )]
    #[serde(default)]
    pub query_tag: Option<String>,

    #[schemars(
        description = "Disable the store's result cache for this query (default: true). \
                       Keep disabled for accurate performance comparisons."
    )]
    #[serde(default)]
    pub disable_cache: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SchemasParams {
    #[schemars(description = "Database name")]
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TablesParams {
    #[schemars(description = "Database name")]
    pub database: String,

    #[schemars(description = "Schema name")]
    pub schema: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    #[schemars(description = "Database name")]
    pub database: String,

    #[schemars(description = "Schema name")]
    pub schema: String,

    #[schemars(description = "Table name")]
    pub table: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckDatabaseParams {
    #[schemars(description = "Database name to check")]
    pub database: String,

    #[schemars(description = "Schema to also verify within the database (optional)")]
    #[serde(default)]
    pub schema: Option<String>,
}
