//! Warehouse MCP Server
//!
//! Read-only SQL gateway over a persistent data-store connection.
//!
//! # Usage
//!
//! Run directly: `WAREHOUSE_DATABASE_PATH=sales.db warehouse-mcp`
//!
//! Configuration is read from `WAREHOUSE_CONFIG_PATH` or
//! `~/.binks/warehouse.toml`, with `WAREHOUSE_*` environment overrides.

use warehouse_mcp::WarehouseMcpServer;

mcp_common::serve_stdio!(WarehouseMcpServer, "warehouse_mcp");
