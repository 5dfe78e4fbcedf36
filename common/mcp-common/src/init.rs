//! Server startup and shutdown
//!
//! Tracing setup, the [`ServerLifecycle`] hooks and the `serve_stdio!` macro
//! that wires them around the rmcp stdio transport.

use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for an MCP server
///
/// Logs go to stderr; stdout is reserved for the MCP protocol. Filtering
/// follows `RUST_LOG`, with `info` as the default for `crate_name`.
/// Set `LOG_FORMAT=json` for structured JSON output.
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let directive = format!("{}=info", crate_name);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}

/// Construction and teardown hooks used by `serve_stdio!`
#[async_trait]
pub trait ServerLifecycle: Sized + Send + Sync {
    /// Build the server from the process environment. An error here aborts
    /// startup before the transport is opened.
    fn from_env() -> anyhow::Result<Self>;

    /// Release server resources. Runs once, after the transport has closed.
    async fn shutdown(&self) {}
}

/// Generate a `#[tokio::main]` entry point for a stdio MCP server
///
/// The server type must implement [`ServerLifecycle`], `Clone` and
/// `rmcp::ServerHandler`.
///
/// ```rust,ignore
/// mcp_common::serve_stdio!(MyMcpServer, "my_mcp");
/// ```
///
/// The generated `main`:
/// 1. initializes tracing to stderr
/// 2. builds the server with `ServerLifecycle::from_env`
/// 3. serves via the stdio transport until the peer disconnects
/// 4. runs `ServerLifecycle::shutdown`
#[macro_export]
macro_rules! serve_stdio {
    ($server_type:ty, $crate_name:expr) => {
        #[tokio::main]
        async fn main() -> anyhow::Result<()> {
            use rmcp::ServiceExt;

            $crate::init_tracing($crate_name)?;

            tracing::info!(concat!("Starting ", $crate_name, " MCP Server"));

            let server = <$server_type as $crate::ServerLifecycle>::from_env()?;
            let service = server.clone().serve(rmcp::transport::stdio()).await?;

            tracing::info!("Server running, waiting for requests...");

            let quit = service.waiting().await;

            tracing::info!("Server shutting down");
            $crate::ServerLifecycle::shutdown(&server).await;

            quit?;
            Ok(())
        }
    };
}
