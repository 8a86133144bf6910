//! Noema MCP Server
//!
//! An MCP (Model Context Protocol) server exposing a typed knowledge graph —
//! entities with ordered observations, typed relations between them, and
//! full-text search — as tools an AI assistant can call to remember and
//! retrieve structured facts across a conversation.
//!
//! Storage is a single SQLite database with an FTS5 index, a counting bloom
//! filter membership sidecar, and bounded in-memory caches in front of it.
//! See `noema_core` for the engine; this crate only wires it up to the MCP
//! wire protocol over stdio (and, with the `http` feature, Streamable HTTP).

mod protocol;
mod resources;
mod server;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use noema_core::{Config, Core};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments and return the optional data directory
/// override. Returns `None` if no `--data-dir` was specified. Exits the
/// process if `--help` or `--version` is requested.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Noema MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("A typed knowledge-graph memory server for AI assistants,");
                println!("speaking the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    noema-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Directory holding graph.db and its bloom sidecar");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                Log level filter (e.g., debug, info, warn, error)");
                println!("    NOEMA_DB_PATH           Exact database file path, overriding --data-dir");
                println!();
                println!("EXAMPLES:");
                println!("    noema-mcp");
                println!("    noema-mcp --data-dir /custom/path");
                println!("    RUST_LOG=debug noema-mcp");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("noema-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: noema-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    eprintln!("Usage: noema-mcp --data-dir <PATH>");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Usage: noema-mcp [OPTIONS]");
                eprintln!("Try 'noema-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    data_dir
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before logging init, so --help/--version work cleanly)
    let data_dir = parse_args();

    // Initialize logging to stderr as structured JSON (stdout is reserved for JSON-RPC).
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Noema MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::default();
    if let Some(dir) = data_dir {
        config.db_path = dir.join("graph.db");
    }

    let core = match Core::open(config) {
        Ok(c) => {
            info!("Core opened at {:?}", c.db_path());
            Arc::new(c)
        }
        Err(e) => {
            error!("Failed to open core: {}", e);
            std::process::exit(1);
        }
    };

    // Periodic maintenance: if aging is enabled, run a decay pass on an
    // interval so prominence scores stay current without an operator
    // having to call the `maintenance` tool by hand.
    if core.config().aging.enabled {
        let core_clone = Arc::clone(&core);
        tokio::spawn(async move {
            let interval_hours: u64 = std::env::var("NOEMA_AGING_INTERVAL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6);

            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            loop {
                match core_clone.run_aging_pass() {
                    Ok(updated) => info!(updated, "Periodic aging pass complete"),
                    Err(e) => tracing::warn!("Periodic aging pass failed: {}", e),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval_hours * 3600)).await;
            }
        });
    }

    // The Streamable HTTP transport is opt-in: it listens on its own port
    // alongside stdio rather than replacing it, for clients that can't
    // speak to a child process's stdin/stdout directly.
    #[cfg(feature = "http")]
    if let Ok(port) = std::env::var("NOEMA_HTTP_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            let http_core = Arc::clone(&core);
            tokio::spawn(async move {
                let config = crate::protocol::http::HttpTransportConfig {
                    host: "127.0.0.1".to_string(),
                    port,
                };
                if let Err(e) = crate::protocol::http::HttpTransport::new(config).run(http_core).await {
                    error!("HTTP transport error: {}", e);
                }
            });
        }
    }

    let server = McpServer::new(core);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio...");

    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Noema MCP Server shutting down");
}
