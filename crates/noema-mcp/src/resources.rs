//! `graph://` URI scheme resources for the MCP server.

use std::sync::Arc;

use noema_core::Core;

pub async fn read(core: &Arc<Core>, uri: &str) -> Result<String, String> {
    let path = uri.strip_prefix("graph://").unwrap_or("");
    match path {
        "stats" => read_stats(core).await,
        _ => Err(format!("Unknown graph resource: {}", uri)),
    }
}

async fn read_stats(core: &Arc<Core>) -> Result<String, String> {
    let stats = core.get_stats().map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())
}
