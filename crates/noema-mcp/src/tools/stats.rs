//! `get_stats` tool (spec.md §4.9).

use std::sync::Arc;

use noema_core::Core;

pub fn schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub async fn execute(core: &Arc<Core>, _args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let stats = core.get_stats().map_err(|e| e.to_string())?;
    serde_json::to_value(stats).map_err(|e| e.to_string())
}
