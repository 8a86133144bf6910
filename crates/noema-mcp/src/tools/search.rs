//! `search_nodes` tool (spec.md §4.6, §4.9).

use std::sync::Arc;

use noema_core::{Core, SearchRequest};

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": { "type": "string" },
            "limit": { "type": "integer", "default": 10, "minimum": 1 },
            "mode": { "type": "string", "enum": ["auto", "exact", "fuzzy"], "default": "auto" },
            "contentTypes": { "type": "array", "items": { "type": "string" } },
            "intent": { "type": "string", "enum": ["find", "browse", "explore", "verify"] },
            "context": {
                "type": "object",
                "properties": {
                    "currentEntities": { "type": "array", "items": { "type": "string" } },
                    "recentSearches": { "type": "array", "items": { "type": "string" } },
                    "userContext": { "type": "string" },
                    "conversationContext": { "type": "string" }
                }
            }
        }
    })
}

pub async fn execute(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let request: SearchRequest = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (result, perf) = core.search_nodes(request).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "entities": result.entities, "relations": result.relations, "perf": perf }))
}
