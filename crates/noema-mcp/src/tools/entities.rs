//! `create_entities` / `delete_entities` tools (spec.md §4.9).

use std::sync::Arc;

use noema_core::{Core, Entity};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityInput {
    name: String,
    entity_type: String,
    #[serde(default)]
    observations: Vec<noema_core::ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct CreateEntitiesArgs {
    entities: Vec<EntityInput>,
}

pub fn create_entities_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["entities"],
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "entityType"],
                    "properties": {
                        "name": { "type": "string" },
                        "entityType": { "type": "string" },
                        "observations": {
                            "type": "array",
                            "items": { "type": "object" },
                            "default": []
                        }
                    }
                }
            }
        }
    })
}

pub async fn create_entities(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: CreateEntitiesArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let entities: Vec<Entity> = args
        .entities
        .into_iter()
        .map(|e| Entity::new(e.name, e.entity_type, e.observations))
        .collect();

    let (created, perf) = core.create_entities(entities).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "created": created, "perf": perf }))
}

#[derive(Debug, Deserialize)]
struct DeleteEntitiesArgs {
    names: Vec<String>,
}

pub fn delete_entities_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["names"],
        "properties": {
            "names": { "type": "array", "items": { "type": "string" } }
        }
    })
}

pub async fn delete_entities(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: DeleteEntitiesArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (deleted, perf) = core.delete_entities(args.names).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "deleted": deleted, "perf": perf }))
}
