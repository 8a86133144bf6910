//! `create_relations` / `delete_relations` tools (spec.md §4.9).

use std::sync::Arc;

use noema_core::{Core, Relation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationInput {
    from: String,
    to: String,
    relation_type: String,
}

impl From<RelationInput> for Relation {
    fn from(r: RelationInput) -> Self {
        Relation::new(r.from, r.to, r.relation_type)
    }
}

#[derive(Debug, Deserialize)]
struct RelationsArgs {
    relations: Vec<RelationInput>,
}

pub fn create_relations_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["relations"],
        "properties": {
            "relations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["from", "to", "relationType"],
                    "properties": {
                        "from": { "type": "string" },
                        "to": { "type": "string" },
                        "relationType": { "type": "string" }
                    }
                }
            }
        }
    })
}

pub async fn create_relations(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: RelationsArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let relations: Vec<Relation> = args.relations.into_iter().map(Into::into).collect();

    let (created, skipped, perf) = core.create_relations(relations).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "created": created, "skipped": skipped, "perf": perf }))
}

pub fn delete_relations_schema() -> serde_json::Value {
    create_relations_schema()
}

pub async fn delete_relations(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: RelationsArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let relations: Vec<Relation> = args.relations.into_iter().map(Into::into).collect();

    let (deleted, perf) = core.delete_relations(relations).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "deleted": deleted, "perf": perf }))
}
