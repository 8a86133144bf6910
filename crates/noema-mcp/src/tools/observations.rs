//! `add_observations` / `delete_observations` tools (spec.md §4.9).

use std::sync::Arc;

use noema_core::{Core, ContentBlock};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservationUpdate {
    entity_name: String,
    contents: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ObservationsArgs {
    updates: Vec<ObservationUpdate>,
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["updates"],
        "properties": {
            "updates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["entityName", "contents"],
                    "properties": {
                        "entityName": { "type": "string" },
                        "contents": { "type": "array", "items": { "type": "object" } }
                    }
                }
            }
        }
    })
}

fn to_pairs(args: ObservationsArgs) -> Vec<(String, Vec<ContentBlock>)> {
    args.updates.into_iter().map(|u| (u.entity_name, u.contents)).collect()
}

pub async fn add_observations(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: ObservationsArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (updated, perf) = core.add_observations(to_pairs(args)).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "updated": updated, "perf": perf }))
}

pub async fn delete_observations(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: ObservationsArgs = serde_json::from_value(args.unwrap_or(serde_json::json!({})))
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (updated, perf) = core.delete_observations(to_pairs(args)).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "updated": updated, "perf": perf }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::{Config, Entity};
    use tempfile::TempDir;

    fn test_core() -> (Arc<Core>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db_path = dir.path().join("test.db");
        (Arc::new(Core::open(config).unwrap()), dir)
    }

    #[tokio::test]
    async fn adds_then_removes_an_observation() {
        let (core, _dir) = test_core();
        core.create_entities(vec![Entity::new("note", "fact", vec![ContentBlock::Text { text: "a".into() }])]).unwrap();

        let args = serde_json::json!({
            "updates": [{ "entityName": "note", "contents": [{ "type": "text", "text": "b" }] }]
        });
        let result = add_observations(&core, Some(args.clone())).await.unwrap();
        assert_eq!(result["updated"].as_array().unwrap().len(), 1);

        let result = delete_observations(&core, Some(args)).await.unwrap();
        assert_eq!(result["updated"].as_array().unwrap().len(), 1);
    }
}
