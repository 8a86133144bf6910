//! `read_graph`, `open_nodes`, `get_neighbors`, `find_shortest_path` tools
//! (spec.md §4.9, §4.10).

use std::sync::Arc;

use noema_core::{Core, Direction};
use serde::Deserialize;

// ---- read_graph ----

#[derive(Debug, Default, Deserialize)]
struct ReadGraphArgs {
    limit: Option<usize>,
    offset: Option<usize>,
}

pub fn read_graph_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "limit": { "type": "integer", "minimum": 1 },
            "offset": { "type": "integer", "minimum": 0 }
        }
    })
}

pub async fn read_graph(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: ReadGraphArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid arguments: {e}"))?,
        None => ReadGraphArgs::default(),
    };
    let (result, perf) = core.read_graph(args.limit, args.offset).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "result": result, "perf": perf }))
}

// ---- open_nodes ----

#[derive(Debug, Deserialize)]
struct OpenNodesArgs {
    names: Vec<String>,
}

pub fn open_nodes_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["names"],
        "properties": { "names": { "type": "array", "items": { "type": "string" } } }
    })
}

pub async fn open_nodes(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: OpenNodesArgs = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (result, perf) = core.open_nodes(args.names).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "result": result, "perf": perf }))
}

// ---- get_neighbors ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NeighborsArgs {
    name: String,
    #[serde(default)]
    direction: Direction,
    relation_type: Option<String>,
    depth: usize,
    #[serde(default)]
    include_relations: bool,
}

pub fn get_neighbors_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["name", "depth"],
        "properties": {
            "name": { "type": "string" },
            "direction": { "type": "string", "enum": ["outgoing", "incoming", "both"], "default": "both" },
            "relationType": { "type": "string" },
            "depth": { "type": "integer", "minimum": 1, "maximum": 5 },
            "includeRelations": { "type": "boolean", "default": false }
        }
    })
}

pub async fn get_neighbors(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: NeighborsArgs = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (result, perf) = core
        .get_neighbors(&args.name, args.direction, args.relation_type.as_deref(), args.depth, args.include_relations)
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "result": result, "perf": perf }))
}

// ---- find_shortest_path ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortestPathArgs {
    from: String,
    to: String,
    max_depth: usize,
    relation_type: Option<String>,
}

pub fn find_shortest_path_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["from", "to", "maxDepth"],
        "properties": {
            "from": { "type": "string" },
            "to": { "type": "string" },
            "maxDepth": { "type": "integer", "minimum": 1, "maximum": 10 },
            "relationType": { "type": "string" }
        }
    })
}

pub async fn find_shortest_path(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: ShortestPathArgs = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;
    let (result, perf) = core
        .find_shortest_path(&args.from, &args.to, args.max_depth, args.relation_type.as_deref())
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "result": result, "perf": perf }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::{Config, Entity, Relation};
    use tempfile::TempDir;

    fn test_core() -> (Arc<Core>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db_path = dir.path().join("test.db");
        (Arc::new(Core::open(config).unwrap()), dir)
    }

    #[tokio::test]
    async fn read_graph_returns_created_entities() {
        let (core, _dir) = test_core();
        core.create_entities(vec![Entity::new("x", "t", vec![])]).unwrap();
        let result = read_graph(&core, None).await.unwrap();
        assert_eq!(result["result"]["entities"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shortest_path_finds_a_route() {
        let (core, _dir) = test_core();
        core.create_entities(vec![Entity::new("a", "t", vec![]), Entity::new("b", "t", vec![]), Entity::new("c", "t", vec![])]).unwrap();
        core.create_relations(vec![Relation::new("a", "b", "knows"), Relation::new("b", "c", "knows")]).unwrap();

        let args = serde_json::json!({ "from": "a", "to": "c", "maxDepth": 4 });
        let result = find_shortest_path(&core, Some(args)).await.unwrap();
        assert_eq!(result["result"]["found"], true);
        assert_eq!(result["result"]["distance"], 2);
    }
}
