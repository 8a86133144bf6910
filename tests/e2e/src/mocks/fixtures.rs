//! Test data factory
//!
//! Utilities for generating entities/relations for integration tests:
//! single entities, batches, and small pre-built scenarios.

use std::collections::HashMap;

use noema_core::{ContentBlock, Core, Entity, Relation};

pub struct TestDataFactory;

/// Configuration for batch entity generation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub count: usize,
    pub entity_type: Option<String>,
    pub name_prefix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { count: 10, entity_type: None, name_prefix: "entity".to_string() }
    }
}

/// A small pre-built scenario: the entities it created plus labeled
/// metadata for test assertions (e.g. which name is the "hub" node).
#[derive(Debug)]
pub struct TestScenario {
    pub entity_names: Vec<String>,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

impl TestDataFactory {
    /// Create a single entity with one text observation.
    pub fn create_entity(core: &Core, name: &str, text: &str) -> Option<Entity> {
        let entity = Entity::new(name, "fact", vec![ContentBlock::Text { text: text.to_string() }]);
        core.create_entities(vec![entity]).ok()?.0.into_iter().next()
    }

    /// Create an entity of a specific type with multiple observations.
    pub fn create_entity_full(core: &Core, name: &str, entity_type: &str, observations: Vec<ContentBlock>) -> Option<Entity> {
        let entity = Entity::new(name, entity_type, observations);
        core.create_entities(vec![entity]).ok()?.0.into_iter().next()
    }

    /// Create a batch of entities cycling across five entity types.
    pub fn create_batch(core: &Core, count: usize) -> Vec<String> {
        Self::create_batch_with_config(core, BatchConfig { count, ..Default::default() })
    }

    pub fn create_batch_with_config(core: &Core, config: BatchConfig) -> Vec<String> {
        let entity_types = ["fact", "concept", "procedure", "event", "code"];
        let entities: Vec<Entity> = (0..config.count)
            .map(|i| {
                let entity_type = config
                    .entity_type
                    .clone()
                    .unwrap_or_else(|| entity_types[i % entity_types.len()].to_string());
                Entity::new(
                    format!("{}-{i}", config.name_prefix),
                    entity_type,
                    vec![ContentBlock::Text { text: format!("{} content {i}", config.name_prefix) }],
                )
            })
            .collect();

        core.create_entities(entities)
            .map(|(created, _perf)| created.into_iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    /// A hub-and-spoke scenario: one "hub" entity related to `spokes` others,
    /// used by neighbor-expansion and ranking tests.
    pub fn create_hub_scenario(core: &Core, spokes: usize) -> TestScenario {
        let mut entities = vec![Entity::new("hub", "concept", vec![ContentBlock::Text { text: "central reference point".into() }])];
        let spoke_names: Vec<String> = (0..spokes).map(|i| format!("spoke-{i}")).collect();
        for name in &spoke_names {
            entities.push(Entity::new(name.clone(), "fact", vec![ContentBlock::Text { text: format!("detail about {name}") }]));
        }
        core.create_entities(entities).expect("hub scenario entities failed");

        let relations: Vec<Relation> = spoke_names.iter().map(|s| Relation::new("hub", s.clone(), "relates_to")).collect();
        core.create_relations(relations).expect("hub scenario relations failed");

        let mut metadata = HashMap::new();
        metadata.insert("hub".to_string(), "hub".to_string());

        let mut entity_names = vec!["hub".to_string()];
        entity_names.extend(spoke_names);

        TestScenario {
            entity_names,
            description: "hub entity connected to N spokes via relates_to".to_string(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::db_manager::TestDatabaseManager;

    #[test]
    fn creates_a_single_entity() {
        let db = TestDatabaseManager::new_temp();
        let entity = TestDataFactory::create_entity(&db.core, "alice", "climbs mountains");
        assert!(entity.is_some());
    }

    #[test]
    fn creates_a_batch_across_types() {
        let db = TestDatabaseManager::new_temp();
        let names = TestDataFactory::create_batch(&db.core, 20);
        assert_eq!(names.len(), 20);
    }

    #[test]
    fn hub_scenario_links_every_spoke() {
        let db = TestDatabaseManager::new_temp();
        let scenario = TestDataFactory::create_hub_scenario(&db.core, 5);
        assert_eq!(scenario.entity_names.len(), 6);

        let (neighbors, _perf) = db.core.get_neighbors("hub", noema_core::Direction::Both, None, 1, false).unwrap();
        assert_eq!(neighbors.entities.len(), 5);
    }
}
