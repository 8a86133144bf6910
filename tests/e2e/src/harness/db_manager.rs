//! Test database manager
//!
//! Provides isolated [`noema_core::Core`] instances for tests: a temporary
//! database that is cleaned up automatically, plus seeding helpers for
//! common entity/relation shapes.

use std::path::PathBuf;

use noema_core::{CacheStrategy, Config, ContentBlock, Core, Entity, Relation};
use tempfile::TempDir;

/// Manager for an isolated test database.
///
/// Creates a fresh [`Core`] per test to prevent interference, and cleans up
/// the backing temp directory (database file + bloom sidecar) on drop.
pub struct TestDatabaseManager {
    pub core: Core,
    _temp_dir: Option<TempDir>,
    db_path: PathBuf,
}

impl TestDatabaseManager {
    /// Create a new test database in a temporary directory.
    pub fn new_temp() -> Self {
        Self::new_temp_with_strategy(CacheStrategy::Lru)
    }

    pub fn new_temp_with_strategy(strategy: CacheStrategy) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db_path = temp_dir.path().join("test_noema.db");
        let mut config = Config::default();
        config.db_path = db_path.clone();
        config.cache_strategy = strategy;

        let core = Core::open(config).expect("failed to open test core");

        Self { core, _temp_dir: Some(temp_dir), db_path }
    }

    /// Create a test database at a specific path (not cleaned up on drop).
    pub fn new_at_path(path: PathBuf) -> Self {
        let mut config = Config::default();
        config.db_path = path.clone();
        let core = Core::open(config).expect("failed to open test core");
        Self { core, _temp_dir: None, db_path: path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn is_empty(&self) -> bool {
        self.core.get_stats().map(|s| s.entity_count == 0).unwrap_or(true)
    }

    pub fn entity_count(&self) -> i64 {
        self.core.get_stats().map(|s| s.entity_count).unwrap_or(0)
    }

    /// Seed `count` plain entities, each with one text observation.
    pub fn seed_entities(&mut self, count: usize) -> Vec<String> {
        let entities: Vec<Entity> = (0..count)
            .map(|i| {
                Entity::new(
                    format!("entity-{i}"),
                    "fact",
                    vec![ContentBlock::Text { text: format!("test observation {i}") }],
                )
            })
            .collect();

        let (created, _perf) = self.core.create_entities(entities).expect("seed_entities failed");
        created.into_iter().map(|e| e.name).collect()
    }

    /// Seed entities across a spread of entity types.
    pub fn seed_diverse(&mut self, count_per_type: usize) -> Vec<String> {
        let types = ["fact", "concept", "procedure", "event", "code"];
        let mut entities = Vec::with_capacity(count_per_type * types.len());
        for entity_type in types {
            for i in 0..count_per_type {
                entities.push(Entity::new(
                    format!("{entity_type}-{i}"),
                    entity_type,
                    vec![ContentBlock::Text { text: format!("{entity_type} content {i}") }],
                ));
            }
        }
        let (created, _perf) = self.core.create_entities(entities).expect("seed_diverse failed");
        created.into_iter().map(|e| e.name).collect()
    }

    /// Seed a chain of entities connected by `knows` relations:
    /// `chain-0 -> chain-1 -> ... -> chain-{n-1}`.
    pub fn seed_chain(&mut self, n: usize) -> Vec<String> {
        let names: Vec<String> = (0..n).map(|i| format!("chain-{i}")).collect();
        let entities: Vec<Entity> = names.iter().map(|n| Entity::new(n.clone(), "node", vec![])).collect();
        self.core.create_entities(entities).expect("seed_chain entities failed");

        let relations: Vec<Relation> = names
            .windows(2)
            .map(|pair| Relation::new(pair[0].clone(), pair[1].clone(), "knows"))
            .collect();
        self.core.create_relations(relations).expect("seed_chain relations failed");

        names
    }

    /// Clear all data from the database.
    pub fn clear(&mut self) {
        if let Ok((result, _perf)) = self.core.read_graph(Some(100_000), None) {
            let names: Vec<String> = result.entities.into_iter().map(|e| e.name).collect();
            if !names.is_empty() {
                let _ = self.core.delete_entities(names);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_database_creation() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().exists() || !db.path().exists()); // lazily created by sqlite on first write
    }

    #[test]
    fn test_seed_entities() {
        let mut db = TestDatabaseManager::new_temp();
        let names = db.seed_entities(10);
        assert_eq!(names.len(), 10);
        assert_eq!(db.entity_count(), 10);
    }

    #[test]
    fn test_seed_diverse() {
        let mut db = TestDatabaseManager::new_temp();
        let names = db.seed_diverse(3);
        assert_eq!(names.len(), 15);
        assert_eq!(db.entity_count(), 15);
    }

    #[test]
    fn test_clear_database() {
        let mut db = TestDatabaseManager::new_temp();
        db.seed_entities(5);
        assert_eq!(db.entity_count(), 5);
        db.clear();
        assert!(db.is_empty());
    }

    #[test]
    fn test_seed_chain_links_entities() {
        let mut db = TestDatabaseManager::new_temp();
        let names = db.seed_chain(4);
        assert_eq!(names.len(), 4);
        let (path, _perf) = db.core.find_shortest_path(&names[0], &names[3], 5, None).unwrap();
        assert!(path.found);
        assert_eq!(path.distance, 3);
    }
}
