//! Black-box checks of the quantified invariants and round-trip laws: name
//! uniqueness, bloom superset, cache coherence, observation dedup, cascade
//! delete, relation uniqueness, and backup persistence.

use noema_core::{CacheStrategy, ContentBlock, Direction, Entity, Relation};
use noema_e2e::harness::db_manager::TestDatabaseManager;

/// P1: entity names are unique case-insensitively.
#[test]
fn name_uniqueness_survives_case_variant_inserts() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("Alice", "person", vec![])]).unwrap();
    db.core.create_entities(vec![Entity::new("ALICE", "person", vec![ContentBlock::Text { text: "second".into() }])]).unwrap();

    let (result, _perf) = db.core.read_graph(None, None).unwrap();
    let alices: Vec<_> = result.entities.iter().filter(|e| e.name.eq_ignore_ascii_case("alice")).collect();
    assert_eq!(alices.len(), 1);
}

/// P3: every committed entity name is a bloom filter member.
#[test]
fn every_entity_name_is_a_bloom_member() {
    let mut db = TestDatabaseManager::new_temp();
    let names = db.seed_entities(50);
    let report = db.core.check_consistency().unwrap();
    assert_eq!(report.bloom_missing_names.len(), 0, "names: {:?}", names.len());
}

/// P4: a cached search result does not survive a mutation that changes it.
#[test]
fn search_cache_invalidates_on_mutation() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("Alice", "person", vec![ContentBlock::Text { text: "loves climbing".into() }])]).unwrap();

    let (first, _) = db.core.search_nodes(noema_core::SearchRequest {
        query: "climbing".into(),
        limit: 10,
        context: None,
        mode: noema_core::SearchMode::Auto,
        content_types: None,
        intent: None,
    }).unwrap();
    assert_eq!(first.entities.len(), 1);

    db.core.delete_entities(vec!["Alice".to_string()]).unwrap();

    let (second, _) = db.core.search_nodes(noema_core::SearchRequest {
        query: "climbing".into(),
        limit: 10,
        context: None,
        mode: noema_core::SearchMode::Auto,
        content_types: None,
        intent: None,
    }).unwrap();
    assert!(second.entities.is_empty());
}

/// P5: duplicate structural observations never accumulate.
#[test]
fn observation_dedup_holds_across_repeated_adds() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("Note", "fact", vec![ContentBlock::Text { text: "a".into() }])]).unwrap();

    for _ in 0..3 {
        db.core.add_observations(vec![("Note".to_string(), vec![ContentBlock::Text { text: "b".into() }])]).unwrap();
    }

    let (result, _) = db.core.open_nodes(vec!["Note".to_string()]).unwrap();
    let note = &result.entities[0];
    assert_eq!(note.observations.len(), 2);
}

/// P6: deleting an entity removes every relation touching it.
#[test]
fn delete_entity_cascades_to_its_relations() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("X", "t", vec![]), Entity::new("Y", "t", vec![])]).unwrap();
    db.core.create_relations(vec![Relation::new("X", "Y", "knows")]).unwrap();

    db.core.delete_entities(vec!["X".to_string()]).unwrap();

    let (result, _) = db.core.read_graph(None, None).unwrap();
    assert!(result.entities.iter().any(|e| e.name == "Y"));
    assert!(result.relations.is_empty());
}

/// P7: a smaller search limit returns a prefix of the larger-limit result.
#[test]
fn search_result_is_monotone_on_limit() {
    let db = TestDatabaseManager::new_temp();
    for i in 0..20 {
        db.core.create_entities(vec![Entity::new(
            format!("match-{i}"),
            "fact",
            vec![ContentBlock::Text { text: "shared keyword".into() }],
        )]).unwrap();
    }

    let small = noema_core::SearchRequest { query: "keyword".into(), limit: 5, context: None, mode: noema_core::SearchMode::Auto, content_types: None, intent: None };
    let large = noema_core::SearchRequest { query: "keyword".into(), limit: 20, context: None, mode: noema_core::SearchMode::Auto, content_types: None, intent: None };

    let (small_result, _) = db.core.search_nodes(small).unwrap();
    let (large_result, _) = db.core.search_nodes(large).unwrap();

    let small_names: Vec<&str> = small_result.entities.iter().map(|e| e.entity.name.as_str()).collect();
    let large_prefix: Vec<&str> = large_result.entities.iter().take(small_names.len()).map(|e| e.entity.name.as_str()).collect();
    assert_eq!(small_names, large_prefix);
}

/// P8 / L4: re-creating the same relation is a no-op that reports a skip.
#[test]
fn relation_create_is_idempotent() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("a", "t", vec![]), Entity::new("b", "t", vec![])]).unwrap();

    let (created, skipped, _) = db.core.create_relations(vec![Relation::new("a", "b", "knows")]).unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(skipped, 0);

    let (created_again, skipped_again, _) = db.core.create_relations(vec![Relation::new("a", "b", "knows")]).unwrap();
    assert_eq!(created_again.len(), 0);
    assert_eq!(skipped_again, 1);
}

/// P9: stats match between the live store and a fresh open of its backup.
#[test]
fn backup_preserves_stats() {
    let mut db = TestDatabaseManager::new_temp_with_strategy(CacheStrategy::Lru);
    db.seed_diverse(4);
    let before = db.core.get_stats().unwrap();

    let target = db.path().with_file_name("backup.db");
    db.core.backup(&target).unwrap();

    let mut restored_config = noema_core::Config::default();
    restored_config.db_path = target;
    let restored = noema_core::Core::open(restored_config).unwrap();
    let after = restored.get_stats().unwrap();

    assert_eq!(before.entity_count, after.entity_count);
    assert_eq!(before.relation_count, after.relation_count);
}

/// L2: applying the same observation twice is the same as applying it once.
#[test]
fn add_observations_is_idempotent() {
    let db = TestDatabaseManager::new_temp();
    db.core.create_entities(vec![Entity::new("note", "fact", vec![])]).unwrap();

    db.core.add_observations(vec![("note".to_string(), vec![ContentBlock::Text { text: "x".into() }])]).unwrap();
    db.core.add_observations(vec![("note".to_string(), vec![ContentBlock::Text { text: "x".into() }])]).unwrap();

    let (result, _) = db.core.open_nodes(vec!["note".to_string()]).unwrap();
    assert_eq!(result.entities[0].observations.len(), 1);
}

/// Neighbor expansion respects depth and returns no entities beyond it.
#[test]
fn neighbor_expansion_respects_depth_bound() {
    let mut db = TestDatabaseManager::new_temp();
    let names = db.seed_chain(5);

    let (depth_1, _) = db.core.get_neighbors(&names[0], Direction::Outgoing, None, 1, false).unwrap();
    assert_eq!(depth_1.entities.len(), 1);

    let (depth_4, _) = db.core.get_neighbors(&names[0], Direction::Outgoing, None, 4, false).unwrap();
    assert_eq!(depth_4.entities.len(), 4);
}

/// P2: the term index holds exactly one row per entity row, tracked through
/// inserts, observation updates, and deletes.
#[test]
fn term_index_tracks_entities_through_mutations() {
    let mut db = TestDatabaseManager::new_temp();
    db.seed_diverse(5);
    let report = db.core.check_consistency().unwrap();
    assert!(report.term_index_in_sync);
    assert_eq!(report.entity_count, report.term_index_count);

    db.core.add_observations(vec![("fact-0".to_string(), vec![ContentBlock::Text { text: "more detail".into() }])]).unwrap();
    let report = db.core.check_consistency().unwrap();
    assert!(report.term_index_in_sync);
    assert_eq!(report.entity_count, report.term_index_count);

    db.core.delete_entities(vec!["fact-0".to_string()]).unwrap();
    let report = db.core.check_consistency().unwrap();
    assert!(report.term_index_in_sync);
    assert_eq!(report.entity_count, report.term_index_count);
}
