//! Mutation engine (C7).
//!
//! Create/update/delete of entities, relations, and observations, with the
//! bulk fast paths described in spec.md §4.7. Every function here runs
//! under the facade's writer lock; none of them acquire it themselves.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::bloom::CountingBloomFilter;
use crate::breaker::{Admission, CircuitBreaker};
use crate::cache::BoundedCache;
use crate::codec;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::storage::{observations_to_text, row_to_entity, row_to_relation};
use crate::types::{merge_observations, remove_observations, ContentBlock, Entity, Relation};

use std::sync::Mutex;

/// Sub-batch size cap for entity bulk statements (§4.7: "≤ 5,000 rows per statement").
const ENTITY_PARAM_BATCH: usize = 5_000;
/// Sub-batch size cap for relation bulk statements (§4.7: "≤ 1,000 rows per sub-batch").
const RELATION_PARAM_BATCH: usize = 1_000;

/// Shared mutable state the mutation engine reconciles on every write path
/// (spec.md §4.7 "The bloom filter and caches are reconciled on every
/// mutation path").
pub struct SharedState<'a> {
    pub bloom: &'a Mutex<CountingBloomFilter>,
    pub entity_cache: &'a BoundedCache<Entity>,
    /// Clears the search-result cache. A plain `BoundedCache::clear()` is
    /// O(capacity) at worst but idempotent and cheap when the cache is
    /// already empty, which is what "coalesced across multiple fast-path
    /// calls in one tick" (§4.7) reduces to once nothing searched in
    /// between.
    pub clear_search_cache: &'a dyn Fn(),
    pub breaker: &'a CircuitBreaker,
}

impl<'a> SharedState<'a> {
    pub fn clear_search_cache(&self) {
        (self.clear_search_cache)();
    }
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// Insert-or-upsert a single entity row, returning whether the row was newly
/// inserted (vs. updated).
fn upsert_entity_row(conn: &rusqlite::Connection, entity: &Entity, config: &Config) -> CoreResult<bool> {
    let blob = codec::encode(&entity.observations, config.compression_enabled)
        .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
    let text = observations_to_text(&entity.observations);
    let now = now_str();

    let existed: bool = conn
        .query_row("SELECT 1 FROM entities WHERE name = ?1 COLLATE NOCASE", params![entity.name], |_| Ok(true))
        .optional()?
        .unwrap_or(false);

    conn.execute(
        "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at, access_count, prominence, decay_rate, importance)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0, 1.0, 0.05, 1.0)
         ON CONFLICT(name) DO UPDATE SET
             entity_type = excluded.entity_type,
             observations_blob = excluded.observations_blob,
             observations_text = excluded.observations_text,
             updated_at = excluded.updated_at",
        params![entity.name, entity.entity_type, blob, text, now],
    )?;

    Ok(!existed)
}

/// Create/upsert entities (§4.7). Dispatches on input size to the fast path,
/// the plain transactional path, or the circuit-breaker-guarded bulk path.
pub fn create_entities(
    conn: &mut rusqlite::Connection,
    entities: Vec<Entity>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    if entities.is_empty() {
        return Ok(Vec::new());
    }

    if entities.len() == 1 {
        return create_entities_fast_path(conn, entities, config, shared);
    }

    if entities.len() < config.bulk_threshold() {
        return create_entities_transactional(conn, entities, config, shared);
    }

    create_entities_bulk(conn, entities, config, shared)
}

/// Size == 1: try a plain insert first (no upsert) under a deferred
/// transaction; on a unique-constraint collision (case-insensitive name
/// match), restart under the upsert branch. Per spec.md §9, only the
/// upsert branch schedules a deferred search-cache clear.
fn create_entities_fast_path(
    conn: &mut rusqlite::Connection,
    mut entities: Vec<Entity>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    let entity = entities.pop().unwrap();
    let bloom_says_present = shared.bloom.lock().unwrap().contains(&entity.name);

    let tx = conn.transaction()?;
    let upserted = if !bloom_says_present {
        let blob = codec::encode(&entity.observations, config.compression_enabled)
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let text = observations_to_text(&entity.observations);
        let now = now_str();
        let insert_result = tx.execute(
            "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at, access_count, prominence, decay_rate, importance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0, 1.0, 0.05, 1.0)",
            params![entity.name, entity.entity_type, blob, text, now],
        );
        match insert_result {
            Ok(_) => false,
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                upsert_entity_row(&tx, &entity, config)?;
                true
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        upsert_entity_row(&tx, &entity, config)?;
        true
    };
    tx.commit()?;

    shared.bloom.lock().unwrap().add(&entity.name);
    let stored = get_entity_row(conn, &entity.name)?.expect("just written");
    shared.entity_cache.set(entity.name.to_lowercase(), stored.clone());
    if upserted {
        shared.clear_search_cache();
    }
    Ok(vec![stored])
}

/// 10 <= size < bulk-threshold: one upsert per row inside a single
/// transaction, bloom/cache updated within the transaction boundary.
fn create_entities_transactional(
    conn: &mut rusqlite::Connection,
    entities: Vec<Entity>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    let tx = conn.transaction()?;
    let mut out = Vec::with_capacity(entities.len());
    for entity in &entities {
        upsert_entity_row(&tx, entity, config)?;
        shared.bloom.lock().unwrap().add(&entity.name);
    }
    tx.commit()?;

    for entity in &entities {
        let stored = row_from_conn(conn, &entity.name)?;
        shared.entity_cache.set(entity.name.to_lowercase(), stored.clone());
        out.push(stored);
    }
    shared.clear_search_cache();
    Ok(out)
}

fn row_from_conn(conn: &rusqlite::Connection, name: &str) -> CoreResult<Entity> {
    get_entity_row(conn, name)?.ok_or_else(|| CoreError::EntityNotFound(name.to_string()))
}

/// size >= bulk-threshold: the circuit-breaker-guarded bulk path (§4.7).
fn create_entities_bulk(
    conn: &mut rusqlite::Connection,
    entities: Vec<Entity>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    match shared.breaker.admit() {
        Admission::Rejected => return Err(CoreError::ServiceTemporarilyUnavailable),
        Admission::Pass => {}
    }

    let result = (|| -> CoreResult<Vec<Entity>> {
        info!(count = entities.len(), "bulk create_entities");
        // 1. Pre-serialize all observations through the codec.
        let encoded: Vec<(String, String, Vec<u8>, String)> = entities
            .iter()
            .map(|e| -> CoreResult<_> {
                let blob = codec::encode(&e.observations, config.compression_enabled)
                    .map_err(|err| CoreError::InvalidInput(err.to_string()))?;
                let text = observations_to_text(&e.observations);
                Ok((e.name.clone(), e.entity_type.clone(), blob, text))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let tx = conn.transaction()?;

        // 2. Temporarily drop the FTS sync trigger.
        crate::storage::schema::drop_sync_triggers(&tx)?;

        // 3. Insert-or-ignore in sub-batches.
        let now = now_str();
        for chunk in encoded.chunks(ENTITY_PARAM_BATCH) {
            for (name, entity_type, blob, text) in chunk {
                tx.execute(
                    "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at, access_count, prominence, decay_rate, importance)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0, 1.0, 0.05, 1.0)
                     ON CONFLICT(name) DO UPDATE SET
                         entity_type = excluded.entity_type,
                         observations_blob = excluded.observations_blob,
                         observations_text = excluded.observations_text,
                         updated_at = excluded.updated_at",
                    params![name, entity_type, blob, text, now],
                )?;
            }
        }

        // 4/5. Recreate the trigger and request a full term-index rebuild
        // (the rows above never went through the per-row trigger).
        crate::storage::schema::recreate_triggers(&tx)?;
        crate::storage::schema::rebuild_term_index(&tx)?;

        tx.commit()?;
        Ok(Vec::new())
    })();

    match &result {
        Ok(_) => shared.breaker.record_success(),
        Err(CoreError::ServiceTemporarilyUnavailable) => {}
        Err(_) => shared.breaker.record_failure(),
    }
    result?;

    // 6. Update bloom and entity cache after commit; clear search cache.
    let mut out = Vec::with_capacity(entities.len());
    for entity in &entities {
        shared.bloom.lock().unwrap().add(&entity.name);
        let stored = row_from_conn(conn, &entity.name)?;
        shared.entity_cache.set(entity.name.to_lowercase(), stored.clone());
        out.push(stored);
    }
    shared.clear_search_cache();
    Ok(out)
}

fn get_entity_row(conn: &rusqlite::Connection, name: &str) -> CoreResult<Option<Entity>> {
    conn.query_row("SELECT * FROM entities WHERE name = ?1 COLLATE NOCASE", params![name], row_to_entity)
        .optional()
        .map_err(CoreError::from)
}

/// Create relations: insert-or-ignore within a transaction, normalized to
/// lowercase identity (§4.7). Returns `(created, skipped_duplicates)`.
pub fn create_relations(
    conn: &mut rusqlite::Connection,
    relations: Vec<Relation>,
    shared: &SharedState,
) -> CoreResult<(Vec<Relation>, usize)> {
    if relations.is_empty() {
        return Ok((Vec::new(), 0));
    }
    let now = now_str();
    let tx = conn.transaction()?;
    let mut created = Vec::new();
    let mut skipped = 0usize;

    for chunk in relations.chunks(RELATION_PARAM_BATCH) {
        for rel in chunk {
            let from = rel.from.to_lowercase();
            let to = rel.to.to_lowercase();
            let changed = tx.execute(
                "INSERT OR IGNORE INTO relations (\"from\", \"to\", relation_type, created_at, access_count, prominence)
                 VALUES (?1, ?2, ?3, ?4, 0, 1.0)",
                params![from, to, rel.relation_type, now],
            )?;
            if changed == 0 {
                skipped += 1;
            } else {
                created.push(Relation::new(from, to, rel.relation_type.clone()));
            }
        }
    }
    tx.commit()?;
    if !created.is_empty() {
        shared.clear_search_cache();
    }
    Ok((created, skipped))
}

/// Add observations to existing entities, merging with structural dedup
/// (§4.7, P5, L2). Unknown entity names are silently no-ops (§7 propagation
/// policy: not-found on add-observations is folded into a zero-effect
/// update, not raised).
pub fn add_observations(
    conn: &mut rusqlite::Connection,
    updates: Vec<(String, Vec<ContentBlock>)>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    if updates.is_empty() {
        return Ok(Vec::new());
    }

    // Pre-fetch all affected rows in one IN(...) query, building an
    // in-memory map, then update row by row within one transaction
    // (§4.7 "large update sets use a batch variant").
    let names: Vec<String> = updates.iter().map(|(n, _)| n.clone()).collect();
    let placeholders = names.iter().enumerate().map(|(i, _)| format!("?{}", i + 1)).collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM entities WHERE name COLLATE NOCASE IN ({placeholders})");
    let mut existing = std::collections::HashMap::new();
    {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(names.iter()), row_to_entity)?;
        for row in rows {
            let entity = row?;
            existing.insert(entity.name.to_lowercase(), entity);
        }
    }

    let tx = conn.transaction()?;
    let mut touched = Vec::new();
    for (name, incoming) in updates {
        let Some(mut entity) = existing.get(&name.to_lowercase()).cloned() else {
            continue;
        };
        merge_observations(&mut entity.observations, incoming);
        let blob = codec::encode(&entity.observations, config.compression_enabled)
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let text = observations_to_text(&entity.observations);
        let now = now_str();
        tx.execute(
            "UPDATE entities SET observations_blob = ?1, observations_text = ?2, updated_at = ?3 WHERE name = ?4 COLLATE NOCASE",
            params![blob, text, now, entity.name],
        )?;
        entity.updated_at = Utc::now();
        touched.push(entity);
    }
    tx.commit()?;

    for entity in &touched {
        shared.entity_cache.delete(&entity.name.to_lowercase());
    }
    if !touched.is_empty() {
        shared.clear_search_cache();
    }
    Ok(touched)
}

/// Delete observations structurally matching the given blocks (§4.7, L3).
pub fn delete_observations(
    conn: &mut rusqlite::Connection,
    deletions: Vec<(String, Vec<ContentBlock>)>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<Vec<Entity>> {
    if deletions.is_empty() {
        return Ok(Vec::new());
    }
    let tx = conn.transaction()?;
    let mut touched = Vec::new();
    for (name, to_remove) in deletions {
        let Some(mut entity) = tx
            .query_row("SELECT * FROM entities WHERE name = ?1 COLLATE NOCASE", params![name], row_to_entity)
            .optional()?
        else {
            continue;
        };
        remove_observations(&mut entity.observations, &to_remove);
        let blob = codec::encode(&entity.observations, config.compression_enabled)
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let text = observations_to_text(&entity.observations);
        let now = now_str();
        tx.execute(
            "UPDATE entities SET observations_blob = ?1, observations_text = ?2, updated_at = ?3 WHERE name = ?4 COLLATE NOCASE",
            params![blob, text, now, entity.name],
        )?;
        entity.updated_at = Utc::now();
        touched.push(entity);
    }
    tx.commit()?;

    for entity in &touched {
        shared.entity_cache.delete(&entity.name.to_lowercase());
    }
    if !touched.is_empty() {
        shared.clear_search_cache();
    }
    Ok(touched)
}

/// Delete entities; relations touching them cascade via the foreign keys
/// (P6). Small sets delete one-by-one; large sets mirror the bulk insert
/// path's trigger-drop trick.
pub fn delete_entities(
    conn: &mut rusqlite::Connection,
    names: Vec<String>,
    config: &Config,
    shared: &SharedState,
) -> CoreResult<usize> {
    if names.is_empty() {
        return Ok(0);
    }

    let deleted = if names.len() < config.bulk_threshold() {
        let tx = conn.transaction()?;
        let mut count = 0usize;
        for name in &names {
            count += tx.execute("DELETE FROM entities WHERE name = ?1 COLLATE NOCASE", params![name])?;
        }
        tx.commit()?;
        count
    } else {
        match shared.breaker.admit() {
            Admission::Rejected => return Err(CoreError::ServiceTemporarilyUnavailable),
            Admission::Pass => {}
        }
        let result = (|| -> CoreResult<usize> {
            let tx = conn.transaction()?;
            crate::storage::schema::drop_sync_triggers(&tx)?;
            let mut count = 0usize;
            for chunk in names.chunks(ENTITY_PARAM_BATCH) {
                for name in chunk {
                    count += tx.execute("DELETE FROM entities WHERE name = ?1 COLLATE NOCASE", params![name])?;
                }
            }
            crate::storage::schema::recreate_triggers(&tx)?;
            crate::storage::schema::rebuild_term_index(&tx)?;
            tx.commit()?;
            Ok(count)
        })();
        match &result {
            Ok(_) => shared.breaker.record_success(),
            Err(_) => shared.breaker.record_failure(),
        }
        result?
    };

    let mut bloom = shared.bloom.lock().unwrap();
    for name in &names {
        bloom.remove(name);
        shared.entity_cache.delete(&name.to_lowercase());
    }
    drop(bloom);
    shared.clear_search_cache();
    debug!(requested = names.len(), deleted, "delete_entities complete");
    Ok(deleted)
}

/// Delete relations by composite key, normalized to lowercase identity.
pub fn delete_relations(conn: &mut rusqlite::Connection, relations: Vec<Relation>, shared: &SharedState) -> CoreResult<usize> {
    if relations.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction()?;
    let mut count = 0usize;
    for rel in &relations {
        count += tx.execute(
            "DELETE FROM relations WHERE \"from\" = ?1 COLLATE NOCASE AND \"to\" = ?2 COLLATE NOCASE AND relation_type = ?3",
            params![rel.from.to_lowercase(), rel.to.to_lowercase(), rel.relation_type],
        )?;
    }
    tx.commit()?;
    if count > 0 {
        shared.clear_search_cache();
    }
    Ok(count)
}

pub fn get_relations_for(conn: &rusqlite::Connection, name: &str) -> CoreResult<Vec<Relation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM relations WHERE \"from\" = ?1 COLLATE NOCASE OR \"to\" = ?1 COLLATE NOCASE",
    )?;
    let rows = stmt.query_map(params![name], row_to_relation)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
