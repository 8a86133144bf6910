//! Core facade (C9).
//!
//! The single operation surface consumed by external collaborators (spec.md
//! §4.9). Owns the writer handle exclusively, shares the read pool and the
//! bloom/cache/breaker trio across every operation, and wraps each call's
//! elapsed time into a [`PerfRecord`] (§6).

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::bloom::{BloomStats, CountingBloomFilter};
use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::cache::{BoundedCache, CacheStats};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::maintenance::{self, ConsistencyReport};
use crate::mutation::{self, SharedState};
use crate::neighbors;
use crate::search::{self, SearchCacheValue};
use crate::storage::{self, pool::{ReadPool, WriterHandle, WriterPool}, row_to_entity};
use crate::transaction::{self, ManualTransaction};
use crate::types::{
    ContentBlock, Direction, Entity, GraphResult, PathResult, PerfRecord, Relation, SearchGraphResult,
    SearchRequest,
};

const DEFAULT_POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of engine-wide statistics (§4.9 `get_stats`, SPEC_FULL §2).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub entity_count: i64,
    pub relation_count: i64,
    pub entities_by_type: Vec<(String, i64)>,
    pub entity_cache: CacheStatsView,
    pub search_cache: CacheStatsView,
    pub bloom: BloomStatsView,
    pub breaker: BreakerStats,
    pub read_pool_idle: usize,
    pub read_pool_outstanding: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsView {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

impl From<CacheStats> for CacheStatsView {
    fn from(s: CacheStats) -> Self {
        Self { hits: s.hits, misses: s.misses, evictions: s.evictions, len: s.len, capacity: s.capacity }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomStatsView {
    pub num_bits: usize,
    pub num_hashes: u32,
    pub load: f64,
    pub saturated: usize,
}

impl From<BloomStats> for BloomStatsView {
    fn from(s: BloomStats) -> Self {
        Self { num_bits: s.num_bits, num_hashes: s.num_hashes, load: s.load, saturated: s.saturated }
    }
}

/// The single-context storage engine (spec.md §1: "the single-context
/// storage engine"). Exclusively owns the writer handle; the read pool and
/// the cache/bloom/breaker trio are shared across every facade call, per
/// spec.md §9 "Global state".
pub struct Core {
    config: Config,
    writer: std::sync::Arc<WriterPool>,
    pool: std::sync::Arc<ReadPool>,
    entity_cache: BoundedCache<Entity>,
    search_cache: BoundedCache<SearchCacheValue>,
    bloom: Mutex<CountingBloomFilter>,
    breaker: CircuitBreaker,
    manual_tx: ManualTransaction,
    bloom_path: std::path::PathBuf,
}

fn timed<T>(f: impl FnOnce() -> CoreResult<T>, count: impl Fn(&T) -> usize) -> CoreResult<(T, PerfRecord)> {
    let start = Instant::now();
    let value = f()?;
    let duration_ms = start.elapsed().as_millis() as u64;
    let counts = count(&value);
    Ok((value, PerfRecord::new(duration_ms, counts)))
}

fn bloom_sidecar_path(db_path: &Path) -> std::path::PathBuf {
    let mut p = db_path.as_os_str().to_owned();
    p.push(".cbloom");
    std::path::PathBuf::from(p)
}

impl Core {
    /// Open (or create) the store at `config.db_path`: apply pragmas and run
    /// migrations on the writer handle, construct the read pool, and load
    /// the bloom sidecar (rebuilding from the entities table on any failure
    /// to load — §4.1, §6, §7 crash recovery).
    pub fn open(config: Config) -> CoreResult<Self> {
        let conn = storage::open_writer(&config)?;
        let pool = ReadPool::new(&config.db_path, &config)?;
        let bloom_path = bloom_sidecar_path(&config.db_path);

        let loaded = CountingBloomFilter::load(&bloom_path);
        let load_failed = loaded.is_none();
        let mut bloom = loaded.unwrap_or_else(|| CountingBloomFilter::new(config.expected_items, config.false_positive_rate));
        if load_failed {
            // Sidecar missing or corrupt: re-derive membership from the
            // committed entities table rather than start empty (§4.1, §6).
            rebuild_bloom_from_db(&conn, &mut bloom)?;
        }

        Ok(Self {
            entity_cache: BoundedCache::new(config.cache_strategy, config.entity_cache_size),
            search_cache: BoundedCache::new(config.cache_strategy, config.search_cache_size),
            breaker: CircuitBreaker::new(config.breaker.clone()),
            manual_tx: ManualTransaction::new(),
            bloom: Mutex::new(bloom),
            writer: WriterPool::new(conn),
            pool,
            bloom_path,
            config,
        })
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The database file path this engine was opened against.
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    fn shared(&self) -> SharedState<'_> {
        SharedState {
            bloom: &self.bloom,
            entity_cache: &self.entity_cache,
            clear_search_cache: &|| self.search_cache.clear(),
            breaker: &self.breaker,
        }
    }

    fn writer(&self) -> WriterHandle {
        self.writer.checkout()
    }

    // ---- Mutation surface (C7) ----

    pub fn create_entities(&self, entities: Vec<Entity>) -> CoreResult<(Vec<Entity>, PerfRecord)> {
        let shared = self.shared();
        timed(|| mutation::create_entities(&mut self.writer(), entities, &self.config, &shared), |v| v.len())
    }

    /// Returns `(created, skipped_duplicate_count, perf)` per §4.9 (create
    /// skips duplicates rather than erroring, §7 propagation policy).
    pub fn create_relations(&self, relations: Vec<Relation>) -> CoreResult<(Vec<Relation>, usize, PerfRecord)> {
        let shared = self.shared();
        let (result, perf) =
            timed(|| mutation::create_relations(&mut self.writer(), relations, &shared), |(created, _)| created.len())?;
        let (created, skipped) = result;
        Ok((created, skipped, perf))
    }

    pub fn add_observations(&self, updates: Vec<(String, Vec<ContentBlock>)>) -> CoreResult<(Vec<Entity>, PerfRecord)> {
        let shared = self.shared();
        timed(|| mutation::add_observations(&mut self.writer(), updates, &self.config, &shared), |v| v.len())
    }

    pub fn delete_observations(&self, deletions: Vec<(String, Vec<ContentBlock>)>) -> CoreResult<(Vec<Entity>, PerfRecord)> {
        let shared = self.shared();
        timed(|| mutation::delete_observations(&mut self.writer(), deletions, &self.config, &shared), |v| v.len())
    }

    pub fn delete_entities(&self, names: Vec<String>) -> CoreResult<(usize, PerfRecord)> {
        let shared = self.shared();
        timed(|| mutation::delete_entities(&mut self.writer(), names, &self.config, &shared), |n| *n)
    }

    pub fn delete_relations(&self, relations: Vec<Relation>) -> CoreResult<(usize, PerfRecord)> {
        let shared = self.shared();
        timed(|| mutation::delete_relations(&mut self.writer(), relations, &shared), |n| *n)
    }

    // ---- Read surface (C6, C9) ----

    /// `search_nodes` (§4.9, §4.6). Goes through the read pool; a cache hit
    /// never touches the pool at all.
    pub fn search_nodes(&self, request: SearchRequest) -> CoreResult<(SearchGraphResult, PerfRecord)> {
        timed(
            || {
                let key = search::fingerprint(&request.query, request.limit, request.context.as_ref(), request.mode);
                if let Some(hit) = self.search_cache.get(&key) {
                    return Ok(hit);
                }
                let conn = self.pool.acquire(&self.config, DEFAULT_POOL_ACQUIRE_TIMEOUT)?;
                search::search(&conn, || self.writer(), &request, &self.config, &self.entity_cache, &self.search_cache)
            },
            |r| r.entities.len(),
        )
    }

    /// `read_graph(limit?, offset?)` (§4.9): a plain paginated dump of all
    /// entities plus the relations among the page returned.
    pub fn read_graph(&self, limit: Option<usize>, offset: Option<usize>) -> CoreResult<(GraphResult, PerfRecord)> {
        timed(
            || {
                let limit = limit.unwrap_or(100);
                let offset = offset.unwrap_or(0);
                let conn = self.pool.acquire(&self.config, DEFAULT_POOL_ACQUIRE_TIMEOUT)?;
                let total_count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
                let mut stmt = conn.prepare("SELECT * FROM entities ORDER BY name LIMIT ?1 OFFSET ?2")?;
                let rows = stmt.query_map(rusqlite::params![limit as i64, offset as i64], row_to_entity)?;
                let mut entities = Vec::new();
                for row in rows {
                    entities.push(row?);
                }
                let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
                let relations = storage::relations_touching(&conn, || self.writer(), &names, self.config.relation_query_threshold)?;
                let next_offset = if offset + entities.len() < total_count as usize { Some(offset + entities.len()) } else { None };
                Ok(GraphResult { entities, relations, total_count: Some(total_count as usize), next_offset })
            },
            |r| r.entities.len(),
        )
    }

    /// `open_nodes` (§4.9): only existing names are returned, silently
    /// dropping unknowns (§7 propagation policy).
    pub fn open_nodes(&self, names: Vec<String>) -> CoreResult<(GraphResult, PerfRecord)> {
        timed(
            || {
                if names.is_empty() {
                    return Ok(GraphResult::default());
                }
                let conn = self.pool.acquire(&self.config, DEFAULT_POOL_ACQUIRE_TIMEOUT)?;
                let placeholders = names.iter().enumerate().map(|(i, _)| format!("?{}", i + 1)).collect::<Vec<_>>().join(",");
                let sql = format!("SELECT * FROM entities WHERE name COLLATE NOCASE IN ({placeholders})");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(names.iter()), row_to_entity)?;
                let mut entities = Vec::new();
                for row in rows {
                    entities.push(row?);
                }
                let found_names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
                let relations = storage::relations_touching(&conn, || self.writer(), &found_names, self.config.relation_query_threshold)?;
                Ok(GraphResult { entities, relations, total_count: None, next_offset: None })
            },
            |r| r.entities.len(),
        )
    }

    /// `get_neighbors` (§4.10, §4.9).
    pub fn get_neighbors(
        &self,
        name: &str,
        direction: Direction,
        relation_type: Option<&str>,
        depth: usize,
        include_relations: bool,
    ) -> CoreResult<(GraphResult, PerfRecord)> {
        timed(
            || {
                let conn = self.pool.acquire(&self.config, DEFAULT_POOL_ACQUIRE_TIMEOUT)?;
                neighbors::get_neighbors(&conn, name, direction, relation_type, depth, include_relations)
            },
            |r| r.entities.len(),
        )
    }

    /// `find_shortest_path` (§4.10, §4.9).
    pub fn find_shortest_path(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
        relation_type: Option<&str>,
    ) -> CoreResult<(PathResult, PerfRecord)> {
        timed(
            || {
                let conn = self.pool.acquire(&self.config, DEFAULT_POOL_ACQUIRE_TIMEOUT)?;
                neighbors::find_shortest_path(&conn, from, to, max_depth, relation_type)
            },
            |r| r.nodes_explored,
        )
    }

    /// `get_stats` (§4.9).
    pub fn get_stats(&self) -> CoreResult<Stats> {
        let conn = self.writer();
        let entity_count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
        let relation_count: i64 = conn.query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))?;
        let mut stmt = conn.prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type ORDER BY entity_type")?;
        let entities_by_type = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let (idle, outstanding) = self.pool.stats();

        Ok(Stats {
            entity_count,
            relation_count,
            entities_by_type,
            entity_cache: self.entity_cache.stats().into(),
            search_cache: self.search_cache.stats().into(),
            bloom: self.bloom.lock().unwrap().stats().into(),
            breaker: self.breaker.stats(),
            read_pool_idle: idle,
            read_pool_outstanding: outstanding,
        })
    }

    // ---- Transactions (C8) ----

    /// Run `f` inside one atomic closure-scoped transaction. Per spec.md §9,
    /// this path does *not* clear caches itself — callers composing raw
    /// mutation helpers through it are responsible for their own
    /// invalidation, same as the mutation engine (C7) does internally.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.writer();
        transaction::with_transaction(&mut conn, f)
    }

    /// Manual transaction begin. Unlike the closure-scoped path, manual
    /// commit/rollback clear both caches wholesale because the set of
    /// touched keys is opaque to the facade once control returns to the
    /// caller between begin and commit.
    ///
    /// Checks out the writer up front and stashes it in `manual_tx` so it
    /// stays held — not released and re-acquired — until the matching
    /// commit/rollback, which is what actually serializes this transaction
    /// against concurrent writers instead of merely flagging its presence.
    pub fn begin_transaction(&self) -> CoreResult<()> {
        if self.manual_tx.is_active() {
            return Err(CoreError::TransactionAlreadyActive);
        }
        let mut handle = self.writer();
        handle.execute_batch("BEGIN DEFERRED")?;
        self.manual_tx.begin(handle)?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> CoreResult<()> {
        let mut handle = self.manual_tx.end()?;
        handle.execute_batch("COMMIT")?;
        drop(handle);
        self.entity_cache.clear();
        self.search_cache.clear();
        Ok(())
    }

    pub fn rollback_transaction(&self) -> CoreResult<()> {
        let mut handle = self.manual_tx.end()?;
        handle.execute_batch("ROLLBACK")?;
        drop(handle);
        self.entity_cache.clear();
        self.search_cache.clear();
        Ok(())
    }

    // ---- Durability (C8) ----

    /// Checkpoint the WAL into the main file, then copy both the database
    /// file and the bloom sidecar atomically (§4.8, §6).
    pub fn backup(&self, target: &Path) -> CoreResult<()> {
        let conn = self.writer();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
            .map_err(|e| CoreError::BackupFailed(e.to_string()))?;
        self.bloom.lock().unwrap().save(&self.bloom_path).map_err(|e| CoreError::BackupFailed(e.to_string()))?;

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::BackupFailed(e.to_string()))?;
            }
        }
        let tmp = target.with_extension("tmp");
        std::fs::copy(&self.config.db_path, &tmp).map_err(|e| CoreError::BackupFailed(e.to_string()))?;
        std::fs::rename(&tmp, target).map_err(|e| CoreError::BackupFailed(e.to_string()))?;

        let target_bloom = bloom_sidecar_path(target);
        std::fs::copy(&self.bloom_path, &target_bloom).map_err(|e| CoreError::BackupFailed(e.to_string()))?;
        info!(target = %target.display(), "backup complete");
        Ok(())
    }

    // ---- Maintenance (C10) ----

    pub fn rebuild_bloom(&self) -> CoreResult<()> {
        maintenance::rebuild_bloom(&self.writer(), &self.bloom)
    }

    pub fn rebuild_term_index(&self) -> CoreResult<()> {
        maintenance::rebuild_term_index(&self.writer())
    }

    /// User-initiated integrity routine (§7): scans `entities` vs the term
    /// index and the bloom filter, reporting discrepancies.
    pub fn check_consistency(&self) -> CoreResult<ConsistencyReport> {
        maintenance::check_consistency(&self.writer(), &self.bloom)
    }

    /// Optional prominence-decay hook (§4.7 "Memory aging"). No-op unless
    /// `config.aging.enabled`.
    pub fn run_aging_pass(&self) -> CoreResult<usize> {
        if !self.config.aging.enabled {
            return Ok(0);
        }
        maintenance::run_aging_pass(&self.writer(), &self.config)
    }

    /// Persist the bloom sidecar. Called on clean shutdown (§4.1: "written
    /// on close and after successful backups").
    pub fn close(&self) -> CoreResult<()> {
        self.bloom
            .lock()
            .unwrap()
            .save(&self.bloom_path)
            .map_err(|e| CoreError::Storage(crate::error::StorageError::Io(e)))?;
        Ok(())
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to persist bloom sidecar on drop");
        }
    }
}

fn rebuild_bloom_from_db(conn: &Connection, bloom: &mut CountingBloomFilter) -> CoreResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM entities")?;
    let names: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
    bloom.rebuild_from(names.iter().map(|s| s.as_str()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, SearchRequest};

    fn test_core() -> (tempfile::TempDir, Core) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db_path = dir.path().join("graph.db");
        config.read_pool_size = 2;
        let core = Core::open(config).unwrap();
        (dir, core)
    }

    #[test]
    fn insert_and_search_scenario() {
        let (_dir, core) = test_core();
        core.create_entities(vec![Entity::new("Alice", "person", vec![ContentBlock::Text { text: "loves climbing".into() }])]).unwrap();
        let (result, _) = core.search_nodes(SearchRequest { query: "climb".into(), limit: 10, context: None, mode: Default::default(), content_types: None, intent: None }).unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity.name, "Alice");
        assert!(result.relations.is_empty());
    }

    #[test]
    fn dedup_on_add_scenario() {
        let (_dir, core) = test_core();
        core.create_entities(vec![Entity::new(
            "Note",
            "note",
            vec![ContentBlock::Text { text: "a".into() }, ContentBlock::Text { text: "b".into() }],
        )]).unwrap();
        core.add_observations(vec![(
            "Note".into(),
            vec![ContentBlock::Text { text: "b".into() }, ContentBlock::Text { text: "c".into() }],
        )]).unwrap();
        let (graph, _) = core.open_nodes(vec!["Note".into()]).unwrap();
        let texts: Vec<_> = graph.entities[0]
            .observations
            .iter()
            .map(|o| match o { ContentBlock::Text { text } => text.clone(), _ => unreachable!() })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn cascade_on_delete_scenario() {
        let (_dir, core) = test_core();
        core.create_entities(vec![Entity::new("X", "t", vec![]), Entity::new("Y", "t", vec![])]).unwrap();
        core.create_relations(vec![Relation::new("X", "Y", "knows")]).unwrap();
        core.delete_entities(vec!["X".into()]).unwrap();
        let (graph, _) = core.read_graph(None, None).unwrap();
        assert_eq!(graph.entities.len(), 1);
        assert_eq!(graph.entities[0].name, "y");
        assert!(graph.relations.is_empty());
    }

    #[test]
    fn fallback_search_scenario() {
        let (_dir, core) = test_core();
        core.create_entities(vec![Entity::new("Weird", "t", vec![ContentBlock::Text { text: "x!y?z".into() }])]).unwrap();
        let (result, _) = core.search_nodes(SearchRequest { query: "x!y?z".into(), limit: 10, context: None, mode: Default::default(), content_types: None, intent: None }).unwrap();
        assert_eq!(result.entities.len(), 1);
    }

    #[test]
    fn path_finding_scenario() {
        let (_dir, core) = test_core();
        core.create_entities(vec![Entity::new("A", "t", vec![]), Entity::new("B", "t", vec![]), Entity::new("C", "t", vec![]), Entity::new("D", "t", vec![])]).unwrap();
        core.create_relations(vec![
            Relation::new("A", "B", "r"),
            Relation::new("B", "C", "r"),
            Relation::new("A", "D", "r"),
            Relation::new("D", "C", "r"),
        ]).unwrap();
        let (path, _) = core.find_shortest_path("A", "C", 4, None).unwrap();
        assert!(path.found);
        assert_eq!(path.distance, 2);
    }

    #[test]
    fn backup_then_restore_preserves_stats() {
        let (dir, core) = test_core();
        core.create_entities(vec![Entity::new("Alice", "person", vec![])]).unwrap();
        let backup_path = dir.path().join("backup.db");
        core.backup(&backup_path).unwrap();

        let mut restored_config = Config::default();
        restored_config.db_path = backup_path;
        let restored = Core::open(restored_config).unwrap();
        assert_eq!(restored.get_stats().unwrap().entity_count, core.get_stats().unwrap().entity_count);
    }

    #[test]
    fn manual_transaction_rejects_double_begin() {
        let (_dir, core) = test_core();
        core.begin_transaction().unwrap();
        assert!(matches!(core.begin_transaction(), Err(CoreError::TransactionAlreadyActive)));
        core.rollback_transaction().unwrap();
    }
}
