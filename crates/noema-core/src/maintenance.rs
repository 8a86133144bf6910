//! Maintenance surface (C10).
//!
//! Operator-triggered upkeep that the mutation/search paths don't run on
//! their own critical path: full bloom/term-index rebuilds and a
//! consistency scan (spec.md §7), plus the optional prominence-decay pass
//! (§4.7 "memory aging", gated on `config.aging.enabled`).

use std::sync::Mutex;

use rusqlite::params;
use tracing::{info, warn};

use crate::bloom::CountingBloomFilter;
use crate::config::{AgingPreset, Config};
use crate::error::{CoreError, CoreResult};

/// Result of [`check_consistency`].
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub entity_count: i64,
    pub term_index_count: i64,
    pub term_index_in_sync: bool,
    pub bloom_missing_names: Vec<String>,
    pub bloom_false_positive_names: Vec<String>,
}

/// Re-derive the bloom filter from the committed `entities` table, discarding
/// whatever state it held before (§4.1, §6 "rebuildable from the entities
/// table").
pub fn rebuild_bloom(conn: &rusqlite::Connection, bloom: &Mutex<CountingBloomFilter>) -> CoreResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM entities")?;
    let names: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
    bloom.lock().unwrap().rebuild_from(names.iter().map(|s| s.as_str()));
    info!(count = names.len(), "bloom filter rebuilt");
    Ok(())
}

/// Force a full FTS5 term-index rebuild (§4.4, used after a legacy-tokenizer
/// migration or on operator request).
pub fn rebuild_term_index(conn: &rusqlite::Connection) -> CoreResult<()> {
    crate::storage::schema::rebuild_term_index(conn)?;
    Ok(())
}

/// Compare `entities`, `entities_fts`, and the bloom filter for drift (§7).
/// This never repairs anything itself — callers decide whether to follow up
/// with [`rebuild_bloom`] / [`rebuild_term_index`]. Returns
/// [`CoreError::StorageCorruption`] when the term index has fallen out of
/// sync with `entities` or the bloom filter is missing names it should
/// contain — both are drift a caller needs to act on, not just observe.
pub fn check_consistency(conn: &rusqlite::Connection, bloom: &Mutex<CountingBloomFilter>) -> CoreResult<ConsistencyReport> {
    let entity_count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
    let term_index_count: i64 = conn.query_row("SELECT COUNT(*) FROM entities_fts", [], |r| r.get(0))?;

    let mut stmt = conn.prepare("SELECT name FROM entities")?;
    let names: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;

    let guard = bloom.lock().unwrap();
    let bloom_missing_names: Vec<String> = names.iter().filter(|n| !guard.contains(n)).cloned().collect();
    drop(guard);

    // A counting bloom filter can't enumerate its false positives (only test
    // membership of a known key), so this field stays empty until a caller
    // checks a specific deleted name against it.
    let bloom_false_positive_names = Vec::new();

    let report = ConsistencyReport {
        entity_count,
        term_index_count,
        term_index_in_sync: entity_count == term_index_count,
        bloom_missing_names,
        bloom_false_positive_names,
    };

    if !report.term_index_in_sync || !report.bloom_missing_names.is_empty() {
        warn!(
            entity_count = report.entity_count,
            term_index_count = report.term_index_count,
            bloom_missing = report.bloom_missing_names.len(),
            "consistency scan found drift"
        );
        return Err(CoreError::StorageCorruption(format!(
            "entity_count={} term_index_count={} bloom_missing={}",
            report.entity_count,
            report.term_index_count,
            report.bloom_missing_names.len()
        )));
    }

    Ok(report)
}

/// Decay `prominence` for every entity by its configured (or preset) decay
/// rate, scaled by time since `last_accessed` (falling back to
/// `updated_at`), and nudge it back up by `access_boost` for rows touched
/// since the last pass. Returns the number of rows updated. No-op unless
/// the caller has checked `config.aging.enabled` (§4.7 "Memory aging").
pub fn run_aging_pass(conn: &rusqlite::Connection, config: &Config) -> CoreResult<usize> {
    let (decay_rate, half_life_days, access_boost) = resolve_aging_factors(config);
    let lambda = std::f64::consts::LN_2 / half_life_days.max(0.01);

    let mut stmt = conn.prepare(
        "SELECT name, prominence, access_count,
                julianday('now') - julianday(COALESCE(last_accessed, updated_at)) AS age_days
         FROM entities",
    )?;
    let rows: Vec<(String, f64, i64, f64)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    let mut updated = 0usize;
    for (name, prominence, access_count, age_days) in rows {
        let decayed = prominence * (-lambda * decay_rate * age_days.max(0.0)).exp();
        let boosted = decayed + access_boost * (access_count as f64).ln_1p();
        let new_prominence = boosted.clamp(0.01, 10.0);
        conn.execute(
            "UPDATE entities SET prominence = ?1 WHERE name = ?2 COLLATE NOCASE",
            params![new_prominence, name],
        )?;
        updated += 1;
    }
    info!(updated, "aging pass complete");
    Ok(updated)
}

fn resolve_aging_factors(config: &Config) -> (f64, f64, f64) {
    let preset_factors = config.aging.preset.unwrap_or(AgingPreset::Balanced).factors();
    (
        config.aging.custom_decay_rate.unwrap_or(preset_factors.0),
        config.aging.custom_half_life_days.unwrap_or(preset_factors.1),
        config.aging.custom_access_boost.unwrap_or(preset_factors.2),
    )
}
