//! Search pipeline orchestration (§4.6).

use rusqlite::{params, Connection};
use tracing::debug;

use crate::cache::BoundedCache;
use crate::config::Config;
use crate::error::CoreResult;
use crate::storage::pool::WriterHandle;
use crate::storage::row_to_entity;
use crate::types::{Entity, ScoredEntity, SearchGraphResult, SearchRequest};

use super::rank::{score_entity, MIN_RELEVANCE};
use super::{fingerprint, parse_query};

/// What's stored in the search cache: the fully-hydrated, ranked graph
/// result for one fingerprint.
pub type SearchCacheValue = SearchGraphResult;

/// Run the full pipeline: cache check, primary term-index search, fallback
/// substring scan, hydration, content-type filter, ranking, relation
/// expansion, and result caching.
///
/// `checkout_writer` is only invoked when relation expansion (step 8) falls
/// onto the over-threshold scratch-table path, which needs a write-capable
/// connection — `conn` here is a pooled read-only handle and cannot run
/// `CREATE TEMP TABLE`.
pub fn search(
    conn: &Connection,
    checkout_writer: impl FnOnce() -> WriterHandle,
    request: &SearchRequest,
    config: &Config,
    entity_cache: &BoundedCache<Entity>,
    search_cache: &BoundedCache<SearchCacheValue>,
) -> CoreResult<SearchGraphResult> {
    // 1. Cache check.
    let key = fingerprint(&request.query, request.limit, request.context.as_ref(), request.mode);
    if let Some(hit) = search_cache.get(&key) {
        debug!(query = %request.query, "search cache hit");
        return Ok(hit);
    }

    // 2. Query parse.
    let (_shape, expr) = parse_query(&request.query);

    // 3. Primary search.
    let candidate_limit = (request.limit * 2).max(request.limit);
    let mut primary: Vec<Entity> = Vec::new();
    if !expr.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT entities.* FROM entities
             JOIN entities_fts ON entities.rowid = entities_fts.rowid
             WHERE entities_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![expr, candidate_limit as i64], row_to_entity)?;
        for row in rows {
            primary.push(row?);
        }
    }

    // 4. Fallback search — only when primary returned nothing.
    let (candidates, used_fallback): (Vec<Entity>, bool) = if primary.is_empty() {
        let needle = format!("%{}%", request.query.to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT * FROM entities
             WHERE lower(name) LIKE ?1 OR lower(entity_type) LIKE ?1 OR lower(observations_text) LIKE ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![needle, request.limit as i64], row_to_entity)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        (out, true)
    } else {
        (primary, false)
    };

    // 5. Hydration + entity cache population.
    for entity in &candidates {
        entity_cache.set(entity.name.to_lowercase(), entity.clone());
    }

    // 6. Content-type filter.
    let allowed_types = request.content_types.as_ref();

    // 7. Ranking.
    let mut scored: Vec<ScoredEntity> = candidates
        .into_iter()
        .enumerate()
        .map(|(idx, entity)| {
            let content_ok = allowed_types
                .map(|types| entity.observations.iter().any(|o| types.iter().any(|t| t == o.kind())))
                .unwrap_or(true);
            let base_rank = if used_fallback { None } else { Some(idx) };
            let (score, rank_explanation) =
                score_entity(&entity, base_rank, request.context.as_ref(), request.intent, content_ok);
            ScoredEntity { entity, score, rank_explanation }
        })
        .filter(|s| s.score >= MIN_RELEVANCE)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(request.limit);

    // 8. Relation expansion.
    let names: Vec<String> = scored.iter().map(|s| s.entity.name.clone()).collect();
    let relations = crate::storage::relations_touching(conn, checkout_writer, &names, config.relation_query_threshold)?;

    let result = SearchGraphResult { entities: scored, relations };

    // 9. Result caching.
    search_cache.set(key, result.clone());
    Ok(result)
}
