//! Schema + index layer (C4) and read-connection pool (C5).
//!
//! `schema` owns DDL/pragmas/trigger management, `migrations` owns the
//! version ladder, `pool` owns pooled read-only handles. This module also
//! holds the row <-> domain-type mapping shared by the mutation engine (C7)
//! and the search pipeline (C6), since both read/write the same `entities`
//! and `relations` tables.

pub mod migrations;
pub mod pool;
pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use uuid::Uuid;

use crate::codec;
use crate::config::Config;
use crate::error::{CoreResult, Result};
use crate::mutation::get_relations_for;
use crate::storage::pool::WriterHandle;
use crate::types::{ContentBlock, Entity, Relation};

/// Open (or create) the main database file for the writer handle and apply
/// pragmas + migrations. Readers use [`pool::ReadPool`] instead.
pub fn open_writer(config: &Config) -> Result<Connection> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open_with_flags(
        &config.db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    schema::apply_pragmas(&conn, config)?;
    schema::run_migrations(&conn)?;
    Ok(conn)
}

/// Flatten the text-bearing parts of an observation list for FTS indexing.
/// Binary fields (image/audio/resource data) are intentionally excluded —
/// only `text`, `uri`, `title`, and `description` are searchable.
pub fn observations_to_text(observations: &[ContentBlock]) -> String {
    let mut parts = Vec::new();
    for obs in observations {
        match obs {
            ContentBlock::Text { text } => parts.push(text.clone()),
            ContentBlock::ResourceLink { uri, title, description } => {
                parts.push(uri.clone());
                if let Some(t) = title { parts.push(t.clone()); }
                if let Some(d) = description { parts.push(d.clone()); }
            }
            ContentBlock::Resource { title, description, .. } => {
                if let Some(t) = title { parts.push(t.clone()); }
                if let Some(d) = description { parts.push(d.clone()); }
            }
            ContentBlock::Image { .. } | ContentBlock::Audio { .. } => {}
        }
    }
    parts.join(" ")
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

/// Decode one `entities` row into a domain [`Entity`], running the
/// observation blob through the codec (C3).
pub fn row_to_entity(row: &Row) -> rusqlite::Result<Entity> {
    let name: String = row.get("name")?;
    let entity_type: String = row.get("entity_type")?;
    let blob: Vec<u8> = row.get("observations_blob")?;
    let observations = codec::decode(&blob).unwrap_or_default();
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let access_count: i64 = row.get("access_count")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    let prominence: f64 = row.get("prominence")?;
    let importance: f64 = row.get("importance")?;

    Ok(Entity {
        name,
        entity_type,
        observations,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
        access_count: Some(access_count),
        last_accessed: last_accessed.map(|s| parse_dt(&s)),
        prominence_score: Some(prominence),
        importance_weight: Some(importance),
    })
}

/// Every relation touching any name in `names` (used by `read_graph`,
/// `open_nodes`, and the search pipeline's relation-expansion step). A
/// direct per-name scan for sets at or under `threshold`; larger sets are
/// staged into a scratch table instead of widening an `IN (...)` parameter
/// list without bound (spec.md §4.4: "> threshold: within a transaction,
/// create a scratch table of names, query via join, drop the scratch
/// table").
///
/// `writer` is only invoked (and only checked out) on the over-threshold
/// path — `CREATE TEMP TABLE`/`INSERT` need a write-capable connection,
/// since `PRAGMA query_only` on a pooled read-only connection blocks writes
/// to every attached database, TEMP included.
pub fn relations_touching(
    conn: &Connection,
    writer: impl FnOnce() -> WriterHandle,
    names: &[String],
    threshold: usize,
) -> CoreResult<Vec<Relation>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    if names.len() <= threshold {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for name in names {
            for rel in get_relations_for(conn, name)? {
                let key = (rel.from.clone(), rel.to.clone(), rel.relation_type.clone());
                if seen.insert(key) {
                    out.push(rel);
                }
            }
        }
        return Ok(out);
    }
    relations_via_scratch_table(&writer(), names)
}

fn relations_via_scratch_table(conn: &Connection, names: &[String]) -> CoreResult<Vec<Relation>> {
    let scratch = format!("scratch_names_{}", Uuid::new_v4().simple());
    conn.execute(&format!("CREATE TEMP TABLE {scratch} (name TEXT PRIMARY KEY COLLATE NOCASE)"), [])?;

    let result = (|| -> CoreResult<Vec<Relation>> {
        {
            let mut stmt = conn.prepare(&format!("INSERT OR IGNORE INTO {scratch}(name) VALUES (?1)"))?;
            for name in names {
                stmt.execute(params![name])?;
            }
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT r.* FROM relations r
             JOIN {scratch} s1 ON r.\"from\" = s1.name
             UNION
             SELECT r.* FROM relations r
             JOIN {scratch} s2 ON r.\"to\" = s2.name"
        ))?;
        let rows = stmt.query_map([], row_to_relation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })();

    conn.execute(&format!("DROP TABLE IF EXISTS {scratch}"), [])?;
    result
}

pub fn row_to_relation(row: &Row) -> rusqlite::Result<Relation> {
    let from: String = row.get("from")?;
    let to: String = row.get("to")?;
    let relation_type: String = row.get("relation_type")?;
    let created_at: String = row.get("created_at")?;
    let access_count: i64 = row.get("access_count")?;
    let last_accessed: Option<String> = row.get("last_accessed")?;
    let prominence: f64 = row.get("prominence")?;

    Ok(Relation {
        from,
        to,
        relation_type,
        created_at: Some(parse_dt(&created_at)),
        access_count: Some(access_count),
        last_accessed: last_accessed.map(|s| parse_dt(&s)),
        prominence_score: Some(prominence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::WriterPool;
    use crate::storage::schema::run_migrations;

    fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at)
             VALUES ('a', 't', X'00', '', '2024-01-01', '2024-01-01'),
                    ('b', 't', X'00', '', '2024-01-01', '2024-01-01')",
            [],
        ).unwrap();
        conn.execute(
            "INSERT INTO relations (\"from\", \"to\", relation_type, created_at) VALUES ('a', 'b', 'knows', '2024-01-01')",
            [],
        ).unwrap();
        (dir, db_path)
    }

    #[test]
    fn relations_touching_small_set_skips_scratch_table() {
        let (_dir, db_path) = setup();
        let conn = Connection::open(&db_path).unwrap();
        let names = vec!["a".to_string()];
        let relations =
            relations_touching(&conn, || unreachable!("writer must not be checked out under threshold"), &names, 10).unwrap();
        assert_eq!(relations.len(), 1);
    }

    #[test]
    fn relations_touching_over_threshold_uses_scratch_table() {
        let (_dir, db_path) = setup();
        let conn = Connection::open(&db_path).unwrap();
        let writer_pool = WriterPool::new(Connection::open(&db_path).unwrap());
        let names = vec!["a".to_string()];
        let relations = relations_touching(&conn, || writer_pool.checkout(), &names, 0).unwrap();
        assert_eq!(relations.len(), 1);
    }
}
