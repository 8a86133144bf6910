//! Schema + index layer (C4).
//!
//! Owns pragma configuration, migration application, and the trigger
//! drop/recreate helpers the bulk mutation paths (C7) use to avoid paying
//! per-row FTS trigger overhead during large inserts/deletes.

use rusqlite::Connection;
use tracing::info;

use crate::config::Config;
use crate::error::{Result, StorageError};

use super::migrations::MIGRATIONS;

/// Apply the durability/perf pragmas described in spec.md §4.4. Conceptual
/// names map to SQLite's actual pragmas.
pub fn apply_pragmas(conn: &Connection, config: &Config) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -{cache_kb};
         PRAGMA mmap_size = {mmap_bytes};
         PRAGMA page_size = {page_bytes};
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout};",
        cache_kb = config.page_cache_mb as u64 * 1024,
        mmap_bytes = config.mmap_mb as u64 * 1024 * 1024,
        page_bytes = config.page_size_kb as u64 * 1024,
        busy_timeout = config.busy_timeout_ms,
    ))?;
    Ok(())
}

/// Apply read-only pragmas appropriate for pooled reader connections: no
/// point re-declaring `page_size` (fixed at file creation) and readers never
/// need `foreign_keys` enforcement since they never write.
pub fn apply_reader_pragmas(conn: &Connection, config: &Config) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {busy_timeout};
         PRAGMA query_only = ON;",
        busy_timeout = config.busy_timeout_ms,
    ))?;
    Ok(())
}

fn current_version(conn: &Connection) -> u32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

fn current_tokenizer(conn: &Connection) -> Option<String> {
    conn.query_row(
        "SELECT tokenizer FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .ok()
}

/// Apply every migration not yet recorded in `schema_version`, then detect a
/// legacy (non-stemming) tokenizer and rebuild the term index in place if
/// needed (§4.4 "schema-migration step detects legacy tokenizer configurations").
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // schema_version doesn't exist before migration 1 runs; probe safely.
    let has_version_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);

    let applied = if has_version_table { current_version(conn) } else { 0 };

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        info!(version = migration.version, desc = migration.description, "applying migration");
        conn.execute_batch(migration.up)?;
    }

    if let Some(tok) = current_tokenizer(conn) {
        if tok != "porter" {
            info!("legacy tokenizer '{tok}' detected post-migration, forcing rebuild");
            rebuild_term_index(conn)?;
        }
    }

    Ok(())
}

/// Rebuild the FTS index contents in place without touching row identity —
/// used both by the legacy-tokenizer detector above and by the maintenance
/// surface (C10).
pub fn rebuild_term_index(conn: &Connection) -> Result<()> {
    conn.execute("INSERT INTO entities_fts(entities_fts) VALUES ('rebuild')", [])
        .map_err(StorageError::Database)?;
    Ok(())
}

/// Drop the FTS sync triggers ahead of a bulk insert/delete so SQLite
/// doesn't pay per-row trigger overhead; the caller must follow with
/// [`recreate_triggers`] and a term-index rebuild (§4.7 bulk path).
pub fn drop_sync_triggers(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TRIGGER IF EXISTS entities_ai;
         DROP TRIGGER IF EXISTS entities_ad;
         DROP TRIGGER IF EXISTS entities_au;",
    )?;
    Ok(())
}

pub fn recreate_triggers(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TRIGGER entities_ai AFTER INSERT ON entities BEGIN
            INSERT INTO entities_fts(rowid, name, entity_type, observations_text)
            VALUES (NEW.rowid, NEW.name, NEW.entity_type, NEW.observations_text);
         END;
         CREATE TRIGGER entities_ad AFTER DELETE ON entities BEGIN
            INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, observations_text)
            VALUES ('delete', OLD.rowid, OLD.name, OLD.entity_type, OLD.observations_text);
         END;
         CREATE TRIGGER entities_au AFTER UPDATE ON entities BEGIN
            INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, observations_text)
            VALUES ('delete', OLD.rowid, OLD.name, OLD.entity_type, OLD.observations_text);
            INSERT INTO entities_fts(rowid, name, entity_type, observations_text)
            VALUES (NEW.rowid, NEW.name, NEW.entity_type, NEW.observations_text);
         END;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version = current_version(&conn);
        assert_eq!(version, 2);
        assert_eq!(current_tokenizer(&conn).as_deref(), Some("porter"));
    }

    #[test]
    fn trigger_roundtrip_keeps_fts_in_sync() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        drop_sync_triggers(&conn).unwrap();
        conn.execute(
            "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at)
             VALUES ('alice', 'person', X'00', 'loves climbing', '2024-01-01', '2024-01-01')",
            [],
        ).unwrap();
        recreate_triggers(&conn).unwrap();
        rebuild_term_index(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'climb'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
