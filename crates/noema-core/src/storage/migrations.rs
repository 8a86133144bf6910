//! Schema migrations (C4).
//!
//! Mirrors the teacher's `storage::migrations` module: a flat list of
//! numbered `Migration`s applied in order, tracked in a `schema_version`
//! table, with the FTS5-tokenizer-upgrade pattern the teacher used in its
//! own migration 7.

/// A single forward-only schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, description: "initial entities/relations schema with FTS5", up: MIGRATION_V1_UP },
    Migration { version: 2, description: "stemming tokenizer + short-prefix index upgrade", up: MIGRATION_V2_UP },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    name TEXT PRIMARY KEY COLLATE NOCASE,
    entity_type TEXT NOT NULL,
    observations_blob BLOB NOT NULL,
    observations_text TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    prominence REAL NOT NULL DEFAULT 1.0,
    decay_rate REAL NOT NULL DEFAULT 0.05,
    importance REAL NOT NULL DEFAULT 1.0
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_updated ON entities(updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_entities_prominence ON entities(prominence DESC);
CREATE INDEX IF NOT EXISTS idx_entities_last_accessed ON entities(last_accessed DESC);
CREATE INDEX IF NOT EXISTS idx_entities_prominence_accessed ON entities(prominence DESC, last_accessed DESC);

CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "from" TEXT NOT NULL COLLATE NOCASE,
    "to" TEXT NOT NULL COLLATE NOCASE,
    relation_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    prominence REAL NOT NULL DEFAULT 1.0,
    UNIQUE("from", "to", relation_type),
    FOREIGN KEY ("from") REFERENCES entities(name) ON DELETE CASCADE,
    FOREIGN KEY ("to") REFERENCES entities(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_relations_from ON relations("from");
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations("to");
CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(relation_type);
CREATE INDEX IF NOT EXISTS idx_relations_from_to ON relations("from", "to");

CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name,
    entity_type,
    observations_text,
    content='entities',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS entities_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, entity_type, observations_text)
    VALUES (NEW.rowid, NEW.name, NEW.entity_type, NEW.observations_text);
END;

CREATE TRIGGER IF NOT EXISTS entities_ad AFTER DELETE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, observations_text)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.entity_type, OLD.observations_text);
END;

CREATE TRIGGER IF NOT EXISTS entities_au AFTER UPDATE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, entity_type, observations_text)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.entity_type, OLD.observations_text);
    INSERT INTO entities_fts(rowid, name, entity_type, observations_text)
    VALUES (NEW.rowid, NEW.name, NEW.entity_type, NEW.observations_text);
END;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    tokenizer TEXT NOT NULL DEFAULT 'unicode61'
);

INSERT OR IGNORE INTO schema_version (version, applied_at, tokenizer) VALUES (1, datetime('now'), 'unicode61');
"#;

/// Rebuilds the FTS index with a stemming (`porter`) tokenizer and
/// short-prefix support, in place, preserving row identity — the same
/// pattern the teacher used for its porter-tokenizer upgrade.
const MIGRATION_V2_UP: &str = r#"
DROP TRIGGER IF EXISTS entities_ai;
DROP TRIGGER IF EXISTS entities_ad;
DROP TRIGGER IF EXISTS entities_au;
DROP TABLE IF EXISTS entities_fts;

CREATE VIRTUAL TABLE entities_fts USING fts5(
    name,
    entity_type,
    observations_text,
    content='entities',
    content_rowid='rowid',
    tokenize='porter unicode61',
    prefix='2 3 4'
);

INSERT INTO entities_fts(entities_fts, rank) VALUES ('rank', 'bm25(10.0, 2.0, 1.0)');
INSERT INTO entities_fts(entities_fts) VALUES ('rebuild');

CREATE TRIGGER entities_ai AFTER INSERT ON entities BEGIN
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
END;

UPDATE schema_version SET tokenizer = 'porter' WHERE version = (SELECT MAX(version) FROM schema_version);
INSERT OR IGNORE INTO schema_version (version, applied_at, tokenizer) VALUES (2, datetime('now'), 'porter');
"#;
