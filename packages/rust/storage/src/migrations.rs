//! SQL migration definitions for the lineage database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: crawl_runs, descendants",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per descendant-mapping run
CREATE TABLE IF NOT EXISTS crawl_runs (
    id                TEXT PRIMARY KEY,
    owner_external_id TEXT NOT NULL,
    owner_name        TEXT NOT NULL,
    owner_metadata    TEXT NOT NULL DEFAULT '{}',
    max_depth         INTEGER NOT NULL CHECK (max_depth >= 1),
    started_at        TEXT NOT NULL,
    finished_at       TEXT,
    stats_json        TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_owner ON crawl_runs(owner_name);

-- Append-only descendant records; parent_descendant_id links each record
-- to the record one generation closer to the owner.
CREATE TABLE IF NOT EXISTS descendants (
    id                   TEXT PRIMARY KEY,
    run_id               TEXT NOT NULL REFERENCES crawl_runs(id),
    owner_external_id    TEXT NOT NULL,
    owner_name           TEXT NOT NULL,
    descendant_name      TEXT NOT NULL,
    birth_year           INTEGER,
    death_year           INTEGER,
    generation           INTEGER NOT NULL CHECK (generation >= 1),
    relationship_path    TEXT NOT NULL,
    parent_descendant_id TEXT REFERENCES descendants(id),
    source_external_id   TEXT NOT NULL,
    confidence_score     REAL NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    confidence_factors   TEXT NOT NULL,
    status               TEXT NOT NULL CHECK (status IN ('suspected', 'probable', 'confirmed_lineage')),
    is_living            INTEGER NOT NULL DEFAULT 0,
    living_probability   REAL,
    discovered_via       TEXT NOT NULL,
    discovery_date       TEXT NOT NULL,
    CHECK ((generation = 1) = (parent_descendant_id IS NULL)),
    UNIQUE(run_id, source_external_id)
);

CREATE INDEX IF NOT EXISTS idx_descendants_owner ON descendants(owner_name);
CREATE INDEX IF NOT EXISTS idx_descendants_parent ON descendants(parent_descendant_id);
CREATE INDEX IF NOT EXISTS idx_descendants_run ON descendants(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
