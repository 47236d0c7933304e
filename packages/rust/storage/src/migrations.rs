//! SQL migration definitions for the Atomizer database.
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
    vec![
        Migration {
            version: 1,
            description: "Initial schema: atoms, contexts, job_queue",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per parsed node
CREATE TABLE IF NOT EXISTS atoms (
    id         TEXT PRIMARY KEY,
    type       TEXT NOT NULL,
    content    TEXT NOT NULL,
    embedding  TEXT,
    created_at TEXT NOT NULL
);

-- One row per node that has children; children is a JSON array of {"id": ...}
CREATE TABLE IF NOT EXISTS contexts (
    id        TEXT PRIMARY KEY,
    owner     TEXT,
    children  TEXT NOT NULL DEFAULT '[]',
    embedding TEXT
);

CREATE INDEX IF NOT EXISTS idx_contexts_owner ON contexts(owner);

-- Named work queues; message is the JSON job target
CREATE TABLE IF NOT EXISTS job_queue (
    job_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name  TEXT NOT NULL,
    message     TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    read_ct     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_job_queue_name ON job_queue(queue_name, job_id);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Job visibility timeout",
            sql: r#"
-- Unix millis before which a claimed job is hidden from other readers
ALTER TABLE job_queue ADD COLUMN visible_at INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_job_queue_visible ON job_queue(queue_name, visible_at, job_id);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
