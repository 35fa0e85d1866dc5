//! SQL migration definitions for the gradesync database.
//!
//! Migrations are applied in order on database open. Secondary indexes are
//! not part of the migrations; they are created by
//! [`Storage::ensure_indexes`](crate::Storage::ensure_indexes).

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
        description: "Initial schema: faculty, grades, ingest_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Faculty identities; (name, department, course_number) is kept unique by upsert
CREATE TABLE IF NOT EXISTS faculty (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    department    TEXT NOT NULL,
    course_number TEXT NOT NULL,
    title         TEXT,
    source_url    TEXT,
    updated_at    TEXT NOT NULL
);

-- One row per term-entry of the grade dataset
CREATE TABLE IF NOT EXISTS grades (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    course        TEXT NOT NULL,
    term          TEXT NOT NULL,
    instructor    TEXT NOT NULL,
    crn           TEXT NOT NULL,
    aprec         REAL NOT NULL DEFAULT 0,
    bprec         REAL NOT NULL DEFAULT 0,
    cprec         REAL NOT NULL DEFAULT 0,
    dprec         REAL NOT NULL DEFAULT 0,
    fprec         REAL NOT NULL DEFAULT 0,
    department    TEXT,
    course_number TEXT
);

-- Ingestion run ledger
CREATE TABLE IF NOT EXISTS ingest_runs (
    id             TEXT PRIMARY KEY,
    kind           TEXT NOT NULL,
    started_at     TEXT NOT NULL,
    finished_at    TEXT,
    status         TEXT NOT NULL,
    stats_json     TEXT,
    dataset_sha256 TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

/// Secondary indexes, created idempotently by `ensure_indexes`.
pub(crate) const INDEXES: &[(&str, &str)] = &[
    (
        "idx_faculty_key",
        "CREATE INDEX IF NOT EXISTS idx_faculty_key ON faculty(name, department, course_number)",
    ),
    (
        "idx_faculty_department",
        "CREATE INDEX IF NOT EXISTS idx_faculty_department ON faculty(department)",
    ),
    (
        "idx_grades_instructor",
        "CREATE INDEX IF NOT EXISTS idx_grades_instructor ON grades(instructor)",
    ),
    (
        "idx_grades_course",
        "CREATE INDEX IF NOT EXISTS idx_grades_course ON grades(course)",
    ),
    (
        "idx_grades_department",
        "CREATE INDEX IF NOT EXISTS idx_grades_department ON grades(department)",
    ),
];
