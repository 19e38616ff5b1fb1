//! SQL DDL for the tally database.

/// Current schema version, kept in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

/// Tables and indexes. Foreign keys are declared but not enforced, see [`PRAGMAS`].
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS Projects (
    ProjectId INTEGER PRIMARY KEY,
    Name TEXT,
    Description TEXT,
    Created TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Activities (
    ActivityId INTEGER PRIMARY KEY,
    ProjectId INTEGER NOT NULL,
    Name TEXT,
    Description TEXT,
    Tags TEXT,
    Started TEXT NOT NULL,
    Stopped TEXT NOT NULL DEFAULT '',
    FOREIGN KEY(ProjectId) REFERENCES Projects(ProjectId)
);

CREATE INDEX IF NOT EXISTS idx_activities_stopped ON Activities(Stopped);
CREATE INDEX IF NOT EXISTS idx_activities_project ON Activities(ProjectId);
"#;

/// Applied to every connection. Activities may name a project that does not
/// exist yet, so foreign keys are switched off explicitly.
pub const PRAGMAS: &str = r#"
PRAGMA foreign_keys = OFF;
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

/// Activities first, so no activity is left pointing at a deleted project.
pub const EMPTY_TABLES: &str = r#"
DELETE FROM Activities;
DELETE FROM Projects;
VACUUM;
"#;
