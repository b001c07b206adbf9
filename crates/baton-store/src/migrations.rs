// Versioned schema migrations
//
// Migrations apply in strictly ascending order, each in its own transaction,
// and are recorded in schema_migrations. Pending versions must be contiguous
// starting at current_max + 1. A migration flagged destructive is refused
// unless the caller opts in. DDL uses IF NOT EXISTS so a re-run against an
// already-migrated file is a no-op.

use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::StoreError;

/// One reversible schema change
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
    /// Destructive migrations drop data and require an explicit opt-in
    pub destructive: bool,
}

/// Options for a migration run
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    pub allow_destructive: bool,
}

/// Number of legacy migrations folded into the baseline marker
const LEGACY_MIGRATION_COUNT: i64 = 8;

const CREATE_EXECUTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_executions (
    execution_id TEXT PRIMARY KEY,
    workflow_name TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'idle'
        CHECK (state IN ('idle','running','paused','completed','failed','abandoned','diverged')),
    current_step TEXT,
    started_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER,
    duration_ms INTEGER,
    timeout_ms INTEGER,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_executions_state ON workflow_executions(state);
CREATE INDEX IF NOT EXISTS idx_executions_workflow ON workflow_executions(workflow_name);
CREATE INDEX IF NOT EXISTS idx_executions_running_timeout
    ON workflow_executions(started_at)
    WHERE state = 'running' AND timeout_ms IS NOT NULL;

CREATE TRIGGER IF NOT EXISTS trg_executions_touch
AFTER UPDATE ON workflow_executions
FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE workflow_executions
    SET updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
    WHERE execution_id = NEW.execution_id;
END;
"#;

const DROP_EXECUTIONS: &str = r#"
DROP TRIGGER IF EXISTS trg_executions_touch;
DROP TABLE IF EXISTS workflow_executions;
"#;

const CREATE_STEPS: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL
        REFERENCES workflow_executions(execution_id) ON DELETE CASCADE,
    step_name TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending','running','completed','failed')),
    started_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER,
    duration_ms INTEGER,
    output TEXT,
    token TEXT,
    UNIQUE (execution_id, step_name)
);

CREATE INDEX IF NOT EXISTS idx_steps_execution ON workflow_steps(execution_id);
CREATE INDEX IF NOT EXISTS idx_steps_phase ON workflow_steps(step_name);

CREATE TRIGGER IF NOT EXISTS trg_steps_touch
AFTER UPDATE ON workflow_steps
FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE workflow_steps
    SET updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
    WHERE id = NEW.id;
END;
"#;

const DROP_STEPS: &str = r#"
DROP TRIGGER IF EXISTS trg_steps_touch;
DROP TABLE IF EXISTS workflow_steps;
"#;

const CREATE_ARTIFACTS: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    execution_id TEXT NOT NULL
        REFERENCES workflow_executions(execution_id) ON DELETE CASCADE,
    step_name TEXT NOT NULL,
    artifact_type TEXT NOT NULL
        CHECK (artifact_type IN ('file','data','report','finding')),
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    content_type TEXT NOT NULL
        CHECK (content_type IN ('text','markdown','json','binary')),
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    metadata TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_execution
    ON workflow_artifacts(execution_id, step_name);
"#;

const DROP_ARTIFACTS: &str = "DROP TABLE IF EXISTS workflow_artifacts;";

const CREATE_TELEMETRY: &str = r#"
CREATE TABLE IF NOT EXISTS telemetry_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    execution_id TEXT
        REFERENCES workflow_executions(execution_id) ON DELETE CASCADE,
    step_name TEXT,
    agent_name TEXT,
    metadata TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_telemetry_created ON telemetry_events(created_at);
CREATE INDEX IF NOT EXISTS idx_telemetry_execution ON telemetry_events(execution_id);
"#;

const DROP_TELEMETRY: &str = "DROP TABLE IF EXISTS telemetry_events;";

const CREATE_PROJECTS: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    is_git_repo INTEGER NOT NULL DEFAULT 0,
    metadata TEXT,
    discovered_at INTEGER NOT NULL,
    last_used_at INTEGER NOT NULL
);
"#;

const DROP_PROJECTS: &str = "DROP TABLE IF EXISTS projects;";

const CREATE_KNOWLEDGE: &str = r#"
CREATE TABLE IF NOT EXISTS knowledge_findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL CHECK (scope IN ('global','project','system')),
    project_id INTEGER REFERENCES projects(id) ON DELETE CASCADE,
    category TEXT NOT NULL
        CHECK (category IN ('security','architecture','performance','constraint','pattern')),
    severity TEXT NOT NULL
        CHECK (severity IN ('info','low','medium','high','critical')),
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active','deprecated')),
    title TEXT NOT NULL CHECK (length(title) > 0),
    content TEXT NOT NULL CHECK (length(content) > 0),
    tags TEXT CHECK (tags IS NULL OR json_valid(tags)),
    source_execution_id TEXT
        REFERENCES workflow_executions(execution_id) ON DELETE SET NULL,
    source_agent TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (scope != 'project' OR project_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_findings_severity ON knowledge_findings(severity);
CREATE INDEX IF NOT EXISTS idx_findings_project ON knowledge_findings(project_id);
CREATE INDEX IF NOT EXISTS idx_findings_status ON knowledge_findings(status);

CREATE TRIGGER IF NOT EXISTS trg_findings_touch
AFTER UPDATE ON knowledge_findings
FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
BEGIN
    UPDATE knowledge_findings
    SET updated_at = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)
    WHERE id = NEW.id;
END;

CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_findings_fts USING fts5(
    title, content, tags, category, scope,
    content='knowledge_findings', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS trg_findings_fts_insert
AFTER INSERT ON knowledge_findings
BEGIN
    INSERT INTO knowledge_findings_fts(rowid, title, content, tags, category, scope)
    VALUES (new.id, new.title, new.content, coalesce(new.tags, ''), new.category, new.scope);
END;

CREATE TRIGGER IF NOT EXISTS trg_findings_fts_delete
AFTER DELETE ON knowledge_findings
BEGIN
    INSERT INTO knowledge_findings_fts(knowledge_findings_fts, rowid, title, content, tags, category, scope)
    VALUES ('delete', old.id, old.title, old.content, coalesce(old.tags, ''), old.category, old.scope);
END;

CREATE TRIGGER IF NOT EXISTS trg_findings_fts_update
AFTER UPDATE ON knowledge_findings
BEGIN
    INSERT INTO knowledge_findings_fts(knowledge_findings_fts, rowid, title, content, tags, category, scope)
    VALUES ('delete', old.id, old.title, old.content, coalesce(old.tags, ''), old.category, old.scope);
    INSERT INTO knowledge_findings_fts(rowid, title, content, tags, category, scope)
    VALUES (new.id, new.title, new.content, coalesce(new.tags, ''), new.category, new.scope);
END;
"#;

const DROP_KNOWLEDGE: &str = r#"
DROP TRIGGER IF EXISTS trg_findings_fts_update;
DROP TRIGGER IF EXISTS trg_findings_fts_delete;
DROP TRIGGER IF EXISTS trg_findings_fts_insert;
DROP TRIGGER IF EXISTS trg_findings_touch;
DROP TABLE IF EXISTS knowledge_findings_fts;
DROP TABLE IF EXISTS knowledge_findings;
"#;

/// The built-in migration sequence, strictly ascending from version 1
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_workflow_executions",
            up: CREATE_EXECUTIONS,
            down: DROP_EXECUTIONS,
            destructive: false,
        },
        Migration {
            version: 2,
            name: "create_workflow_steps",
            up: CREATE_STEPS,
            down: DROP_STEPS,
            destructive: false,
        },
        Migration {
            version: 3,
            name: "create_workflow_artifacts",
            up: CREATE_ARTIFACTS,
            down: DROP_ARTIFACTS,
            destructive: false,
        },
        Migration {
            version: 4,
            name: "create_telemetry_events",
            up: CREATE_TELEMETRY,
            down: DROP_TELEMETRY,
            destructive: false,
        },
        Migration {
            version: 5,
            name: "create_projects",
            up: CREATE_PROJECTS,
            down: DROP_PROJECTS,
            destructive: false,
        },
        Migration {
            version: 6,
            name: "create_knowledge_findings",
            up: CREATE_KNOWLEDGE,
            down: DROP_KNOWLEDGE,
            destructive: false,
        },
    ]
}

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Fold a legacy 1-8 migration history into a synthetic baseline marker.
///
/// The pre-rename schema recorded eight migrations under old names. When all
/// eight are present and none matches the current sequence, the history is
/// replaced by a single `baseline` row at version 1 so the new sequence can
/// continue from there.
async fn normalize_legacy_history(
    pool: &SqlitePool,
    sequence: &[Migration],
) -> Result<bool, StoreError> {
    let rows = sqlx::query("SELECT version, name FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    if rows.len() != LEGACY_MIGRATION_COUNT as usize {
        return Ok(false);
    }
    let versions: Vec<i64> = rows.iter().map(|r| r.get::<i64, _>("version")).collect();
    if versions != (1..=LEGACY_MIGRATION_COUNT).collect::<Vec<_>>() {
        return Ok(false);
    }
    let any_current = rows.iter().any(|r| {
        let name: String = r.get("name");
        sequence.iter().any(|m| m.name == name)
    });
    if any_current {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM schema_migrations")
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (1, 'baseline', ?1)")
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("folded legacy migration history into baseline marker");
    Ok(true)
}

/// Apply all pending built-in migrations. Returns the number applied.
pub async fn run(pool: &SqlitePool) -> Result<usize, StoreError> {
    run_with(pool, &migrations(), MigrateOptions::default()).await
}

/// Apply pending migrations from an explicit sequence
pub async fn run_with(
    pool: &SqlitePool,
    sequence: &[Migration],
    opts: MigrateOptions,
) -> Result<usize, StoreError> {
    ensure_migrations_table(pool).await?;
    normalize_legacy_history(pool, sequence).await?;

    let current: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;

    let mut expected = current + 1;
    let mut applied = 0usize;

    for migration in sequence.iter().filter(|m| m.version > current) {
        if migration.version != expected {
            return Err(StoreError::MigrationSequence {
                expected,
                found: migration.version,
            });
        }
        if migration.destructive && !opts.allow_destructive {
            return Err(StoreError::DestructiveRefused {
                version: migration.version,
                name: migration.name.to_string(),
            });
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::Migration(format!(
                    "migration {} ({}) failed: {}",
                    migration.version, migration.name, e
                ))
            })?;
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
        expected += 1;
        applied += 1;
    }

    Ok(applied)
}

/// Roll back the most recently applied migration using its paired down step.
/// Returns the version rolled back.
pub async fn rollback_last(
    pool: &SqlitePool,
    sequence: &[Migration],
) -> Result<i64, StoreError> {
    ensure_migrations_table(pool).await?;

    let current: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    if current == 0 {
        return Err(StoreError::NothingToRollBack);
    }

    let migration = sequence
        .iter()
        .find(|m| m.version == current)
        .ok_or_else(|| {
            StoreError::Migration(format!("no down step known for version {}", current))
        })?;

    let mut tx = pool.begin().await?;
    sqlx::raw_sql(migration.down).execute(&mut *tx).await.map_err(|e| {
        StoreError::Migration(format!(
            "rollback of {} ({}) failed: {}",
            migration.version, migration.name, e
        ))
    })?;
    sqlx::query("DELETE FROM schema_migrations WHERE version = ?1")
        .bind(migration.version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(version = migration.version, name = migration.name, "rolled back migration");
    Ok(migration.version)
}

/// Applied migration versions, ascending
pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i64>, StoreError> {
    ensure_migrations_table(pool).await?;
    let versions = sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await?;
    Ok(versions)
}
