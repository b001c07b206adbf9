// Step rows
//
// A step row is created when an execution enters a phase. UNIQUE(execution_id,
// step_name) plus the single-transaction advance in the engine guarantee at
// most one running step per execution.

use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::{StepCounts, StepRow};

const COLUMNS: &str = "id, execution_id, step_name, agent_name, status, started_at, \
     updated_at, completed_at, duration_ms, output, token";

/// Insert a step row already in running status. Returns the row id.
pub async fn insert_running<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
    step_name: &str,
    agent_name: &str,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO workflow_steps (execution_id, step_name, agent_name, status, started_at, updated_at)
        VALUES (?1, ?2, ?3, 'running', ?4, ?4)
        "#,
    )
    .bind(execution_id)
    .bind(step_name)
    .bind(agent_name)
    .bind(now_ms)
    .execute(ex)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
    step_name: &str,
) -> Result<Option<StepRow>, StoreError> {
    let row = sqlx::query_as::<_, StepRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_steps WHERE execution_id = ?1 AND step_name = ?2"
    ))
    .bind(execution_id)
    .bind(step_name)
    .fetch_optional(ex)
    .await?;

    Ok(row)
}

/// The running step of an execution, if any
pub async fn running_step<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<Option<StepRow>, StoreError> {
    let row = sqlx::query_as::<_, StepRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_steps WHERE execution_id = ?1 AND status = 'running'"
    ))
    .bind(execution_id)
    .fetch_optional(ex)
    .await?;

    Ok(row)
}

/// Attach a freshly issued continuation token to a step row
pub async fn set_token<'e>(
    ex: impl SqliteExecutor<'e>,
    step_id: i64,
    token: &str,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE workflow_steps SET token = ?2 WHERE id = ?1")
        .bind(step_id)
        .bind(token)
        .execute(ex)
        .await?;
    Ok(())
}

/// Complete a step: set output and duration, clear the token
pub async fn complete<'e>(
    ex: impl SqliteExecutor<'e>,
    step_id: i64,
    output: &serde_json::Value,
    now_ms: i64,
    duration_ms: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE workflow_steps
        SET status = 'completed',
            completed_at = ?2,
            updated_at = ?2,
            duration_ms = ?3,
            output = ?4,
            token = NULL
        WHERE id = ?1
        "#,
    )
    .bind(step_id)
    .bind(now_ms)
    .bind(duration_ms)
    .bind(serde_json::to_string(output)?)
    .execute(ex)
    .await?;
    Ok(())
}

/// Fail a step (sweeper and administrative paths); the token is cleared.
/// completed_at stays NULL, it belongs to completed steps only.
pub async fn fail<'e>(
    ex: impl SqliteExecutor<'e>,
    step_id: i64,
    now_ms: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE workflow_steps
        SET status = 'failed', updated_at = ?2, token = NULL
        WHERE id = ?1
        "#,
    )
    .bind(step_id)
    .bind(now_ms)
    .execute(ex)
    .await?;
    Ok(())
}

/// All steps of an execution in insertion order
pub async fn list_for_execution<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<Vec<StepRow>, StoreError> {
    let rows = sqlx::query_as::<_, StepRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_steps WHERE execution_id = ?1 ORDER BY id"
    ))
    .bind(execution_id)
    .fetch_all(ex)
    .await?;

    Ok(rows)
}

/// Step counts by status for one execution
pub async fn counts<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<StepCounts, StoreError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM workflow_steps WHERE execution_id = ?1 GROUP BY status",
    )
    .bind(execution_id)
    .fetch_all(ex)
    .await?;

    let mut counts = StepCounts::default();
    for (status, n) in rows {
        counts.total += n;
        match status.as_str() {
            "pending" => counts.pending = n,
            "running" => counts.running = n,
            "completed" => counts.completed = n,
            "failed" => counts.failed = n,
            _ => {}
        }
    }
    Ok(counts)
}
