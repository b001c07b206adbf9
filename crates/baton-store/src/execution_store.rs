// Execution rows
//
// Functions take any SqliteExecutor so the step executor can run them inside
// its own transaction; pass `db.reader()` / `db.writer()` for standalone use.

use baton_core::ExecutionState;
use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::ExecutionRow;

/// Input for inserting a new execution row (state starts at idle)
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub execution_id: String,
    pub workflow_name: String,
    pub timeout_ms: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// State change to apply to an execution row
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub state: ExecutionState,
    /// New current_step value; None clears the column (idle and terminal states)
    pub current_step: Option<String>,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

const COLUMNS: &str = "execution_id, workflow_name, state, current_step, started_at, \
     updated_at, completed_at, duration_ms, timeout_ms, metadata";

pub async fn insert<'e>(
    ex: impl SqliteExecutor<'e>,
    new: &NewExecution,
    now_ms: i64,
) -> Result<(), StoreError> {
    let metadata = new
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (execution_id, workflow_name, state, current_step, started_at, updated_at, timeout_ms, metadata)
        VALUES (?1, ?2, 'idle', NULL, ?3, ?3, ?4, ?5)
        "#,
    )
    .bind(&new.execution_id)
    .bind(&new.workflow_name)
    .bind(now_ms)
    .bind(new.timeout_ms)
    .bind(metadata)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn get<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<Option<ExecutionRow>, StoreError> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE execution_id = ?1"
    ))
    .bind(execution_id)
    .fetch_optional(ex)
    .await?;

    Ok(row)
}

/// Apply a state change. Returns false when no row matched.
pub async fn apply_state<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
    update: &StateUpdate,
    now_ms: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET state = ?2,
            current_step = ?3,
            updated_at = ?4,
            completed_at = COALESCE(?5, completed_at),
            duration_ms = COALESCE(?6, duration_ms)
        WHERE execution_id = ?1
        "#,
    )
    .bind(execution_id)
    .bind(update.state.to_string())
    .bind(&update.current_step)
    .bind(now_ms)
    .bind(update.completed_at)
    .bind(update.duration_ms)
    .execute(ex)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an execution; steps, artifacts, and telemetry cascade
pub async fn delete<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM workflow_executions WHERE execution_id = ?1")
        .bind(execution_id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_by_workflow<'e>(
    ex: impl SqliteExecutor<'e>,
    workflow_name: &str,
) -> Result<Vec<ExecutionRow>, StoreError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE workflow_name = ?1 ORDER BY started_at DESC"
    ))
    .bind(workflow_name)
    .fetch_all(ex)
    .await?;

    Ok(rows)
}

pub async fn list_by_state<'e>(
    ex: impl SqliteExecutor<'e>,
    state: ExecutionState,
) -> Result<Vec<ExecutionRow>, StoreError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_executions WHERE state = ?1 ORDER BY started_at DESC"
    ))
    .bind(state.to_string())
    .fetch_all(ex)
    .await?;

    Ok(rows)
}

/// Executions stuck in running past their timeout budget (sweeper scan)
pub async fn list_running_past_timeout<'e>(
    ex: impl SqliteExecutor<'e>,
    now_ms: i64,
) -> Result<Vec<ExecutionRow>, StoreError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM workflow_executions
        WHERE state = 'running'
          AND timeout_ms IS NOT NULL
          AND started_at + timeout_ms < ?1
        ORDER BY started_at
        "#
    ))
    .bind(now_ms)
    .fetch_all(ex)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn new_execution(id: &str) -> NewExecution {
        NewExecution {
            execution_id: id.to_string(),
            workflow_name: "demo".to_string(),
            timeout_ms: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn insert_get_round_trip() {
        let db = test_db().await;
        insert(db.writer(), &new_execution("exec-1"), 1_000).await.unwrap();

        let row = get(db.reader(), "exec-1").await.unwrap().unwrap();
        assert_eq!(row.state, "idle");
        assert_eq!(row.workflow_name, "demo");
        assert!(row.current_step.is_none());

        assert!(get(db.reader(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_execution_id_is_unique_violation() {
        let db = test_db().await;
        insert(db.writer(), &new_execution("exec-1"), 1_000).await.unwrap();
        let err = insert(db.writer(), &new_execution("exec-1"), 2_000)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_by_check_constraint() {
        let db = test_db().await;
        let err = sqlx::query(
            "INSERT INTO workflow_executions (execution_id, workflow_name, state, started_at, updated_at) \
             VALUES ('x', 'demo', 'limbo', 1, 1)",
        )
        .execute(db.writer())
        .await
        .map_err(StoreError::from)
        .unwrap_err();
        assert!(err.is_check_violation());
    }

    #[tokio::test]
    async fn apply_state_updates_row() {
        let db = test_db().await;
        insert(db.writer(), &new_execution("exec-1"), 1_000).await.unwrap();

        let matched = apply_state(
            db.writer(),
            "exec-1",
            &StateUpdate {
                state: ExecutionState::Running,
                current_step: Some("plan".to_string()),
                completed_at: None,
                duration_ms: None,
            },
            2_000,
        )
        .await
        .unwrap();
        assert!(matched);

        let row = get(db.reader(), "exec-1").await.unwrap().unwrap();
        assert_eq!(row.state, "running");
        assert_eq!(row.current_step.as_deref(), Some("plan"));
        assert_eq!(row.updated_at, 2_000);

        assert!(!apply_state(
            db.writer(),
            "missing",
            &StateUpdate {
                state: ExecutionState::Running,
                current_step: None,
                completed_at: None,
                duration_ms: None,
            },
            3_000,
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn timeout_scan_only_matches_overdue_running_rows() {
        let db = test_db().await;

        let mut overdue = new_execution("overdue");
        overdue.timeout_ms = Some(500);
        insert(db.writer(), &overdue, 1_000).await.unwrap();
        apply_state(
            db.writer(),
            "overdue",
            &StateUpdate {
                state: ExecutionState::Running,
                current_step: Some("plan".to_string()),
                completed_at: None,
                duration_ms: None,
            },
            1_000,
        )
        .await
        .unwrap();

        // No timeout budget: never swept
        insert(db.writer(), &new_execution("untimed"), 1_000).await.unwrap();
        apply_state(
            db.writer(),
            "untimed",
            &StateUpdate {
                state: ExecutionState::Running,
                current_step: Some("plan".to_string()),
                completed_at: None,
                duration_ms: None,
            },
            1_000,
        )
        .await
        .unwrap();

        let hits = list_running_past_timeout(db.reader(), 2_000).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].execution_id, "overdue");

        // Before the deadline nothing matches
        let hits = list_running_past_timeout(db.reader(), 1_200).await.unwrap();
        assert!(hits.is_empty());
    }
}
