// Telemetry rows
//
// Append-only. Ordering within an execution is the auto-increment id;
// timestamps are informational. The best-effort wrapper that swallows append
// failures lives in baton-engine; this module is the raw table access.

use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::TelemetryRow;

/// Bounds for the telemetry listing limit
pub const TELEMETRY_LIMIT_DEFAULT: i64 = 100;
pub const TELEMETRY_LIMIT_MAX: i64 = 1000;

/// Input for appending one telemetry event
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub event_type: String,
    /// Only set for executions that exist; unknown ids belong in metadata
    /// (the column carries an FK so rows cascade with their execution)
    pub execution_id: Option<String>,
    pub step_name: Option<String>,
    pub agent_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(event_type: impl std::fmt::Display) -> Self {
        Self {
            event_type: event_type.to_string(),
            ..Default::default()
        }
    }

    pub fn execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    pub fn agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append one event. Returns the row id.
pub async fn append<'e>(
    ex: impl SqliteExecutor<'e>,
    event: &NewEvent,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let metadata = event
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO telemetry_events (event_type, execution_id, step_name, agent_name, metadata, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&event.event_type)
    .bind(&event.execution_id)
    .bind(&event.step_name)
    .bind(&event.agent_name)
    .bind(metadata)
    .bind(now_ms)
    .execute(ex)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Recent events, newest first. The limit is clamped to [1, 1000].
pub async fn list<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: Option<&str>,
    event_type: Option<&str>,
    limit: i64,
) -> Result<Vec<TelemetryRow>, StoreError> {
    let limit = limit.clamp(1, TELEMETRY_LIMIT_MAX);

    let mut builder = sqlx::QueryBuilder::new(
        "SELECT id, event_type, execution_id, step_name, agent_name, metadata, created_at \
         FROM telemetry_events WHERE 1=1",
    );
    if let Some(execution_id) = execution_id {
        builder.push(" AND execution_id = ").push_bind(execution_id);
    }
    if let Some(event_type) = event_type {
        builder.push(" AND event_type = ").push_bind(event_type);
    }
    builder.push(" ORDER BY id DESC LIMIT ").push_bind(limit);

    let rows = builder.build_query_as::<TelemetryRow>().fetch_all(ex).await?;
    Ok(rows)
}

/// Event types recorded for one execution in append order, for assertions
/// over a whole run
pub async fn event_types_for_execution<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
) -> Result<Vec<String>, StoreError> {
    let types = sqlx::query_scalar(
        "SELECT event_type FROM telemetry_events WHERE execution_id = ?1 ORDER BY id",
    )
    .bind(execution_id)
    .fetch_all(ex)
    .await?;
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::execution_store::{self, NewExecution};

    async fn test_db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        execution_store::insert(
            db.writer(),
            &NewExecution {
                execution_id: "exec-1".to_string(),
                workflow_name: "demo".to_string(),
                timeout_ms: None,
                metadata: None,
            },
            1_000,
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn append_and_list_newest_first() {
        let db = test_db().await;
        for i in 0..5 {
            append(
                db.writer(),
                &NewEvent::new("step_started").execution("exec-1").step(format!("s{}", i)),
                1_000 + i,
            )
            .await
            .unwrap();
        }

        let events = list(db.reader(), Some("exec-1"), None, 3).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].step_name.as_deref(), Some("s4"));

        let filtered = list(db.reader(), Some("exec-1"), Some("token_generated"), 10)
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let db = test_db().await;
        append(db.writer(), &NewEvent::new("error"), 1_000).await.unwrap();
        // Zero and negative collapse to one
        let events = list(db.reader(), None, None, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        let events = list(db.reader(), None, None, -5).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn events_cascade_with_execution() {
        let db = test_db().await;
        append(
            db.writer(),
            &NewEvent::new("workflow_created").execution("exec-1"),
            1_000,
        )
        .await
        .unwrap();
        // Events without execution linkage survive deletes
        append(db.writer(), &NewEvent::new("error"), 1_001).await.unwrap();

        execution_store::delete(db.writer(), "exec-1").await.unwrap();

        let all = list(db.reader(), None, None, 100).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].event_type, "error");
    }
}
