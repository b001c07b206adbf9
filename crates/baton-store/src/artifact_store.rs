// Artifact rows
//
// Artifacts are insert-only; they disappear only when their execution is
// deleted. Listings never select the content column, which can be large.

use baton_core::ArtifactInput;
use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::{ArtifactRow, ArtifactSummaryRow};

const SUMMARY_COLUMNS: &str = "id, execution_id, step_name, artifact_type, name, \
     content_type, size_bytes, metadata, created_at";

/// Insert an artifact. Returns the row id. `size_bytes` is derived from the
/// stored content (base64 length for binary payloads).
pub async fn insert<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
    step_name: &str,
    input: &ArtifactInput,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let metadata = input
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO workflow_artifacts
            (execution_id, step_name, artifact_type, name, content, content_type, size_bytes, metadata, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(execution_id)
    .bind(step_name)
    .bind(input.artifact_type.to_string())
    .bind(&input.name)
    .bind(&input.content)
    .bind(input.content_type.to_string())
    .bind(input.content.len() as i64)
    .bind(metadata)
    .bind(now_ms)
    .execute(ex)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Fetch one artifact including its content
pub async fn get<'e>(
    ex: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<ArtifactRow>, StoreError> {
    let row = sqlx::query_as::<_, ArtifactRow>(
        "SELECT id, execution_id, step_name, artifact_type, name, content, content_type, \
         size_bytes, metadata, created_at FROM workflow_artifacts WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(ex)
    .await?;

    Ok(row)
}

/// Artifact summaries for an execution, optionally narrowed to one step
pub async fn list_for_execution<'e>(
    ex: impl SqliteExecutor<'e>,
    execution_id: &str,
    step_name: Option<&str>,
) -> Result<Vec<ArtifactSummaryRow>, StoreError> {
    let rows = match step_name {
        Some(step) => {
            sqlx::query_as::<_, ArtifactSummaryRow>(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM workflow_artifacts \
                 WHERE execution_id = ?1 AND step_name = ?2 ORDER BY id"
            ))
            .bind(execution_id)
            .bind(step)
            .fetch_all(ex)
            .await?
        }
        None => {
            sqlx::query_as::<_, ArtifactSummaryRow>(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM workflow_artifacts \
                 WHERE execution_id = ?1 ORDER BY id"
            ))
            .bind(execution_id)
            .fetch_all(ex)
            .await?
        }
    };

    Ok(rows)
}
