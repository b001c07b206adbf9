// Project rows
//
// Projects are discovered once and then touched whenever an execution
// references them; they are never deleted by the orchestrator.

use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::ProjectRow;

/// Input for registering a project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub path: String,
    pub is_git_repo: bool,
    pub metadata: Option<serde_json::Value>,
}

const COLUMNS: &str = "id, name, path, is_git_repo, metadata, discovered_at, last_used_at";

/// Insert or refresh a project keyed by path. Returns the row.
pub async fn upsert<'e>(
    ex: impl SqliteExecutor<'e>,
    new: &NewProject,
    now_ms: i64,
) -> Result<ProjectRow, StoreError> {
    let metadata = new
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        INSERT INTO projects (name, path, is_git_repo, metadata, discovered_at, last_used_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT(path) DO UPDATE SET
            name = ?1,
            is_git_repo = ?3,
            metadata = COALESCE(?4, metadata),
            last_used_at = ?5
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&new.name)
    .bind(&new.path)
    .bind(new.is_git_repo)
    .bind(metadata)
    .bind(now_ms)
    .fetch_one(ex)
    .await?;

    Ok(row)
}

pub async fn get<'e>(
    ex: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<ProjectRow>, StoreError> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {COLUMNS} FROM projects WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn get_by_path<'e>(
    ex: impl SqliteExecutor<'e>,
    path: &str,
) -> Result<Option<ProjectRow>, StoreError> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {COLUMNS} FROM projects WHERE path = ?1"
    ))
    .bind(path)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

/// Advance last_used_at; called when an execution references the project
pub async fn touch<'e>(
    ex: impl SqliteExecutor<'e>,
    id: i64,
    now_ms: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE projects SET last_used_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(now_ms)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list<'e>(ex: impl SqliteExecutor<'e>) -> Result<Vec<ProjectRow>, StoreError> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {COLUMNS} FROM projects ORDER BY last_used_at DESC"
    ))
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

    fn project(path: &str) -> NewProject {
        NewProject {
            name: "api".to_string(),
            path: path.to_string(),
            is_git_repo: true,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_path() {
        let db = test_db().await;
        let first = upsert(db.writer(), &project("/src/api"), 1_000).await.unwrap();
        let second = upsert(db.writer(), &project("/src/api"), 2_000).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.discovered_at, 1_000);
        assert_eq!(second.last_used_at, 2_000);

        let listed = list(db.reader()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn touch_advances_last_used() {
        let db = test_db().await;
        let row = upsert(db.writer(), &project("/src/api"), 1_000).await.unwrap();
        assert!(touch(db.writer(), row.id, 5_000).await.unwrap());
        let row = get(db.reader(), row.id).await.unwrap().unwrap();
        assert_eq!(row.last_used_at, 5_000);

        assert!(!touch(db.writer(), 999, 5_000).await.unwrap());
    }
}
