// Knowledge findings with full-text search
//
// Findings outlive executions. The FTS5 index is maintained entirely by
// triggers (see migrations); every function here reads or writes the base
// table only. Result ordering is severity first, newest second.

use baton_core::{FindingCategory, FindingScope, FindingStatus, KnowledgeFindingInput, Severity};
use sqlx::SqliteExecutor;

use crate::error::StoreError;
use crate::models::FindingRow;

const COLUMNS: &str = "k.id, k.scope, k.project_id, k.category, k.severity, k.status, \
     k.title, k.content, k.tags, k.source_execution_id, k.source_agent, k.created_at, k.updated_at";

/// Severity text to rank, inlined into ORDER BY
const SEVERITY_RANK: &str = "CASE k.severity \
     WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 \
     WHEN 'low' THEN 1 ELSE 0 END";

/// Filters for querying findings. Empty filters match everything active
/// and inactive alike; set `status` to narrow.
#[derive(Debug, Clone, Default)]
pub struct FindingQuery {
    pub scope: Option<FindingScope>,
    pub project_id: Option<i64>,
    pub category: Option<FindingCategory>,
    pub severity: Option<Severity>,
    pub status: Option<FindingStatus>,
    /// Free-text search over title, content, and tags via the FTS index
    pub text: Option<String>,
    pub limit: Option<i64>,
}

/// Partial update; at least one field must be set
#[derive(Debug, Clone, Default)]
pub struct FindingPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<FindingCategory>,
    pub severity: Option<Severity>,
    pub status: Option<FindingStatus>,
    pub tags: Option<Vec<String>>,
}

impl FindingPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.severity.is_none()
            && self.status.is_none()
            && self.tags.is_none()
    }
}

/// Escape caller text into an FTS5 match expression: each whitespace-separated
/// term becomes a quoted token, terms AND together. Keeps user input from
/// being parsed as FTS syntax.
fn fts_match_expr(text: &str) -> String {
    text.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert a finding. Returns the row id.
pub async fn insert<'e>(
    ex: impl SqliteExecutor<'e>,
    input: &KnowledgeFindingInput,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let tags = if input.tags.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&input.tags)?)
    };

    let result = sqlx::query(
        r#"
        INSERT INTO knowledge_findings
            (scope, project_id, category, severity, status, title, content, tags,
             source_execution_id, source_agent, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        "#,
    )
    .bind(input.scope.to_string())
    .bind(input.project_id)
    .bind(input.category.to_string())
    .bind(input.severity.to_string())
    .bind(&input.title)
    .bind(&input.content)
    .bind(tags)
    .bind(&input.source_execution_id)
    .bind(&input.source_agent)
    .bind(now_ms)
    .execute(ex)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get<'e>(
    ex: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<FindingRow>, StoreError> {
    let row = sqlx::query_as::<_, FindingRow>(&format!(
        "SELECT {COLUMNS} FROM knowledge_findings k WHERE k.id = ?1"
    ))
    .bind(id)
    .fetch_optional(ex)
    .await?;

    Ok(row)
}

/// Apply a patch. Fails with EmptyPatch when nothing is set; returns false
/// when the row does not exist. `updated_at` advances via trigger.
pub async fn update<'e>(
    ex: impl SqliteExecutor<'e>,
    id: i64,
    patch: &FindingPatch,
) -> Result<bool, StoreError> {
    if patch.is_empty() {
        return Err(StoreError::EmptyPatch);
    }

    let tags = patch.tags.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE knowledge_findings
        SET title = COALESCE(?2, title),
            content = COALESCE(?3, content),
            category = COALESCE(?4, category),
            severity = COALESCE(?5, severity),
            status = COALESCE(?6, status),
            tags = COALESCE(?7, tags)
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(&patch.title)
    .bind(&patch.content)
    .bind(patch.category.map(|c| c.to_string()))
    .bind(patch.severity.map(|s| s.to_string()))
    .bind(patch.status.map(|s| s.to_string()))
    .bind(tags)
    .execute(ex)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a finding deprecated. Returns false when the row does not exist.
pub async fn deprecate<'e>(ex: impl SqliteExecutor<'e>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE knowledge_findings SET status = 'deprecated' WHERE id = ?1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete<'e>(ex: impl SqliteExecutor<'e>, id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM knowledge_findings WHERE id = ?1")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Query findings by filters, most severe first, newest second
pub async fn query<'e>(
    ex: impl SqliteExecutor<'e>,
    q: &FindingQuery,
) -> Result<Vec<FindingRow>, StoreError> {
    let mut builder = sqlx::QueryBuilder::new(format!("SELECT {COLUMNS} FROM knowledge_findings k"));

    if q.text.is_some() {
        builder.push(" JOIN knowledge_findings_fts ON knowledge_findings_fts.rowid = k.id");
    }
    builder.push(" WHERE 1=1");

    if let Some(text) = &q.text {
        builder
            .push(" AND knowledge_findings_fts MATCH ")
            .push_bind(fts_match_expr(text));
    }
    if let Some(scope) = q.scope {
        builder.push(" AND k.scope = ").push_bind(scope.to_string());
    }
    if let Some(project_id) = q.project_id {
        builder.push(" AND k.project_id = ").push_bind(project_id);
    }
    if let Some(category) = q.category {
        builder.push(" AND k.category = ").push_bind(category.to_string());
    }
    if let Some(severity) = q.severity {
        builder.push(" AND k.severity = ").push_bind(severity.to_string());
    }
    if let Some(status) = q.status {
        builder.push(" AND k.status = ").push_bind(status.to_string());
    }

    builder.push(format!(" ORDER BY {SEVERITY_RANK} DESC, k.created_at DESC"));
    if let Some(limit) = q.limit {
        builder.push(" LIMIT ").push_bind(limit.max(1));
    }

    let rows = builder.build_query_as::<FindingRow>().fetch_all(ex).await?;
    Ok(rows)
}

/// Active findings applicable to a project: its own project-scoped findings
/// plus everything system-scoped
pub async fn project_findings<'e>(
    ex: impl SqliteExecutor<'e>,
    project_id: i64,
) -> Result<Vec<FindingRow>, StoreError> {
    let rows = sqlx::query_as::<_, FindingRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM knowledge_findings k
        WHERE k.status = 'active'
          AND ((k.scope = 'project' AND k.project_id = ?1) OR k.scope = 'system')
        ORDER BY {SEVERITY_RANK} DESC, k.created_at DESC
        "#
    ))
    .bind(project_id)
    .fetch_all(ex)
    .await?;

    Ok(rows)
}

/// Active global-scope findings
pub async fn global_findings<'e>(
    ex: impl SqliteExecutor<'e>,
) -> Result<Vec<FindingRow>, StoreError> {
    let rows = sqlx::query_as::<_, FindingRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM knowledge_findings k
        WHERE k.status = 'active' AND k.scope = 'global'
        ORDER BY {SEVERITY_RANK} DESC, k.created_at DESC
        "#
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

    fn finding(title: &str, content: &str, severity: Severity) -> KnowledgeFindingInput {
        KnowledgeFindingInput {
            scope: FindingScope::Global,
            project_id: None,
            category: FindingCategory::Security,
            severity,
            title: title.to_string(),
            content: content.to_string(),
            tags: vec!["credentials".to_string()],
            source_execution_id: None,
            source_agent: None,
        }
    }

    #[tokio::test]
    async fn full_text_search_finds_title_content_and_tags() {
        let db = test_db().await;
        let id = insert(
            db.writer(),
            &finding(
                "Hardcoded credential",
                "Detected API key in config.yaml",
                Severity::High,
            ),
            1_000,
        )
        .await
        .unwrap();

        for text in ["api key", "hardcoded", "credentials", "config.yaml"] {
            let hits = query(
                db.reader(),
                &FindingQuery {
                    text: Some(text.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            assert_eq!(hits.len(), 1, "text {:?} should match", text);
            assert_eq!(hits[0].id, id);
        }

        let miss = query(
            db.reader(),
            &FindingQuery {
                text: Some("kubernetes".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn deprecated_findings_drop_out_of_active_queries() {
        let db = test_db().await;
        let id = insert(
            db.writer(),
            &finding("Hardcoded credential", "Detected API key in config.yaml", Severity::High),
            1_000,
        )
        .await
        .unwrap();

        assert!(deprecate(db.writer(), id).await.unwrap());

        let hits = query(
            db.reader(),
            &FindingQuery {
                status: Some(FindingStatus::Active),
                text: Some("api key".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(hits.is_empty());

        // Still present without the status filter
        let hits = query(
            db.reader(),
            &FindingQuery {
                text: Some("api key".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, "deprecated");
    }

    #[tokio::test]
    async fn ordering_is_severity_then_recency() {
        let db = test_db().await;
        insert(db.writer(), &finding("low old", "body one", Severity::Low), 1_000)
            .await
            .unwrap();
        insert(db.writer(), &finding("critical", "body two", Severity::Critical), 2_000)
            .await
            .unwrap();
        insert(db.writer(), &finding("low new", "body three", Severity::Low), 3_000)
            .await
            .unwrap();

        let hits = query(db.reader(), &FindingQuery::default()).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["critical", "low new", "low old"]);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_and_update_advances_row() {
        let db = test_db().await;
        let id = insert(
            db.writer(),
            &finding("title", "content", Severity::Medium),
            1_000,
        )
        .await
        .unwrap();

        assert!(matches!(
            update(db.writer(), id, &FindingPatch::default()).await,
            Err(StoreError::EmptyPatch)
        ));

        let changed = update(
            db.writer(),
            id,
            &FindingPatch {
                severity: Some(Severity::Critical),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(changed);

        let row = get(db.reader(), id).await.unwrap().unwrap();
        assert_eq!(row.severity, "critical");
        // FTS row followed the update
        let hits = query(
            db.reader(),
            &FindingQuery {
                text: Some("content".to_string()),
                severity: Some(Severity::Critical),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn project_scope_requires_project_id() {
        let db = test_db().await;
        let mut input = finding("project finding", "body", Severity::Info);
        input.scope = FindingScope::Project;
        // project_id is None: the CHECK constraint refuses the row
        let err = insert(db.writer(), &input, 1_000).await.unwrap_err();
        assert!(err.is_check_violation());
    }

    #[tokio::test]
    async fn fts_stays_consistent_under_update_and_delete() {
        let db = test_db().await;
        let id = insert(
            db.writer(),
            &finding("rotate keys", "rotate the deploy keys", Severity::Medium),
            1_000,
        )
        .await
        .unwrap();

        update(
            db.writer(),
            id,
            &FindingPatch {
                content: Some("rotate the signing keys".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Exactly one FTS row per base row
        let fts_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_findings_fts WHERE rowid = ?1")
                .bind(id)
                .fetch_one(db.reader())
                .await
                .unwrap();
        assert_eq!(fts_count, 1);

        // Old text no longer matches, new text does
        let old = query(
            db.reader(),
            &FindingQuery { text: Some("deploy".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        assert!(old.is_empty());
        let new = query(
            db.reader(),
            &FindingQuery { text: Some("signing".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(new.len(), 1);

        delete(db.writer(), id).await.unwrap();
        let fts_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_findings_fts WHERE rowid = ?1")
                .bind(id)
                .fetch_one(db.reader())
                .await
                .unwrap();
        assert_eq!(fts_count, 0);
    }

    #[tokio::test]
    async fn project_findings_include_system_scope() {
        let db = test_db().await;
        crate::project_store::upsert(
            db.writer(),
            &crate::project_store::NewProject {
                name: "api".to_string(),
                path: "/src/api".to_string(),
                is_git_repo: true,
                metadata: None,
            },
            1_000,
        )
        .await
        .unwrap();

        let mut project_scoped = finding("api: missing auth", "no auth on admin route", Severity::High);
        project_scoped.scope = FindingScope::Project;
        project_scoped.project_id = Some(1);
        insert(db.writer(), &project_scoped, 1_000).await.unwrap();

        let mut system_scoped = finding("pin toolchain", "builds drift", Severity::Low);
        system_scoped.scope = FindingScope::System;
        insert(db.writer(), &system_scoped, 1_100).await.unwrap();

        // Global findings are not part of a project view
        insert(db.writer(), &finding("global", "body", Severity::Critical), 1_200)
            .await
            .unwrap();

        let hits = project_findings(db.reader(), 1).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["api: missing auth", "pin toolchain"]);

        let global = global_findings(db.reader()).await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].title, "global");
    }
}
