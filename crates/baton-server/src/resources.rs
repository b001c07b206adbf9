// Read resources: projections over the store for external callers
//
// URIs use the scheme baton://workflow/{resource}[/{id}[/{step}]][?params].
// Every handler returns a JSON body; unknown paths, missing executions, and
// invalid arguments come back as `{"error": ...}` payloads.

use baton_store::telemetry_store::TELEMETRY_LIMIT_DEFAULT;
use baton_store::{artifact_store, knowledge_store, project_store, step_store, telemetry_store};
use serde_json::{json, Value};

use crate::AppState;

pub const URI_PREFIX: &str = "baton://workflow/";

/// Static descriptors for resources/list
pub fn resource_descriptors() -> Value {
    json!([
        { "uri": "baton://workflow/available_workflows", "description": "All workflow definitions with phases" },
        { "uri": "baton://workflow/workflow_details/{name}", "description": "One workflow definition including agent personas" },
        { "uri": "baton://workflow/current_step/{execution_id}", "description": "The pending step, its token, and the agent persona" },
        { "uri": "baton://workflow/workflow_status/{execution_id}", "description": "Execution state and step counts" },
        { "uri": "baton://workflow/step_history/{execution_id}", "description": "All steps of an execution in order" },
        { "uri": "baton://workflow/workflow_artifacts/{execution_id}[/{step_name}]", "description": "Artifact summaries for an execution" },
        { "uri": "baton://workflow/artifact/{id}", "description": "One artifact including content" },
        { "uri": "baton://workflow/telemetry[/{execution_id}]?event_type=&limit=", "description": "Recent telemetry events" },
        { "uri": "baton://workflow/knowledge/project/{id}", "description": "Project plus applicable findings" },
        { "uri": "baton://workflow/knowledge/global", "description": "Active global-scope findings" }
    ])
}

fn error(message: impl std::fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}

/// Parse `a=b&c=d` query strings into pairs
fn parse_query(query: &str) -> Vec<(&str, &str)> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

/// Read a resource by URI; never raises
pub async fn read_resource(state: &AppState, uri: &str) -> Value {
    let Some(rest) = uri.strip_prefix(URI_PREFIX) else {
        return error(format!("unknown resource uri: {uri}"));
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, query),
        None => (rest, ""),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let result = match segments.as_slice() {
        ["available_workflows"] => available_workflows(state).await,
        ["workflow_details", name] => workflow_details(state, name).await,
        ["current_step", execution_id] => current_step(state, execution_id).await,
        ["workflow_status", execution_id] => workflow_status(state, execution_id).await,
        ["step_history", execution_id] => step_history(state, execution_id).await,
        ["workflow_artifacts", execution_id] => artifacts(state, execution_id, None).await,
        ["workflow_artifacts", execution_id, step_name] => {
            artifacts(state, execution_id, Some(step_name)).await
        }
        ["artifact", id] => artifact_content(state, id).await,
        ["telemetry"] => telemetry(state, None, query).await,
        ["telemetry", execution_id] => telemetry(state, Some(execution_id), query).await,
        ["knowledge", "global"] => knowledge_global(state).await,
        ["knowledge", "project", id] => knowledge_project(state, id).await,
        _ => Err(format!("unknown resource path: {path}")),
    };

    result.unwrap_or_else(error)
}

async fn available_workflows(state: &AppState) -> Result<Value, String> {
    let summaries = state
        .provider
        .list_workflows()
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "workflows": summaries }))
}

async fn workflow_details(state: &AppState, name: &str) -> Result<Value, String> {
    let definition = state
        .provider
        .get_workflow(name)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("unknown workflow: {name}"))?;

    // Resolve each distinct persona so the caller sees the full content
    let mut agents = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for phase in &definition.phases {
        if seen.insert(phase.agent.clone()) {
            if let Some(agent) = state
                .provider
                .get_agent(&phase.agent)
                .await
                .map_err(|e| e.to_string())?
            {
                agents.push(agent);
            }
        }
    }

    Ok(json!({ "definition": definition, "agents": agents }))
}

async fn current_step(state: &AppState, execution_id: &str) -> Result<Value, String> {
    let execution = state
        .state_machine
        .get(execution_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("execution not found: {execution_id}"))?;

    let Some(step_name) = execution.current_step.clone() else {
        return Ok(json!({
            "execution_id": execution.execution_id,
            "workflow_name": execution.workflow_name,
            "workflow_state": execution.state,
            "current_step": Value::Null,
            "message": "execution has no active step",
        }));
    };

    let step = step_store::get(state.db.reader(), execution_id, &step_name)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("step not found: {step_name}"))?;

    let definition = state
        .provider
        .get_workflow(&execution.workflow_name)
        .await
        .map_err(|e| e.to_string())?;
    let progress = definition.as_ref().and_then(|d| {
        d.phase_index(&step_name)
            .map(|i| format!("{}/{}", i, d.phase_count()))
    });

    let agent_content = match state
        .provider
        .get_agent(&step.agent_name)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(agent) => Value::String(agent.content),
        None => Value::Null,
    };

    Ok(json!({
        "execution_id": execution.execution_id,
        "workflow_name": execution.workflow_name,
        "workflow_state": execution.state,
        "current_step": step_name,
        "step_status": step.status,
        "agent_name": step.agent_name,
        "progress": progress,
        "continuation_token": step.token,
        "agent_content": agent_content,
        "instructions": "Perform this step's work using the agent persona, then call workflow.next_step with the continuation token and an output summary.",
    }))
}

async fn workflow_status(state: &AppState, execution_id: &str) -> Result<Value, String> {
    let execution = state
        .state_machine
        .get(execution_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("execution not found: {execution_id}"))?;

    let counts = step_store::counts(state.db.reader(), execution_id)
        .await
        .map_err(|e| e.to_string())?;

    Ok(json!({
        "execution_id": execution.execution_id,
        "workflow_name": execution.workflow_name,
        "state": execution.state,
        "current_step": execution.current_step,
        "started_at": execution.started_at,
        "updated_at": execution.updated_at,
        "completed_at": execution.completed_at,
        "duration_ms": execution.duration_ms,
        "steps": {
            "total": counts.total,
            "completed": counts.completed,
            "failed": counts.failed,
            "running": counts.running,
            "pending": counts.pending,
        },
    }))
}

async fn step_history(state: &AppState, execution_id: &str) -> Result<Value, String> {
    state
        .state_machine
        .get(execution_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("execution not found: {execution_id}"))?;

    let rows = step_store::list_for_execution(state.db.reader(), execution_id)
        .await
        .map_err(|e| e.to_string())?;
    let steps: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok(json!({ "execution_id": execution_id, "steps": steps }))
}

async fn artifacts(
    state: &AppState,
    execution_id: &str,
    step_name: Option<&str>,
) -> Result<Value, String> {
    state
        .state_machine
        .get(execution_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("execution not found: {execution_id}"))?;

    let rows = artifact_store::list_for_execution(state.db.reader(), execution_id, step_name)
        .await
        .map_err(|e| e.to_string())?;
    let artifacts: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok(json!({ "execution_id": execution_id, "artifacts": artifacts }))
}

async fn artifact_content(state: &AppState, id: &str) -> Result<Value, String> {
    let id: i64 = id.parse().map_err(|_| format!("invalid artifact id: {id}"))?;
    let row = artifact_store::get(state.db.reader(), id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("artifact not found: {id}"))?;
    let (artifact, content) = row.into_model().map_err(|e| e.to_string())?;

    Ok(json!({ "artifact": artifact, "content": content }))
}

async fn telemetry(
    state: &AppState,
    execution_id: Option<&str>,
    query: &str,
) -> Result<Value, String> {
    let mut event_type = None;
    let mut limit = TELEMETRY_LIMIT_DEFAULT;
    for (key, value) in parse_query(query) {
        match key {
            "event_type" => event_type = Some(value.to_string()),
            "limit" => {
                limit = value
                    .parse()
                    .map_err(|_| format!("invalid limit: {value}"))?;
            }
            other => return Err(format!("unknown query parameter: {other}")),
        }
    }

    let rows = telemetry_store::list(
        state.db.reader(),
        execution_id,
        event_type.as_deref(),
        limit,
    )
    .await
    .map_err(|e| e.to_string())?;
    let events: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok(json!({ "events": events }))
}

async fn knowledge_global(state: &AppState) -> Result<Value, String> {
    let rows = knowledge_store::global_findings(state.db.reader())
        .await
        .map_err(|e| e.to_string())?;
    let findings: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok(json!({ "findings": findings }))
}

async fn knowledge_project(state: &AppState, id: &str) -> Result<Value, String> {
    let id: i64 = id.parse().map_err(|_| format!("invalid project id: {id}"))?;
    let project = project_store::get(state.db.reader(), id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("project not found: {id}"))?
        .into_model()
        .map_err(|e| e.to_string())?;

    let rows = knowledge_store::project_findings(state.db.reader(), id)
        .await
        .map_err(|e| e.to_string())?;
    let findings: Vec<_> = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    Ok(json!({ "project": project, "findings": findings }))
}
