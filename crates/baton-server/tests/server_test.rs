// End-to-end tests over the tool/resource surface with an in-memory store
// and the memory content provider

use std::sync::Arc;

use baton_core::{
    AgentDefinition, ArtifactInput, ArtifactType, Complexity, ContentType, MemoryContentProvider,
    Phase, WorkflowDefinition,
};
use baton_server::{resources, rpc, tools, AppState};
use baton_store::Database;
use serde_json::{json, Value};

fn demo_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        name: "demo".to_string(),
        description: "two-phase demo".to_string(),
        complexity: Complexity::Simple,
        tags: vec!["test".to_string()],
        keywords: vec![],
        phases: vec![
            Phase {
                phase: "plan".to_string(),
                agent: "planner".to_string(),
                description: None,
                depends_on: None,
            },
            Phase {
                phase: "build".to_string(),
                agent: "builder".to_string(),
                description: None,
                depends_on: Some("plan".to_string()),
            },
        ],
    }
}

async fn test_state() -> AppState {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();

    let provider = MemoryContentProvider::new()
        .with_workflow(demo_definition())
        .with_agent(AgentDefinition {
            name: "planner".to_string(),
            description: "plans".to_string(),
            content: "You break work into phases.".to_string(),
        })
        .with_agent(AgentDefinition {
            name: "builder".to_string(),
            description: "builds".to_string(),
            content: "You implement the plan.".to_string(),
        });

    AppState::new(db, Arc::new(provider))
}

async fn start_demo(state: &AppState, execution_id: &str) -> Value {
    tools::call_tool(
        state,
        tools::TOOL_START,
        json!({ "workflow_name": "demo", "execution_id": execution_id }),
    )
    .await
}

#[tokio::test]
async fn start_returns_token_and_persona() {
    let state = test_state().await;
    let response = start_demo(&state, "exec-1").await;

    assert_eq!(response["success"], true);
    assert_eq!(response["execution_id"], "exec-1");
    assert_eq!(response["step_name"], "plan");
    assert_eq!(response["agent_name"], "planner");
    assert_eq!(response["workflow_state"], "running");
    assert_eq!(response["agent_content"], "You break work into phases.");
    assert!(response["new_token"].as_str().unwrap().len() > 16);
}

#[tokio::test]
async fn full_run_through_the_tool_surface() {
    let state = test_state().await;
    let start = start_demo(&state, "exec-1").await;
    let t1 = start["new_token"].as_str().unwrap();

    let advanced = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": t1, "output": { "summary": "ok" } }),
    )
    .await;
    assert_eq!(advanced["success"], true);
    assert_eq!(advanced["step_name"], "build");
    assert_eq!(advanced["agent_content"], "You implement the plan.");
    let t2 = advanced["new_token"].as_str().unwrap();

    let done = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": t2, "output": { "summary": "done" } }),
    )
    .await;
    assert_eq!(done["success"], true);
    assert_eq!(done["workflow_state"], "completed");
    assert_eq!(done["message"], "Workflow completed successfully");
    assert_eq!(done["total_steps"], 2);

    // Replaying the first token is rejected with a structured error
    let replay = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": t1, "output": { "summary": "again" } }),
    )
    .await;
    assert_eq!(replay["success"], false);
    assert!(replay["error"].as_str().unwrap().contains("Token step mismatch"));
}

#[tokio::test]
async fn start_validates_arguments() {
    let state = test_state().await;

    let missing = tools::call_tool(&state, tools::TOOL_START, json!({})).await;
    assert_eq!(missing["success"], false);

    let unknown = tools::call_tool(
        &state,
        tools::TOOL_START,
        json!({ "workflow_name": "nope" }),
    )
    .await;
    assert_eq!(unknown["success"], false);
    assert!(unknown["error"].as_str().unwrap().contains("unknown workflow"));

    // Duplicate id: second call fails, envelope says so
    start_demo(&state, "exec-1").await;
    let duplicate = start_demo(&state, "exec-1").await;
    assert_eq!(duplicate["success"], false);
    assert!(duplicate["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn next_step_validates_arguments() {
    let state = test_state().await;
    let start = start_demo(&state, "exec-1").await;
    let token = start["new_token"].as_str().unwrap();

    let no_token = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "output": { "summary": "ok" } }),
    )
    .await;
    assert_eq!(no_token["success"], false);

    let no_summary = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": token, "output": {} }),
    )
    .await;
    assert_eq!(no_summary["success"], false);

    let blank_summary = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": token, "output": { "summary": "   " } }),
    )
    .await;
    assert_eq!(blank_summary["success"], false);

    let garbage = tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": "!!!", "output": { "summary": "ok" } }),
    )
    .await;
    assert_eq!(garbage["success"], false);

    // A token rejected before it reaches the engine still leaves its
    // lifecycle row
    let rejected = resources::read_resource(
        &state,
        "baton://workflow/telemetry?event_type=token_expired",
    )
    .await;
    assert_eq!(rejected["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn control_tool_drives_admin_transitions() {
    let state = test_state().await;
    start_demo(&state, "exec-1").await;

    let paused = tools::call_tool(
        &state,
        tools::TOOL_CONTROL,
        json!({ "execution_id": "exec-1", "action": "pause" }),
    )
    .await;
    assert_eq!(paused["success"], true);
    assert_eq!(paused["workflow_state"], "paused");

    let resumed = tools::call_tool(
        &state,
        tools::TOOL_CONTROL,
        json!({ "execution_id": "exec-1", "action": "resume" }),
    )
    .await;
    assert_eq!(resumed["workflow_state"], "running");

    let abandoned = tools::call_tool(
        &state,
        tools::TOOL_CONTROL,
        json!({ "execution_id": "exec-1", "action": "abandon" }),
    )
    .await;
    assert_eq!(abandoned["workflow_state"], "abandoned");

    // Terminal: a further transition is refused
    let again = tools::call_tool(
        &state,
        tools::TOOL_CONTROL,
        json!({ "execution_id": "exec-1", "action": "resume" }),
    )
    .await;
    assert_eq!(again["success"], false);
}

#[tokio::test]
async fn current_step_resource_carries_token_and_progress() {
    let state = test_state().await;
    let start = start_demo(&state, "exec-1").await;

    let body = resources::read_resource(&state, "baton://workflow/current_step/exec-1").await;
    assert_eq!(body["execution_id"], "exec-1");
    assert_eq!(body["workflow_state"], "running");
    assert_eq!(body["current_step"], "plan");
    assert_eq!(body["step_status"], "running");
    assert_eq!(body["agent_name"], "planner");
    assert_eq!(body["progress"], "1/2");
    assert_eq!(body["continuation_token"], start["new_token"]);
    assert_eq!(body["agent_content"], "You break work into phases.");

    let missing = resources::read_resource(&state, "baton://workflow/current_step/nope").await;
    assert!(missing["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn status_and_history_resources() {
    let state = test_state().await;
    let start = start_demo(&state, "exec-1").await;
    tools::call_tool(
        &state,
        tools::TOOL_NEXT_STEP,
        json!({ "token": start["new_token"], "output": { "summary": "ok" } }),
    )
    .await;

    let status = resources::read_resource(&state, "baton://workflow/workflow_status/exec-1").await;
    assert_eq!(status["state"], "running");
    assert_eq!(status["current_step"], "build");
    assert_eq!(status["steps"]["total"], 2);
    assert_eq!(status["steps"]["completed"], 1);
    assert_eq!(status["steps"]["running"], 1);

    let history = resources::read_resource(&state, "baton://workflow/step_history/exec-1").await;
    let steps = history["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["step_name"], "plan");
    assert_eq!(steps[0]["status"], "completed");
    assert!(steps[0]["output"]["summary"].as_str().is_some());
    assert_eq!(steps[1]["step_name"], "build");
    assert_eq!(steps[1]["status"], "running");
}

#[tokio::test]
async fn artifact_resources_summarize_then_fetch_content() {
    let state = test_state().await;
    start_demo(&state, "exec-1").await;

    let artifact_id = state
        .executor
        .store_artifact(
            "exec-1",
            "plan",
            &ArtifactInput {
                artifact_type: ArtifactType::Report,
                name: "plan.md".to_string(),
                content: "# The plan\ndo the thing".to_string(),
                content_type: ContentType::Markdown,
                metadata: None,
            },
        )
        .await
        .unwrap();

    let listed =
        resources::read_resource(&state, "baton://workflow/workflow_artifacts/exec-1").await;
    let artifacts = listed["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0]["name"], "plan.md");
    assert!(artifacts[0].get("content").is_none(), "summaries omit content");

    let fetched = resources::read_resource(
        &state,
        &format!("baton://workflow/artifact/{artifact_id}"),
    )
    .await;
    assert_eq!(fetched["artifact"]["name"], "plan.md");
    assert!(fetched["content"].as_str().unwrap().contains("do the thing"));

    let scoped = resources::read_resource(
        &state,
        "baton://workflow/workflow_artifacts/exec-1/build",
    )
    .await;
    assert!(scoped["artifacts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn telemetry_resource_filters_and_validates() {
    let state = test_state().await;
    start_demo(&state, "exec-1").await;

    let events =
        resources::read_resource(&state, "baton://workflow/telemetry/exec-1").await;
    assert!(!events["events"].as_array().unwrap().is_empty());

    let filtered = resources::read_resource(
        &state,
        "baton://workflow/telemetry/exec-1?event_type=token_generated&limit=5",
    )
    .await;
    let filtered_events = filtered["events"].as_array().unwrap();
    assert_eq!(filtered_events.len(), 1);
    assert_eq!(filtered_events[0]["event_type"], "token_generated");

    let bad_limit =
        resources::read_resource(&state, "baton://workflow/telemetry?limit=lots").await;
    assert!(bad_limit["error"].as_str().unwrap().contains("invalid limit"));

    let bad_param =
        resources::read_resource(&state, "baton://workflow/telemetry?foo=bar").await;
    assert!(bad_param["error"].as_str().unwrap().contains("unknown query parameter"));
}

#[tokio::test]
async fn unknown_resources_return_structured_errors() {
    let state = test_state().await;

    let wrong_scheme = resources::read_resource(&state, "other://workflow/telemetry").await;
    assert!(wrong_scheme["error"].as_str().is_some());

    let unknown = resources::read_resource(&state, "baton://workflow/nope/path").await;
    assert!(unknown["error"].as_str().unwrap().contains("unknown resource path"));
}

#[tokio::test]
async fn workflow_catalog_resources() {
    let state = test_state().await;

    let listed = resources::read_resource(&state, "baton://workflow/available_workflows").await;
    let workflows = listed["workflows"].as_array().unwrap();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0]["name"], "demo");
    assert_eq!(workflows[0]["phases"].as_array().unwrap().len(), 2);

    let details = resources::read_resource(&state, "baton://workflow/workflow_details/demo").await;
    assert_eq!(details["definition"]["name"], "demo");
    let agents = details["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 2);
}

#[tokio::test]
async fn rpc_envelope_round_trips() {
    let state = test_state().await;

    let response = rpc::handle_request(
        &state,
        json!({
            "id": 7,
            "method": "tools/call",
            "params": { "name": "workflow.start", "arguments": { "workflow_name": "demo" } }
        }),
    )
    .await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["result"]["success"], true);
    let execution_id = response["result"]["execution_id"].as_str().unwrap().to_string();

    let read = rpc::handle_request(
        &state,
        json!({
            "id": 8,
            "method": "resources/read",
            "params": { "uri": format!("baton://workflow/workflow_status/{execution_id}") }
        }),
    )
    .await;
    assert_eq!(read["id"], 8);
    assert_eq!(read["result"]["state"], "running");

    let unknown = rpc::handle_request(&state, json!({ "id": 9, "method": "nope" })).await;
    assert!(unknown["error"].as_str().unwrap().contains("unknown method"));

    let listing = rpc::handle_request(&state, json!({ "id": 10, "method": "tools/list" })).await;
    assert_eq!(listing["result"]["tools"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn serve_loop_answers_over_in_memory_pipe() {
    let state = test_state().await;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let input = b"{\"id\":1,\"method\":\"ping\"}\nnot json\n".to_vec();
    let mut output: Vec<u8> = Vec::new();

    rpc::serve(state, &input[..], &mut output, shutdown_rx)
        .await
        .unwrap();
    drop(shutdown_tx);

    let lines: Vec<&str> = std::str::from_utf8(&output)
        .unwrap()
        .lines()
        .collect();
    assert_eq!(lines.len(), 2);
    let first: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["result"]["ok"], true);
    let second: Value = serde_json::from_str(lines[1]).unwrap();
    assert!(second["error"].as_str().unwrap().contains("invalid JSON"));
}
