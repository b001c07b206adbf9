// Write tools: workflow.start, workflow.next_step, workflow.control
//
// Every handler returns a `{success, ...}` envelope; engine and content
// errors are folded into `{success: false, error}`. Argument validation
// happens here, before the engine is invoked.

use baton_core::{EventType, StepOutput};
use baton_engine::AdvanceOutcome;
use baton_store::telemetry_store::NewEvent;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::AppState;

pub const TOOL_START: &str = "workflow.start";
pub const TOOL_NEXT_STEP: &str = "workflow.next_step";
pub const TOOL_CONTROL: &str = "workflow.control";

/// Static descriptors for tools/list
pub fn tool_descriptors() -> Value {
    json!([
        {
            "name": TOOL_START,
            "description": "Start a workflow execution; returns the first agent persona and a continuation token",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "workflow_name": { "type": "string" },
                    "execution_id": { "type": "string" },
                    "timeout_ms": { "type": "integer" }
                },
                "required": ["workflow_name"]
            }
        },
        {
            "name": TOOL_NEXT_STEP,
            "description": "Return a continuation token with the step's output to advance the workflow",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "token": { "type": "string" },
                    "output": {
                        "type": "object",
                        "properties": {
                            "summary": { "type": "string" },
                            "artifacts": { "type": "array", "items": { "type": "string" } },
                            "findings": { "type": "array", "items": { "type": "string" } },
                            "next_step_recommendation": { "type": "string" },
                            "suggested_findings": { "type": "array" }
                        },
                        "required": ["summary"]
                    }
                },
                "required": ["token", "output"]
            }
        },
        {
            "name": TOOL_CONTROL,
            "description": "Administrative transitions: pause, resume, or abandon an execution",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "execution_id": { "type": "string" },
                    "action": { "type": "string", "enum": ["pause", "resume", "abandon"] }
                },
                "required": ["execution_id", "action"]
            }
        }
    ])
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// Dispatch a tool call by name
pub async fn call_tool(state: &AppState, name: &str, arguments: Value) -> Value {
    match name {
        TOOL_START => start(state, arguments).await,
        TOOL_NEXT_STEP => next_step(state, arguments).await,
        TOOL_CONTROL => control(state, arguments).await,
        other => failure(format!("unknown tool: {other}")),
    }
}

async fn start(state: &AppState, args: Value) -> Value {
    let Some(workflow_name) = args["workflow_name"].as_str().filter(|s| !s.trim().is_empty())
    else {
        return failure("workflow_name is required and must be non-empty");
    };
    let execution_id = match args["execution_id"].as_str() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        Some(_) => return failure("execution_id must be non-empty when supplied"),
        None => Uuid::now_v7().to_string(),
    };
    let timeout_ms = args["timeout_ms"].as_i64();

    let definition = match state.provider.get_workflow(workflow_name).await {
        Ok(Some(definition)) => definition,
        Ok(None) => return failure(format!("unknown workflow: {workflow_name}")),
        Err(e) => return failure(e),
    };

    // Resolve the first persona before any row is written so a missing agent
    // cannot strand a half-started execution
    let first_agent = match definition.first_phase() {
        Some(first) => first.agent.clone(),
        None => return failure(format!("workflow '{workflow_name}' has no startable phase")),
    };
    let agent = match state.provider.get_agent(&first_agent).await {
        Ok(Some(agent)) => agent,
        Ok(None) => return failure(format!("unknown agent: {first_agent}")),
        Err(e) => return failure(e),
    };

    match state
        .executor
        .start_workflow(&execution_id, &definition, timeout_ms, None)
        .await
    {
        Ok(outcome) => {
            info!(%execution_id, workflow = workflow_name, "workflow.start");
            json!({
                "success": true,
                "execution_id": outcome.execution_id,
                "step_name": outcome.step_name,
                "agent_name": outcome.agent_name,
                "workflow_state": outcome.workflow_state,
                "new_token": outcome.new_token,
                "agent_content": agent.content,
                "message": format!(
                    "Workflow '{}' started; complete step '{}' and return the token",
                    workflow_name, outcome.step_name
                ),
            })
        }
        Err(e) => failure(e),
    }
}

async fn next_step(state: &AppState, args: Value) -> Value {
    let Some(token) = args["token"].as_str().filter(|s| !s.trim().is_empty()) else {
        return failure("token is required");
    };
    let output: StepOutput = match serde_json::from_value(args["output"].clone()) {
        Ok(output) => output,
        Err(e) => return failure(format!("invalid output envelope: {e}")),
    };
    if output.summary.trim().is_empty() {
        return failure("output.summary is required and must be non-empty");
    }

    // Peek (shape only) to learn the execution, then load its definition;
    // authoritative token validation happens in the engine. A token that
    // fails to decode never reaches the engine, so its lifecycle row is
    // recorded here.
    let payload = match state.codec.peek(token) {
        Ok(payload) => payload,
        Err(e) => {
            state
                .telemetry
                .record(
                    NewEvent::new(EventType::TokenExpired).metadata(json!({
                        "type": "token_rejected",
                        "error": e.to_string(),
                    })),
                )
                .await;
            return failure(e);
        }
    };
    let execution = match state.state_machine.get(&payload.execution_id).await {
        Ok(Some(execution)) => execution,
        Ok(None) => {
            state
                .telemetry
                .record(NewEvent::new(EventType::Error).metadata(json!({
                    "type": "execution_not_found",
                    "execution_id": payload.execution_id,
                })))
                .await;
            return failure(format!("execution not found: {}", payload.execution_id));
        }
        Err(e) => return failure(e),
    };
    let definition = match state.provider.get_workflow(&execution.workflow_name).await {
        Ok(Some(definition)) => definition,
        Ok(None) => {
            return failure(format!(
                "workflow definition not found: {}",
                execution.workflow_name
            ))
        }
        Err(e) => return failure(e),
    };

    match state.executor.next_step(token, &output, &definition).await {
        Ok(AdvanceOutcome::Continued {
            execution_id,
            step_name,
            agent_name,
            workflow_state,
            new_token,
        }) => {
            let agent_content = match state.provider.get_agent(&agent_name).await {
                Ok(Some(agent)) => agent.content,
                Ok(None) => return failure(format!("unknown agent: {agent_name}")),
                Err(e) => return failure(e),
            };
            info!(%execution_id, step = %step_name, "workflow.next_step advanced");
            json!({
                "success": true,
                "execution_id": execution_id,
                "step_name": step_name,
                "agent_name": agent_name,
                "workflow_state": workflow_state,
                "new_token": new_token,
                "agent_content": agent_content,
            })
        }
        Ok(AdvanceOutcome::Completed {
            execution_id,
            workflow_state,
            total_steps,
            message,
        }) => {
            info!(%execution_id, total_steps, "workflow completed");
            json!({
                "success": true,
                "execution_id": execution_id,
                "workflow_state": workflow_state,
                "total_steps": total_steps,
                "message": message,
            })
        }
        Err(e) => failure(e),
    }
}

async fn control(state: &AppState, args: Value) -> Value {
    let Some(execution_id) = args["execution_id"].as_str().filter(|s| !s.trim().is_empty())
    else {
        return failure("execution_id is required");
    };
    let Some(action) = args["action"].as_str() else {
        return failure("action is required (pause|resume|abandon)");
    };

    let result = match action {
        "pause" => state.state_machine.pause(execution_id).await,
        "resume" => state.state_machine.resume(execution_id).await,
        "abandon" => state.state_machine.abandon(execution_id).await,
        other => return failure(format!("unknown action: {other} (expected pause|resume|abandon)")),
    };

    match result {
        Ok(execution) => json!({
            "success": true,
            "execution_id": execution.execution_id,
            "workflow_state": execution.state,
        }),
        Err(e) => failure(e),
    }
}
