// Newline-delimited JSON transport over stdin/stdout
//
// One request per line: {"id": ..., "method": ..., "params": {...}}.
// Responses echo the id with either `result` or `error`. Handler panics
// cannot happen by construction; malformed lines get an error response with
// a null id.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::{resources, tools, AppState};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Handle one decoded request
pub async fn handle_request(state: &AppState, request: Value) -> Value {
    let request: Request = match serde_json::from_value(request) {
        Ok(request) => request,
        Err(e) => {
            return json!({ "id": Value::Null, "error": format!("malformed request: {e}") })
        }
    };

    debug!(method = %request.method, "handling request");
    let result = match request.method.as_str() {
        "ping" => json!({ "ok": true }),
        "tools/list" => json!({ "tools": tools::tool_descriptors() }),
        "resources/list" => json!({ "resources": resources::resource_descriptors() }),
        "tools/call" => {
            let Some(name) = request.params["name"].as_str() else {
                return json!({ "id": request.id, "error": "params.name is required" });
            };
            let arguments = request.params["arguments"].clone();
            tools::call_tool(state, name, arguments).await
        }
        "resources/read" => {
            let Some(uri) = request.params["uri"].as_str() else {
                return json!({ "id": request.id, "error": "params.uri is required" });
            };
            resources::read_resource(state, uri).await
        }
        other => return json!({ "id": request.id, "error": format!("unknown method: {other}") }),
    };

    json!({ "id": request.id, "result": result })
}

/// Serve requests line-by-line until EOF or shutdown. Generic over the
/// streams so tests can drive it with in-memory pipes.
pub async fn serve<R, W>(
    state: AppState,
    input: R,
    mut output: W,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown requested; no longer accepting requests");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("input closed; shutting down");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<Value>(line) {
                    Ok(request) => handle_request(&state, request).await,
                    Err(e) => json!({ "id": Value::Null, "error": format!("invalid JSON: {e}") }),
                };

                let mut encoded = serde_json::to_vec(&response)?;
                encoded.push(b'\n');
                output.write_all(&encoded).await?;
                output.flush().await?;
            }
        }
    }

    Ok(())
}
