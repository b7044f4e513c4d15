//! Request routing: `(protocol, task.kind)` → handler → one reply.
//!
//! Only an unparseable request is an `Err` (see `parse_request`). Once a JSON
//! object is in hand, `dispatch` always produces a reply body; the exit code
//! carries failure out-of-band.

use serde::Serialize;
use serde_json::Value;

use crate::augment::augment_proposals;
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::protocol::{AnswerResponseV1, PluginProtocol, PluginResponseV2, PluginTaskV2, LLM_TASK_KINDS};
use crate::query_payload::build_query_payload;
use crate::tool_loop::{result_rows, summarize_result_rows, tool_loop_step};
use crate::world_model::{
    backend_for, default_trace_id, run_world_model, world_model_error_response, WorldModelRequestV1,
    WorldModelResponseV1,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PluginReplyBody {
    Llm(PluginResponseV2),
    WorldModel(WorldModelResponseV1),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginReply {
    pub body: PluginReplyBody,
    pub exit_code: i32,
}

impl PluginReply {
    fn llm(body: PluginResponseV2) -> Self {
        Self {
            body: PluginReplyBody::Llm(body),
            exit_code: 0,
        }
    }
}

/// Parse one request. Empty input, invalid JSON and non-object values are `MalformedInput`.
pub fn parse_request(text: &str) -> Result<Value, PluginError> {
    if text.trim().is_empty() {
        return Err(PluginError::MalformedInput(
            "expected JSON request on stdin".to_string(),
        ));
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| PluginError::MalformedInput(format!("invalid JSON request: {e}")))?;
    if !value.is_object() {
        return Err(PluginError::MalformedInput(
            "request must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

pub fn dispatch(request: &Value, config: &PluginConfig, now_unix_secs: u64) -> PluginReply {
    let protocol = request
        .get("protocol")
        .and_then(Value::as_str)
        .and_then(PluginProtocol::from_name);
    let trace_id = request.get("trace_id").and_then(Value::as_str).unwrap_or("");

    let Some(protocol) = protocol else {
        tracing::info!(trace_id, "unsupported protocol");
        return PluginReply::llm(PluginResponseV2::error(
            PluginError::UnsupportedProtocol.to_string(),
        ));
    };

    if !protocol.is_llm() {
        tracing::info!(protocol = protocol.as_str(), trace_id, "dispatch");
        return handle_world_model(request, config, now_unix_secs);
    }

    let response = match parse_llm_task(request) {
        Ok(task) => {
            tracing::info!(protocol = protocol.as_str(), kind = task.kind(), trace_id, "dispatch");
            run_llm_task(task, &config.backend_label)
        }
        Err(e) => {
            tracing::info!(protocol = protocol.as_str(), trace_id, error = %e, "rejected task");
            PluginResponseV2::error(e.to_string())
        }
    };
    PluginReply::llm(response)
}

/// Extract the `task` of an LLM-protocol request.
///
/// An unrecognized kind is `UnknownTaskKind`; a recognized kind whose fields
/// have the wrong shape is `InvalidTask`.
pub fn parse_llm_task(request: &Value) -> Result<PluginTaskV2, PluginError> {
    let task = request.get("task").unwrap_or(&Value::Null);
    let kind = match task.get("kind") {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if !LLM_TASK_KINDS.contains(&kind.as_str()) {
        return Err(PluginError::UnknownTaskKind(kind));
    }
    serde_json::from_value(task.clone()).map_err(|e| PluginError::InvalidTask {
        kind,
        message: e.to_string(),
    })
}

pub fn run_llm_task(task: PluginTaskV2, backend_label: &str) -> PluginResponseV2 {
    match task {
        PluginTaskV2::ToQuery { question } => {
            let question = question.unwrap_or_default();
            PluginResponseV2::Query(build_query_payload(question.trim()))
        }
        PluginTaskV2::Answer { results, .. } => PluginResponseV2::Answer(AnswerResponseV1 {
            answer: summarize_result_rows(result_rows(Some(&results))),
        }),
        PluginTaskV2::AugmentProposals { proposals } => {
            PluginResponseV2::Augment(augment_proposals(&proposals))
        }
        PluginTaskV2::ToolLoopStep {
            question,
            transcript,
        } => PluginResponseV2::ToolLoop(tool_loop_step(
            question.as_deref().unwrap_or(""),
            transcript.as_deref().unwrap_or(&[]),
            backend_label,
        )),
    }
}

fn handle_world_model(request: &Value, config: &PluginConfig, now_unix_secs: u64) -> PluginReply {
    let outcome = serde_json::from_value::<WorldModelRequestV1>(request.clone())
        .map_err(|e| PluginError::MalformedInput(format!("invalid world model request: {e}")))
        .and_then(|req| {
            let wm_config = config.world_model.as_ref().map_err(PluginError::clone)?;
            let backend = backend_for(wm_config);
            run_world_model(&req, backend.as_ref(), now_unix_secs)
        });

    match outcome {
        Ok(response) => PluginReply {
            body: PluginReplyBody::WorldModel(response),
            exit_code: 0,
        },
        Err(e) => {
            let trace_id = request
                .get("trace_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_trace_id(now_unix_secs));
            tracing::warn!(trace_id = %trace_id, error = %e, "world model request failed");
            PluginReply {
                body: PluginReplyBody::WorldModel(world_model_error_response(
                    &trace_id,
                    now_unix_secs,
                    &e,
                )),
                exit_code: e.exit_code(),
            }
        }
    }
}
