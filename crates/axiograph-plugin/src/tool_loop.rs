//! Tool-loop step (`axiograph_llm_plugin_v3`, task `tool_loop_step`).
//!
//! The host owns the loop: it calls the plugin, executes any returned tool
//! call, appends `{tool, args, result}` to the transcript and calls again.
//! The plugin holds no state between calls; which step we are on is decided
//! by the transcript alone:
//!
//! - empty transcript → one `axql_run` tool call built by `build_query_payload`
//! - last entry is an `axql_run` result → grounded `final_answer` (a missing
//!   or empty result reads as no rows)
//! - anything else → a generic `final_answer` ("Done.")
//!
//! So an ask ends after at most two plugin calls, and a tool call is never
//! emitted once the transcript is non-empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query_ir::QueryIrV1;
use crate::query_payload::build_query_payload;

pub const AXQL_RUN_TOOL: &str = "axql_run";

/// Row limit requested from the host for `axql_run`.
pub const AXQL_RUN_ROW_LIMIT: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLoopTranscriptItemV1 {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Value,
}

/// A transcript entry as replayed by the host.
///
/// Anything that is not a `{tool, ...}` object is kept as `Other` so that a
/// garbled transcript still ends the ask instead of failing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolLoopTranscriptEntryV1 {
    Item(ToolLoopTranscriptItemV1),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxqlRunArgsV1 {
    pub query_ir_v1: QueryIrV1,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallV1 {
    pub name: String,
    pub args: AxqlRunArgsV1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLoopFinalV1 {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// What the plugin asks the host to do next.
///
/// Serializes as `{"tool_call": {...}}` or `{"final_answer": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolLoopActionV1 {
    ToolCall(ToolCallV1),
    FinalAnswer(ToolLoopFinalV1),
}

pub fn tool_loop_step(
    question: &str,
    transcript: &[ToolLoopTranscriptEntryV1],
    backend_label: &str,
) -> ToolLoopActionV1 {
    let Some(last) = transcript.last() else {
        let payload = build_query_payload(question.trim());
        return ToolLoopActionV1::ToolCall(ToolCallV1 {
            name: AXQL_RUN_TOOL.to_string(),
            args: AxqlRunArgsV1 {
                query_ir_v1: payload.query_ir_v1,
                limit: AXQL_RUN_ROW_LIMIT,
            },
        });
    };

    let notes = vec![format!("backend={backend_label} (deterministic)")];

    if let ToolLoopTranscriptEntryV1::Item(item) = last {
        let empty = Map::new();
        let result = match &item.result {
            Value::Object(result) => Some(result),
            other if is_blank(other) => Some(&empty),
            _ => None,
        };
        if let Some(result) = result.filter(|_| item.tool == AXQL_RUN_TOOL) {
            let query_text = result
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let rows = result_rows(result.get("results"));
            return ToolLoopActionV1::FinalAnswer(ToolLoopFinalV1 {
                answer: summarize_result_rows(rows),
                citations: Vec::new(),
                queries: if query_text.is_empty() {
                    Vec::new()
                } else {
                    vec![query_text]
                },
                notes,
            });
        }
    }

    tracing::debug!(
        entries = transcript.len(),
        "tool loop: unexpected transcript shape, ending ask"
    );
    ToolLoopActionV1::FinalAnswer(ToolLoopFinalV1 {
        answer: "Done.".to_string(),
        citations: Vec::new(),
        queries: Vec::new(),
        notes,
    })
}

/// Null, `false`, zero and empty strings/collections stand for "no result".
fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// `results.rows`, or nothing if `results` is absent or not shaped like that.
pub fn result_rows(results: Option<&Value>) -> &[Value] {
    results
        .and_then(|r| r.get("rows"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `Found <n> result rows.` plus the first row's entity bindings.
pub fn summarize_result_rows(rows: &[Value]) -> String {
    let mut msg = format!("Found {} result rows.", rows.len());
    let Some(Value::Object(first)) = rows.first() else {
        return msg;
    };

    let parts: Vec<String> = first
        .iter()
        .filter_map(|(var, v)| {
            let v = v.as_object()?;
            let id = render_scalar(v.get("id")?);
            let entity_type = v
                .get("entity_type")
                .filter(|t| !t.is_null())
                .map(render_scalar)
                .unwrap_or_else(|| "unknown".to_string());
            let name = v
                .get("name")
                .filter(|n| !n.is_null())
                .map(render_scalar)
                .filter(|n| !n.is_empty());
            Some(match name {
                Some(name) => format!("{var}={name} ({entity_type}, id={id})"),
                None => format!("{var}={entity_type} (id={id})"),
            })
        })
        .collect();

    if !parts.is_empty() {
        msg.push_str(" First row: ");
        msg.push_str(&parts.join(", "));
    }
    msg
}

fn render_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(v: Value) -> Vec<ToolLoopTranscriptEntryV1> {
        serde_json::from_value(v).expect("transcript")
    }

    #[test]
    fn empty_transcript_emits_axql_run() {
        let action = tool_loop_step("find Thing named x", &[], "test");
        let ToolLoopActionV1::ToolCall(call) = &action else {
            panic!("expected tool call, got {action:?}");
        };
        assert_eq!(call.name, "axql_run");
        assert_eq!(call.args.limit, 25);
        assert_eq!(
            call.args.query_ir_v1,
            build_query_payload("find Thing named x").query_ir_v1
        );

        let wire = serde_json::to_value(&action).expect("serialize");
        assert_eq!(wire["tool_call"]["name"], "axql_run");
        assert_eq!(wire["tool_call"]["args"]["limit"], 25);
        assert_eq!(wire["tool_call"]["args"]["query_ir_v1"]["select"], json!(["?x"]));
    }

    #[test]
    fn axql_run_result_yields_grounded_answer() {
        let transcript = entries(json!([{
            "tool": "axql_run",
            "args": {},
            "result": {
                "query": "select ?x where ?x.name = \"x\" limit 20",
                "results": {"rows": [{"?x": {"id": 7, "name": "x", "entity_type": "Thing"}}]}
            }
        }]));
        let action = tool_loop_step("find Thing named x", &transcript, "mock_plugin");
        let ToolLoopActionV1::FinalAnswer(fin) = action else {
            panic!("expected final answer");
        };
        assert!(fin.answer.contains("Found 1 result rows"));
        assert!(fin.answer.contains("?x=x (Thing, id=7)"));
        assert_eq!(fin.queries, vec!["select ?x where ?x.name = \"x\" limit 20"]);
        assert_eq!(fin.notes, vec!["backend=mock_plugin (deterministic)"]);
        assert!(fin.citations.is_empty());
    }

    #[test]
    fn missing_rows_count_as_zero() {
        let transcript = entries(json!([{"tool": "axql_run", "result": {"results": "oops"}}]));
        let ToolLoopActionV1::FinalAnswer(fin) = tool_loop_step("q", &transcript, "b") else {
            panic!("expected final answer");
        };
        assert_eq!(fin.answer, "Found 0 result rows.");
        assert!(fin.queries.is_empty());
    }

    #[test]
    fn absent_or_null_result_counts_as_no_rows() {
        for t in [
            json!([{"tool": "axql_run", "args": {}}]),
            json!([{"tool": "axql_run", "args": {}, "result": null}]),
            json!([{"tool": "axql_run", "args": {}, "result": ""}]),
        ] {
            let ToolLoopActionV1::FinalAnswer(fin) = tool_loop_step("q", &entries(t), "b") else {
                panic!("expected final answer");
            };
            assert_eq!(fin.answer, "Found 0 result rows.");
            assert!(fin.queries.is_empty());
            assert_eq!(fin.notes, vec!["backend=b (deterministic)"]);
        }
    }

    #[test]
    fn unexpected_transcript_shapes_end_the_ask() {
        for t in [
            json!([{"tool": "lookup_type", "args": {}, "result": {}}]),
            json!([{"tool": "axql_run", "result": "not an object"}]),
            json!(["garbage"]),
            json!([42, {"no_tool": true}]),
        ] {
            let action = tool_loop_step("q", &entries(t), "b");
            let ToolLoopActionV1::FinalAnswer(fin) = action else {
                panic!("expected final answer");
            };
            assert_eq!(fin.answer, "Done.");
            assert!(fin.queries.is_empty());
        }
    }

    #[test]
    fn step_is_idempotent_for_same_transcript() {
        let transcript = entries(json!([{"tool": "axql_run", "result": {"results": {"rows": []}}}]));
        assert_eq!(
            tool_loop_step("q", &transcript, "b"),
            tool_loop_step("q", &transcript, "b")
        );
    }

    #[test]
    fn summary_renders_unnamed_bindings_with_type() {
        let rows = vec![json!({
            "?a": {"id": 1, "name": null, "entity_type": "Tool"},
            "?b": {"id": 2, "name": "", "entity_type": null},
            "?c": "not an entity"
        })];
        assert_eq!(
            summarize_result_rows(&rows),
            "Found 1 result rows. First row: ?a=Tool (id=1), ?b=unknown (id=2)"
        );
    }

    #[test]
    fn summary_keeps_binding_order_of_the_row() {
        let rows: Vec<Value> = serde_json::from_str(
            r#"[{"?y": {"id": 2, "name": "b", "entity_type": "T"},
                 "?x": {"id": 1, "name": "a", "entity_type": "T"}}]"#,
        )
        .expect("rows");
        assert_eq!(
            summarize_result_rows(&rows),
            "Found 1 result rows. First row: ?y=b (T, id=2), ?x=a (T, id=1)"
        );
    }

    #[test]
    fn summary_without_entity_bindings_is_count_only() {
        let rows = vec![json!({"?x": {"name": "no id"}}), json!({})];
        assert_eq!(summarize_result_rows(&rows), "Found 2 result rows.");
    }
}
