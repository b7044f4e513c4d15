//! Deterministic question → query templates.
//!
//! This is not natural-language understanding. It recognizes two shapes:
//!
//! - path following: `follow rel_0 rel_1`, `from 3 follow rel_0 rel_2`
//! - lookups: `find Tool named drill`, `find things named b`
//!
//! and otherwise falls back to a harmless `?x is Node` query. It never fails,
//! and it is the only place that builds plugin queries: `to_query` and the
//! first `tool_loop_step` turn both call `build_query_payload`.

use serde::{Deserialize, Serialize};

use crate::query_ir::{QueryAtomIrV1, QueryIrV1, QueryTermIrV1, DEFAULT_QUERY_LIMIT};

/// Type used when a question does not name one.
pub const GENERIC_NODE_TYPE: &str = "Node";

/// Path used when a path question names no `rel_*` tokens.
pub const DEFAULT_RELATION_PATH: &str = "rel_0/rel_1";

const GENERIC_TYPE_WORDS: [&str; 4] = ["thing", "things", "entity", "entities"];

/// Response payload of the `to_query` task (and the IR half of an `axql_run` call).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayloadV1 {
    pub query_ir_v1: QueryIrV1,
    pub axql: String,
}

pub fn build_query_payload(question: &str) -> QueryPayloadV1 {
    let tokens: Vec<&str> = question.split_whitespace().collect();
    let lower: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let starts_with = |word: &str| lower.first().map(|t| t == word).unwrap_or(false);

    let query_ir_v1 = if lower.iter().any(|t| t == "follow")
        || (starts_with("from") && tokens.len() >= 2)
    {
        path_query(&tokens, starts_with("from"))
    } else if starts_with("find") && tokens.len() >= 2 {
        find_query(&tokens, &lower)
    } else {
        generic_query()
    };

    let axql = query_ir_v1.to_axql_text();
    QueryPayloadV1 { query_ir_v1, axql }
}

fn path_query(tokens: &[&str], leading_from: bool) -> QueryIrV1 {
    let start = match tokens.get(1) {
        Some(t) if leading_from && !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) => {
            t.parse::<u32>().unwrap_or(0)
        }
        _ => 0,
    };

    let rels: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| t.starts_with("rel_"))
        .collect();
    let path = if rels.is_empty() {
        DEFAULT_RELATION_PATH.to_string()
    } else {
        rels.join("/")
    };

    QueryIrV1::new(
        vec!["?y".to_string()],
        vec![QueryAtomIrV1::Edge {
            left: QueryTermIrV1::Id(start),
            path,
            right: QueryTermIrV1::var("y"),
        }],
        DEFAULT_QUERY_LIMIT,
    )
}

fn find_query(tokens: &[&str], lower: &[String]) -> QueryIrV1 {
    let type_name = tokens[1];
    let name = lower
        .iter()
        .position(|t| t == "named")
        .and_then(|i| tokens.get(i + 1));

    let mut atoms: Vec<QueryAtomIrV1> = Vec::new();
    if !GENERIC_TYPE_WORDS.contains(&type_name.to_lowercase().as_str()) {
        atoms.push(QueryAtomIrV1::Type {
            term: QueryTermIrV1::var("x"),
            type_name: type_name.to_string(),
        });
    }
    if let Some(name) = name {
        atoms.push(QueryAtomIrV1::AttrEq {
            term: QueryTermIrV1::var("x"),
            key: "name".to_string(),
            value: name.to_string(),
        });
    }
    if atoms.is_empty() {
        return generic_query();
    }

    QueryIrV1::new(vec!["?x".to_string()], atoms, DEFAULT_QUERY_LIMIT)
}

fn generic_query() -> QueryIrV1 {
    QueryIrV1::new(
        vec!["?x".to_string()],
        vec![QueryAtomIrV1::Type {
            term: QueryTermIrV1::var("x"),
            type_name: GENERIC_NODE_TYPE.to_string(),
        }],
        DEFAULT_QUERY_LIMIT,
    )
}
