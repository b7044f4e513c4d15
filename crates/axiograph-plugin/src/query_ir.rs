//! Typed query IR (`query_ir_v1`) as emitted by plugins.
//!
//! This is the subset of the host's IR that plugins produce: conjunctive
//! `where` clauses built from type, attribute-equality and edge atoms. The
//! host compiles it into AxQL; `to_axql_text` renders the same query in AxQL
//! surface syntax for display and for hosts that only accept text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::PluginError;

pub const QUERY_IR_V1_VERSION: u32 = 1;

/// Row limit used by every plugin-generated query.
pub const DEFAULT_QUERY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIrV1 {
    #[serde(default = "default_query_ir_v1_version")]
    pub version: u32,

    /// Selected variables, in output order.
    #[serde(default, rename = "select", alias = "select_vars")]
    pub select_vars: Vec<String>,

    /// A single conjunctive clause.
    #[serde(default, rename = "where", alias = "where_atoms")]
    pub where_atoms: Vec<QueryAtomIrV1>,

    #[serde(default = "default_query_limit")]
    pub limit: usize,
}

fn default_query_ir_v1_version() -> u32 {
    QUERY_IR_V1_VERSION
}

fn default_query_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

/// A term: `"?x"` is a variable, any other string a name, a number an entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryTermIrV1 {
    Simple(String),
    Id(u32),
}

impl QueryTermIrV1 {
    pub fn var(name: &str) -> Self {
        QueryTermIrV1::Simple(normalize_var_name(name))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            QueryTermIrV1::Simple(s) if s.starts_with('?') => Some(s.as_str()),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            QueryTermIrV1::Simple(s) => s.clone(),
            QueryTermIrV1::Id(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryAtomIrV1 {
    /// `term is Type`
    Type {
        term: QueryTermIrV1,
        #[serde(rename = "type", alias = "ty", alias = "type_name")]
        type_name: String,
    },
    /// `term.key = "value"`
    AttrEq {
        term: QueryTermIrV1,
        key: String,
        value: String,
    },
    /// `left -path-> right`, where `path` is `/`-joined relation names.
    Edge {
        left: QueryTermIrV1,
        path: String,
        right: QueryTermIrV1,
    },
}

impl QueryAtomIrV1 {
    fn terms(&self) -> Vec<&QueryTermIrV1> {
        match self {
            QueryAtomIrV1::Type { term, .. } | QueryAtomIrV1::AttrEq { term, .. } => vec![term],
            QueryAtomIrV1::Edge { left, right, .. } => vec![left, right],
        }
    }

    fn render(&self) -> String {
        match self {
            QueryAtomIrV1::Type { term, type_name } => {
                format!("{} is {type_name}", term.render())
            }
            QueryAtomIrV1::AttrEq { term, key, value } => {
                format!("{}.{key} = {}", term.render(), axql_string_lit(value))
            }
            QueryAtomIrV1::Edge { left, path, right } => {
                format!("{} -{path}-> {}", left.render(), right.render())
            }
        }
    }
}

impl QueryIrV1 {
    pub fn new(select_vars: Vec<String>, where_atoms: Vec<QueryAtomIrV1>, limit: usize) -> Self {
        Self {
            version: QUERY_IR_V1_VERSION,
            select_vars,
            where_atoms,
            limit,
        }
    }

    /// Variables that occur in some atom.
    pub fn bound_vars(&self) -> BTreeSet<&str> {
        self.where_atoms
            .iter()
            .flat_map(|a| a.terms())
            .filter_map(|t| t.as_var())
            .collect()
    }

    /// Every selected variable must be bound by the `where` clause.
    pub fn validate(&self) -> Result<(), PluginError> {
        let bound = self.bound_vars();
        for v in &self.select_vars {
            if !bound.contains(v.as_str()) {
                return Err(PluginError::UnboundSelectVar(v.clone()));
            }
        }
        Ok(())
    }

    /// Render as AxQL surface text.
    pub fn to_axql_text(&self) -> String {
        let mut out = String::new();
        if !self.select_vars.is_empty() {
            out.push_str("select ");
            out.push_str(&self.select_vars.join(" "));
            out.push(' ');
        }
        out.push_str("where ");
        out.push_str(
            &self
                .where_atoms
                .iter()
                .map(QueryAtomIrV1::render)
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push_str(&format!(" limit {}", self.limit));
        out
    }
}

fn normalize_var_name(v: &str) -> String {
    if v.starts_with('?') {
        v.to_string()
    } else {
        format!("?{v}")
    }
}

fn axql_string_lit(s: &str) -> String {
    let mut out = String::new();
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
