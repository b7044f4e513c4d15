//! Axiograph plugin protocols.
//!
//! The Axiograph REPL / DB server delegates two kinds of work to external
//! plugin processes:
//!
//! - `axiograph_llm_plugin_v2` / `axiograph_llm_plugin_v3`: translate a
//!   question into a structured query, summarize results, augment proposals,
//!   and drive the tool loop (`tool_loop_step`).
//! - `axiograph_world_model_v1`: propose new entities/relations from an
//!   exported snapshot.
//!
//! A plugin process handles exactly one request: stdin JSON in, stdout JSON
//! out. Nothing here keeps state across requests; the tool loop replays the
//! full transcript every turn.
//!
//! The plugin is **untrusted** from the host's point of view: everything it
//! emits is a *candidate* (a query to execute, proposals to review). The
//! canonicalizer exists so that even free-form backend output lands in the
//! fixed `proposals.json` schema.

pub mod augment;
pub mod canonicalize;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod json_extract;
pub mod proposals;
pub mod protocol;
pub mod query_ir;
pub mod query_payload;
pub mod tool_loop;
pub mod world_model;

pub use augment::*;
pub use canonicalize::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use proposals::*;
pub use protocol::*;
pub use query_ir::*;
pub use query_payload::*;
pub use tool_loop::*;
pub use world_model::*;

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
