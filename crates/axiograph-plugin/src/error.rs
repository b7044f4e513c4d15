//! Plugin error taxonomy.
//!
//! Only `MalformedInput` is allowed to abort before a structured response is
//! written: without a parseable request there is no trace id or envelope to
//! answer with. Everything else is downgraded to an `{"error": ...}` reply (or
//! a world-model envelope with `error` populated).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("unsupported protocol")]
    UnsupportedProtocol,

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("invalid {kind} task: {message}")]
    InvalidTask { kind: String, message: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("backend failure: {0}")]
    BackendFailure(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("query_ir_v1: selected variable `{0}` is not bound by any atom")]
    UnboundSelectVar(String),
}

impl PluginError {
    /// Process exit status for a request that ended in this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PluginError::UnsupportedProtocol
            | PluginError::UnknownTaskKind(_)
            | PluginError::InvalidTask { .. }
            | PluginError::UnboundSelectVar(_) => 0,
            PluginError::MalformedInput(_) | PluginError::InvalidConfig(_) => 1,
            PluginError::BackendFailure(_) => 2,
        }
    }
}
