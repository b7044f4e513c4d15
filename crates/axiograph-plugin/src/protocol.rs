//! LLM plugin protocol (v2/v3) request and response shapes.
//!
//! v2 covers `to_query` / `answer` / `augment_proposals`; v3 adds
//! `tool_loop_step`. A plugin speaking either version accepts all four task
//! kinds, so the task enum is shared.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::augment::ProposalsAugmentResponseV1;
use crate::query_payload::QueryPayloadV1;
use crate::tool_loop::{ToolLoopActionV1, ToolLoopTranscriptEntryV1};
use crate::world_model::WORLD_MODEL_PROTOCOL_V1;

pub const LLM_PLUGIN_PROTOCOL_V2: &str = "axiograph_llm_plugin_v2";
pub const LLM_PLUGIN_PROTOCOL_V3: &str = "axiograph_llm_plugin_v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginProtocol {
    LlmV2,
    LlmV3,
    WorldModelV1,
}

impl PluginProtocol {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            LLM_PLUGIN_PROTOCOL_V2 => Some(PluginProtocol::LlmV2),
            LLM_PLUGIN_PROTOCOL_V3 => Some(PluginProtocol::LlmV3),
            WORLD_MODEL_PROTOCOL_V1 => Some(PluginProtocol::WorldModelV1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginProtocol::LlmV2 => LLM_PLUGIN_PROTOCOL_V2,
            PluginProtocol::LlmV3 => LLM_PLUGIN_PROTOCOL_V3,
            PluginProtocol::WorldModelV1 => WORLD_MODEL_PROTOCOL_V1,
        }
    }

    pub fn is_llm(&self) -> bool {
        matches!(self, PluginProtocol::LlmV2 | PluginProtocol::LlmV3)
    }
}

/// Task kinds accepted by the LLM protocols.
pub const LLM_TASK_KINDS: [&str; 4] = ["to_query", "answer", "augment_proposals", "tool_loop_step"];

/// A `task` object. Nullable fields read as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginTaskV2 {
    ToQuery {
        #[serde(default)]
        question: Option<String>,
    },
    Answer {
        #[serde(default)]
        question: Option<String>,
        /// Host query results (`{rows: [...]}`); rows that are missing read as none.
        #[serde(default)]
        results: Value,
    },
    AugmentProposals {
        /// A `proposals.json` document as the host has it.
        #[serde(default)]
        proposals: Value,
    },
    ToolLoopStep {
        #[serde(default)]
        question: Option<String>,
        #[serde(default)]
        transcript: Option<Vec<ToolLoopTranscriptEntryV1>>,
    },
}

impl PluginTaskV2 {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginTaskV2::ToQuery { .. } => "to_query",
            PluginTaskV2::Answer { .. } => "answer",
            PluginTaskV2::AugmentProposals { .. } => "augment_proposals",
            PluginTaskV2::ToolLoopStep { .. } => "tool_loop_step",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponseV1 {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponseV1 {
    pub error: String,
}

/// Everything an LLM-protocol plugin can print.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PluginResponseV2 {
    Query(QueryPayloadV1),
    Answer(AnswerResponseV1),
    Augment(ProposalsAugmentResponseV1),
    ToolLoop(ToolLoopActionV1),
    Error(ErrorResponseV1),
}

impl PluginResponseV2 {
    pub fn error(message: impl Into<String>) -> Self {
        PluginResponseV2::Error(ErrorResponseV1 {
            error: message.into(),
        })
    }
}
