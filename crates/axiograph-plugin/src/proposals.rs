//! `proposals.json` shapes (Evidence/Proposals schema, v1).
//!
//! These mirror what the host imports: a file-level envelope plus a list of
//! `Entity` / `Relation` proposals sharing a flattened meta block. Plugins
//! never write these directly from model output; model output goes through
//! `canonicalize` first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROPOSALS_VERSION_V1: u32 = 1;

/// Default confidence for proposals that do not state one.
pub const DEFAULT_PROPOSAL_CONFIDENCE: f64 = 0.7;

/// Top-level proposals file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalsFileV1 {
    pub version: u32,
    /// Unix seconds as string.
    pub generated_at: String,
    pub source: ProposalSourceV1,
    /// Optional hint for downstream reconciliation (“machinist_learning”, etc).
    #[serde(default)]
    pub schema_hint: Option<String>,
    pub proposals: Vec<ProposalV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSourceV1 {
    /// e.g. `world_model`, `llm_plugin`
    pub source_type: String,
    /// trace id / path / url identifying the run
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePointer {
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalMetaV1 {
    pub proposal_id: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<EvidencePointer>,
    /// Short public rationale, not raw model reasoning.
    pub public_rationale: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub schema_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProposalV1 {
    Entity {
        #[serde(flatten)]
        meta: ProposalMetaV1,
        entity_id: String,
        entity_type: String,
        name: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
        #[serde(default)]
        description: Option<String>,
    },
    Relation {
        #[serde(flatten)]
        meta: ProposalMetaV1,
        relation_id: String,
        rel_type: String,
        source: String,
        target: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

impl ProposalV1 {
    pub fn meta(&self) -> &ProposalMetaV1 {
        match self {
            ProposalV1::Entity { meta, .. } => meta,
            ProposalV1::Relation { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ProposalMetaV1 {
        match self {
            ProposalV1::Entity { meta, .. } => meta,
            ProposalV1::Relation { meta, .. } => meta,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            ProposalV1::Entity { .. } => "Entity",
            ProposalV1::Relation { .. } => "Relation",
        }
    }
}

impl ProposalsFileV1 {
    pub fn empty(source_type: &str, locator: &str, generated_at: String) -> Self {
        Self {
            version: PROPOSALS_VERSION_V1,
            generated_at,
            source: ProposalSourceV1 {
                source_type: source_type.to_string(),
                locator: locator.to_string(),
            },
            schema_hint: None,
            proposals: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proposal_kind_tag_and_flattened_meta() {
        let p: ProposalV1 = serde_json::from_value(json!({
            "kind": "Relation",
            "proposal_id": "r1",
            "confidence": 0.8,
            "evidence": [],
            "public_rationale": "seen in export",
            "metadata": {},
            "schema_hint": null,
            "relation_id": "r1",
            "rel_type": "Parent",
            "source": "Alice",
            "target": "Bob",
            "attributes": {}
        }))
        .expect("relation proposal");
        assert_eq!(p.kind_str(), "Relation");
        assert_eq!(p.meta().proposal_id, "r1");

        let back = serde_json::to_value(&p).expect("serialize");
        assert_eq!(back["kind"], "Relation");
        assert_eq!(back["proposal_id"], "r1");
        assert!(back.get("meta").is_none());
    }

    #[test]
    fn empty_file_has_version_and_source() {
        let f = ProposalsFileV1::empty("world_model", "wm::1", "1".to_string());
        assert_eq!(f.version, PROPOSALS_VERSION_V1);
        assert_eq!(f.source.locator, "wm::1");
        let v = serde_json::to_value(&f).expect("serialize");
        assert!(v["schema_hint"].is_null());
    }
}
