//! `augment_proposals`: routing hints and derived structure for a proposals file.
//!
//! The host owns the proposals store, so this never edits the document it is
//! given. It returns directives instead:
//!
//! - `schema_hint_updates`: per-proposal hints inferred from a `domain` value
//!   (metadata first, then attributes),
//! - `added_proposals`: new `Role` entities derived from `Mention.role`.
//!
//! Input is whatever the host sent, so proposals are inspected as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonicalize::{coerce_confidence, coerce_evidence, coerce_string};
use crate::proposals::{EvidencePointer, ProposalMetaV1, ProposalV1};

/// Marker stored in `metadata.derived_from` of synthesized proposals.
pub const AUGMENT_MENTION_ROLES_V1: &str = "augment_mention_roles_v1";

const MAX_ROLE_EVIDENCE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHintUpdateV1 {
    pub proposal_id: String,
    pub schema_hint: String,
    pub public_rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalsAugmentResponseV1 {
    pub schema_hint_updates: Vec<SchemaHintUpdateV1>,
    pub added_proposals: Vec<ProposalV1>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Map a free-form domain label onto a known schema hint.
pub fn canonical_domain_hint(domain: &str) -> Option<&'static str> {
    let norm = domain.trim().to_lowercase().replace('-', "_");
    match norm.as_str() {
        "machining" | "machinist_learning" | "machinistlearning" | "learning" => {
            Some("machinist_learning")
        }
        "economics" | "economy" | "economic_flows" | "economicflows" => Some("economic_flows"),
        "ontology" | "schema" | "migration" | "migrations" | "schema_evolution"
        | "schemaevolution" => Some("schema_evolution"),
        _ => None,
    }
}

/// `doc` is a `ProposalsFileV1`-shaped value; anything else has no proposals.
pub fn augment_proposals(doc: &Value) -> ProposalsAugmentResponseV1 {
    let proposals: Vec<&Map<String, Value>> = doc
        .get("proposals")
        .and_then(Value::as_array)
        .map(|ps| ps.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();

    let schema_hint_updates: Vec<SchemaHintUpdateV1> =
        proposals.iter().filter_map(|p| schema_hint_update(p)).collect();
    let added_proposals = mention_role_entities(&proposals);

    let notes = vec![format!(
        "augment: schema_hint_updates={} role_entities={}",
        schema_hint_updates.len(),
        added_proposals.len()
    )];
    tracing::debug!(
        proposals = proposals.len(),
        updates = schema_hint_updates.len(),
        added = added_proposals.len(),
        "augment proposals"
    );

    ProposalsAugmentResponseV1 {
        schema_hint_updates,
        added_proposals,
        notes,
    }
}

fn schema_hint_update(p: &Map<String, Value>) -> Option<SchemaHintUpdateV1> {
    let proposal_id = p.get("proposal_id").and_then(coerce_string)?;
    let domain = nested_str(p, "metadata", "domain")
        .filter(|d| !d.trim().is_empty())
        .or_else(|| nested_str(p, "attributes", "domain"))?;
    let hint = canonical_domain_hint(domain)?;
    Some(SchemaHintUpdateV1 {
        proposal_id,
        schema_hint: hint.to_string(),
        public_rationale: format!("domain `{}` routes to schema hint `{hint}`", domain.trim()),
    })
}

fn nested_str<'a>(p: &'a Map<String, Value>, map_key: &str, key: &str) -> Option<&'a str> {
    p.get(map_key)?.as_object()?.get(key)?.as_str()
}

#[derive(Debug, Default)]
struct RoleAggregate {
    mentions: usize,
    confidence: f64,
    evidence: Vec<EvidencePointer>,
}

fn mention_role_entities(proposals: &[&Map<String, Value>]) -> Vec<ProposalV1> {
    let existing_ids: BTreeSet<String> = proposals
        .iter()
        .flat_map(|p| ["proposal_id", "entity_id"].map(|k| p.get(k).and_then(coerce_string)))
        .flatten()
        .collect();

    let mut roles: BTreeMap<String, RoleAggregate> = BTreeMap::new();
    for p in proposals {
        let is_entity = p
            .get("kind")
            .and_then(Value::as_str)
            .map(|k| k.eq_ignore_ascii_case("entity"))
            .unwrap_or(false);
        if !is_entity || p.get("entity_type").and_then(Value::as_str) != Some("Mention") {
            continue;
        }
        let Some(role) = nested_str(p, "attributes", "role")
            .map(str::trim)
            .filter(|r| !r.is_empty())
        else {
            continue;
        };
        let agg = roles.entry(role.to_string()).or_default();
        agg.mentions += 1;
        agg.confidence = agg.confidence.max(coerce_confidence(p.get("confidence")));
        agg.evidence.extend(coerce_evidence(p.get("evidence")));
    }

    let mut out = Vec::new();
    for (role, agg) in roles {
        let role_entity_id = format!("role::{}", sanitize_id(&role));
        if existing_ids.contains(&role_entity_id) {
            continue;
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("derived_from".to_string(), AUGMENT_MENTION_ROLES_V1.to_string());
        let mut attributes = BTreeMap::new();
        attributes.insert("role".to_string(), role.clone());

        out.push(ProposalV1::Entity {
            meta: ProposalMetaV1 {
                proposal_id: role_entity_id.clone(),
                confidence: agg.confidence,
                evidence: dedup_evidence(agg.evidence, MAX_ROLE_EVIDENCE),
                public_rationale: format!(
                    "Observed mention role `{role}` across {} mentions; representing it as an entity.",
                    agg.mentions
                ),
                metadata,
                schema_hint: None,
            },
            entity_id: role_entity_id,
            entity_type: "Role".to_string(),
            name: role,
            attributes,
            description: None,
        });
    }
    out
}

fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(160)
        .collect()
}

fn dedup_evidence(mut ev: Vec<EvidencePointer>, max: usize) -> Vec<EvidencePointer> {
    let mut seen: BTreeSet<(String, Option<String>, Option<String>)> = BTreeSet::new();
    ev.retain(|e| seen.insert((e.chunk_id.clone(), e.locator.clone(), e.span_id.clone())));
    ev.truncate(max);
    ev
}
