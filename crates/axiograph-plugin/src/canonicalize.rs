//! Proposal canonicalization: loosely-typed backend output → `ProposalsFileV1`.
//!
//! Backends (model runtimes, recorded transcripts, hand-written fixtures) emit
//! "proposal-ish" JSON. Nothing here fails: every field has a coercion and a
//! default, and records that are not JSON objects are skipped.
//!
//! Fallback ids are derived from the record's position in the *input* list
//! (`wm::<trace_id>::<i>`), so skipping a malformed record never shifts the ids
//! of the records after it.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::proposals::{
    EvidencePointer, ProposalMetaV1, ProposalSourceV1, ProposalV1, ProposalsFileV1,
    DEFAULT_PROPOSAL_CONFIDENCE, PROPOSALS_VERSION_V1,
};

pub const DEFAULT_PUBLIC_RATIONALE: &str = "world model proposal";
pub const DEFAULT_ENTITY_TYPE: &str = "Entity";
pub const DEFAULT_REL_TYPE: &str = "related_to";
pub const WORLD_MODEL_SOURCE_TYPE: &str = "world_model";

/// `wm::<trace_id>::<index>`
pub fn fallback_proposal_id(trace_id: &str, index: usize) -> String {
    format!("wm::{trace_id}::{index}")
}

/// Canonicalize a list of raw proposal records.
pub fn normalize_proposals(trace_id: &str, records: &[Value], generated_at: &str) -> ProposalsFileV1 {
    let mut out = ProposalsFileV1::empty(WORLD_MODEL_SOURCE_TYPE, trace_id, generated_at.to_string());
    let mut seen_ids: HashSet<String> = HashSet::new();

    for (idx, record) in records.iter().enumerate() {
        let Value::Object(map) = record else {
            tracing::debug!(index = idx, "canonicalize: skipping non-object proposal record");
            continue;
        };
        let proposal = normalize_record(trace_id, idx, map);
        let pid = &proposal.meta().proposal_id;
        if !seen_ids.insert(pid.clone()) {
            tracing::warn!(proposal_id = %pid, index = idx, "canonicalize: duplicate proposal_id");
        }
        out.proposals.push(proposal);
    }

    out
}

/// Canonicalize a whole document (`{proposals: [...], ...}`) or a bare list.
///
/// Document-level `generated_at`, `source` and `schema_hint` are kept when
/// present and well-formed; `version` is always reset to 1.
pub fn normalize_proposals_value(trace_id: &str, value: &Value, generated_at: &str) -> ProposalsFileV1 {
    let doc = match value {
        Value::Array(records) => return normalize_proposals(trace_id, records, generated_at),
        Value::Object(doc) => doc,
        _ => {
            tracing::debug!("canonicalize: proposals document is neither object nor array");
            return normalize_proposals(trace_id, &[], generated_at);
        }
    };

    let records = doc
        .get("proposals")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let generated_at = doc
        .get("generated_at")
        .and_then(coerce_string)
        .unwrap_or_else(|| generated_at.to_string());

    let mut out = normalize_proposals(trace_id, records, &generated_at);
    if let Some(source) = doc
        .get("source")
        .and_then(|s| serde_json::from_value::<ProposalSourceV1>(s.clone()).ok())
    {
        out.source = source;
    }
    out.schema_hint = doc.get("schema_hint").and_then(coerce_string);
    out.version = PROPOSALS_VERSION_V1;
    out
}

fn normalize_record(trace_id: &str, idx: usize, p: &Map<String, Value>) -> ProposalV1 {
    let base_id = fallback_proposal_id(trace_id, idx);
    let field = |key: &str| p.get(key).and_then(coerce_string);

    let meta = ProposalMetaV1 {
        proposal_id: field("proposal_id").unwrap_or_else(|| base_id.clone()),
        confidence: coerce_confidence(p.get("confidence")),
        evidence: coerce_evidence(p.get("evidence")),
        public_rationale: field("public_rationale")
            .unwrap_or_else(|| DEFAULT_PUBLIC_RATIONALE.to_string()),
        metadata: coerce_string_map(p.get("metadata")),
        schema_hint: field("schema_hint"),
    };
    let attributes = coerce_string_map(p.get("attributes"));

    let is_entity = p
        .get("kind")
        .and_then(Value::as_str)
        .map(|k| k.eq_ignore_ascii_case("entity"))
        .unwrap_or(false);

    if is_entity {
        let entity_id = field("entity_id");
        ProposalV1::Entity {
            meta,
            name: field("name")
                .or_else(|| entity_id.clone())
                .unwrap_or_else(|| format!("Entity {idx}")),
            entity_id: entity_id.unwrap_or_else(|| format!("{base_id}:entity")),
            entity_type: field("entity_type").unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
            attributes,
            description: field("description"),
        }
    } else {
        ProposalV1::Relation {
            meta,
            relation_id: field("relation_id").unwrap_or_else(|| format!("{base_id}:rel")),
            rel_type: field("rel_type").unwrap_or_else(|| DEFAULT_REL_TYPE.to_string()),
            source: field("source").unwrap_or_default(),
            target: field("target").unwrap_or_default(),
            attributes,
        }
    }
}

/// Non-empty string, or a number rendered as one.
pub(crate) fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers or numeric strings, clamped to [0, 1]. Anything else is the default.
pub(crate) fn coerce_confidence(v: Option<&Value>) -> f64 {
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_PROPOSAL_CONFIDENCE,
    }
}

/// Pointer objects with a `chunk_id`, or bare chunk-id strings.
pub(crate) fn coerce_evidence(v: Option<&Value>) -> Vec<EvidencePointer> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(EvidencePointer {
                chunk_id: s.clone(),
                locator: None,
                span_id: None,
            }),
            Value::Object(o) => Some(EvidencePointer {
                chunk_id: o.get("chunk_id").and_then(coerce_string)?,
                locator: o.get("locator").and_then(coerce_string),
                span_id: o.get("span_id").and_then(coerce_string),
            }),
            _ => None,
        })
        .collect()
}

/// Scalar values stringified; nulls and nested values dropped.
pub(crate) fn coerce_string_map(v: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(o)) = v else {
        return BTreeMap::new();
    };
    o.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn missing_fields_get_defaults() {
        let out = normalize_proposals("t1", &[json!({"kind": "entity"}), json!({})], "100");
        assert_eq!(out.version, 1);
        assert_eq!(out.generated_at, "100");
        assert_eq!(out.source.source_type, "world_model");
        assert_eq!(out.source.locator, "t1");
        assert_eq!(out.proposals.len(), 2);

        match &out.proposals[0] {
            ProposalV1::Entity {
                meta,
                entity_id,
                entity_type,
                name,
                ..
            } => {
                assert_eq!(meta.proposal_id, "wm::t1::0");
                assert_relative_eq!(meta.confidence, 0.7);
                assert_eq!(meta.public_rationale, "world model proposal");
                assert_eq!(entity_id, "wm::t1::0:entity");
                assert_eq!(entity_type, "Entity");
                assert_eq!(name, "Entity 0");
            }
            other => panic!("expected entity, got {other:?}"),
        }
        match &out.proposals[1] {
            ProposalV1::Relation {
                meta,
                relation_id,
                rel_type,
                source,
                target,
                ..
            } => {
                assert_eq!(meta.proposal_id, "wm::t1::1");
                assert_eq!(relation_id, "wm::t1::1:rel");
                assert_eq!(rel_type, "related_to");
                assert_eq!(source, "");
                assert_eq!(target, "");
            }
            other => panic!("expected relation, got {other:?}"),
        }
    }

    #[test]
    fn fallback_ids_use_original_index() {
        let records = vec![json!("junk"), json!(7), json!({"kind": "Relation"})];
        let out = normalize_proposals("t", &records, "0");
        assert_eq!(out.proposals.len(), 1);
        assert_eq!(out.proposals[0].meta().proposal_id, "wm::t::2");
    }

    #[test]
    fn entity_name_falls_back_to_entity_id() {
        let out = normalize_proposals("t", &[json!({"kind": "ENTITY", "entity_id": "e9"})], "0");
        let ProposalV1::Entity { name, entity_id, .. } = &out.proposals[0] else {
            panic!("expected entity");
        };
        assert_eq!(entity_id, "e9");
        assert_eq!(name, "e9");
    }

    #[test]
    fn confidence_is_coerced_and_clamped() {
        let cases = [
            (json!(1.7), 1.0),
            (json!(-3), 0.0),
            (json!("0.25"), 0.25),
            (json!("high"), 0.7),
            (json!(null), 0.7),
            (json!([0.9]), 0.7),
        ];
        for (raw, expected) in cases {
            let out = normalize_proposals("t", &[json!({"confidence": raw})], "0");
            assert_relative_eq!(out.proposals[0].meta().confidence, expected);
        }
    }

    #[test]
    fn evidence_and_maps_are_coerced() {
        let out = normalize_proposals(
            "t",
            &[json!({
                "kind": "Entity",
                "evidence": ["c1", {"chunk_id": "c2", "locator": "doc.md"}, {"locator": "x"}, 5],
                "metadata": {"domain": "machining", "rank": 3, "ok": true, "nested": {"a": 1}, "none": null},
                "attributes": "not a map",
                "description": "a part"
            })],
            "0",
        );
        let ProposalV1::Entity {
            meta,
            attributes,
            description,
            ..
        } = &out.proposals[0]
        else {
            panic!("expected entity");
        };
        assert_eq!(
            meta.evidence,
            vec![
                EvidencePointer {
                    chunk_id: "c1".to_string(),
                    locator: None,
                    span_id: None
                },
                EvidencePointer {
                    chunk_id: "c2".to_string(),
                    locator: Some("doc.md".to_string()),
                    span_id: None
                },
            ]
        );
        assert_eq!(meta.metadata.get("domain").map(String::as_str), Some("machining"));
        assert_eq!(meta.metadata.get("rank").map(String::as_str), Some("3"));
        assert_eq!(meta.metadata.get("ok").map(String::as_str), Some("true"));
        assert!(!meta.metadata.contains_key("nested"));
        assert!(!meta.metadata.contains_key("none"));
        assert!(attributes.is_empty());
        assert_eq!(description.as_deref(), Some("a part"));
    }

    #[test]
    fn numeric_ids_become_strings() {
        let out = normalize_proposals("t", &[json!({"source": 1, "target": 2, "rel_type": "Edge"})], "0");
        let ProposalV1::Relation { source, target, .. } = &out.proposals[0] else {
            panic!("expected relation");
        };
        assert_eq!(source, "1");
        assert_eq!(target, "2");
    }

    #[test]
    fn document_fields_are_preserved() {
        let doc = json!({
            "version": 9,
            "generated_at": "42",
            "source": {"source_type": "llm_plugin", "locator": "run-1"},
            "schema_hint": "economic_flows",
            "proposals": [{"kind": "Entity", "name": "A"}]
        });
        let out = normalize_proposals_value("t", &doc, "100");
        assert_eq!(out.version, 1);
        assert_eq!(out.generated_at, "42");
        assert_eq!(out.source.source_type, "llm_plugin");
        assert_eq!(out.schema_hint.as_deref(), Some("economic_flows"));
        assert_eq!(out.proposals.len(), 1);
    }

    #[test]
    fn malformed_document_fields_fall_back() {
        let doc = json!({"generated_at": "", "source": "nope", "proposals": {"not": "a list"}});
        let out = normalize_proposals_value("t", &doc, "100");
        assert_eq!(out.generated_at, "100");
        assert_eq!(out.source.locator, "t");
        assert!(out.proposals.is_empty());

        let out = normalize_proposals_value("t", &json!("text"), "100");
        assert!(out.proposals.is_empty());
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let out = normalize_proposals(
            "t",
            &[json!({"proposal_id": "p"}), json!({"proposal_id": "p"})],
            "0",
        );
        assert_eq!(out.proposals.len(), 2);
        assert!(out.proposals.iter().all(|p| p.meta().proposal_id == "p"));
    }

    #[test]
    fn canonical_document_is_a_fixed_point() {
        let doc = json!({
            "version": 1,
            "generated_at": "5",
            "source": {"source_type": "world_model", "locator": "t"},
            "schema_hint": null,
            "proposals": [{
                "kind": "Relation",
                "proposal_id": "rel::Parent::a::b::0",
                "confidence": 0.9,
                "evidence": [{"chunk_id": "c"}],
                "public_rationale": "baseline::oracle",
                "metadata": {"baseline": "oracle"},
                "schema_hint": null,
                "relation_id": "rel::Parent::a::b::0",
                "rel_type": "Parent",
                "source": "a",
                "target": "b",
                "attributes": {}
            }]
        });
        let once = normalize_proposals_value("t", &doc, "999");
        assert_eq!(serde_json::to_value(&once).expect("serialize"), doc);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-24i32..24).prop_map(|n| json!(f64::from(n) / 8.0)),
            "[a-zA-Z_:]{0,8}".prop_map(Value::String),
            prop_oneof![
                Just("entity"),
                Just("Entity"),
                Just("Relation"),
                Just("0.5"),
                Just("NaN")
            ]
            .prop_map(|s| Value::String(s.to_string())),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map(
                    prop_oneof![
                        Just("kind".to_string()),
                        Just("proposal_id".to_string()),
                        Just("confidence".to_string()),
                        Just("evidence".to_string()),
                        Just("metadata".to_string()),
                        Just("attributes".to_string()),
                        Just("name".to_string()),
                        Just("entity_id".to_string()),
                        Just("source".to_string()),
                        "[a-z]{1,6}",
                    ],
                    inner,
                    0..6,
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            failure_persistence: None,
            ..ProptestConfig::default()
        })]

        #[test]
        fn canonicalization_is_total_and_bounded(records in prop::collection::vec(arb_json(), 0..8)) {
            let out = normalize_proposals("trace", &records, "1");
            let objects = records.iter().filter(|r| r.is_object()).count();
            prop_assert_eq!(out.proposals.len(), objects);
            for p in &out.proposals {
                let meta = p.meta();
                prop_assert!(!meta.proposal_id.is_empty());
                prop_assert!((0.0..=1.0).contains(&meta.confidence));
            }
        }

        #[test]
        fn canonicalization_is_idempotent(records in prop::collection::vec(arb_json(), 0..8)) {
            let once = normalize_proposals("trace", &records, "1");
            let wire = serde_json::to_value(&once).expect("serialize");
            let twice = normalize_proposals_value("trace", &wire, "2");
            prop_assert_eq!(once, twice);
        }
    }
}
