//! World model plugin protocol (`axiograph_world_model_v1`).
//!
//! Single shot: the host sends an export snapshot (inline or by path), a
//! backend proposes new facts, and the plugin answers with one envelope whose
//! `proposals` is always a canonical `ProposalsFileV1`.
//!
//! Backends:
//! - `baseline`: one relation proposal per export tuple (no learning),
//! - `stub`: no proposals,
//! - `recorded`: replays free-form model output captured in a file.
//!
//! Whatever a backend returns goes through `normalize_proposals_value`, then
//! gets provenance metadata stamped on every proposal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::canonicalize::{normalize_proposals_value, WORLD_MODEL_SOURCE_TYPE};
use crate::config::{WorldModelBackendKind, WorldModelConfig, WorldModelStrategy};
use crate::error::PluginError;
use crate::json_extract::parse_llm_json;
use crate::proposals::{ProposalMetaV1, ProposalsFileV1};

pub const WORLD_MODEL_PROTOCOL_V1: &str = "axiograph_world_model_v1";

/// Relation name used for export items that do not carry one.
pub const DEFAULT_EXPORT_RELATION: &str = "Rel";

pub fn default_trace_id(now_unix_secs: u64) -> String {
    format!("wm::{now_unix_secs}")
}

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldModelInputV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axi_digest_v1: Option<String>,
    /// Inline export (`{items: [...]}`), kept loose so bad items can be skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldModelObjectiveV1 {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldModelTaskCostV1 {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldModelOptionsV1 {
    /// 0 = unbounded.
    #[serde(default)]
    pub max_new_proposals: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<WorldModelObjectiveV1>,
    #[serde(default)]
    pub task_costs: Vec<WorldModelTaskCostV1>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldModelRequestV1 {
    pub protocol: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at_unix_secs: Option<u64>,
    #[serde(default)]
    pub input: WorldModelInputV1,
    #[serde(default)]
    pub options: WorldModelOptionsV1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldModelResponseV1 {
    pub protocol: String,
    pub trace_id: String,
    pub generated_at_unix_secs: u64,
    pub proposals: ProposalsFileV1,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Always present on the wire; `null` on success.
    #[serde(default)]
    pub error: Option<String>,
}

impl WorldModelRequestV1 {
    /// Request trace id, or `wm::<now>` when absent/blank.
    pub fn resolved_trace_id(&self, now_unix_secs: u64) -> String {
        self.trace_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_trace_id(now_unix_secs))
    }
}

// ---------------------------------------------------------------------------
// Export snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldModelExportItemV1 {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    pub fields: Vec<(String, String)>,
    #[serde(default)]
    pub mask_fields: Vec<String>,
    /// Position in the export's `items` list (unparseable items still count).
    #[serde(skip)]
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldModelExportV1 {
    pub axi_digest_v1: Option<String>,
    pub items: Vec<WorldModelExportItemV1>,
}

impl WorldModelExportItemV1 {
    /// Field names in first-occurrence order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.fields {
            if !names.contains(&k.as_str()) {
                names.push(k);
            }
        }
        names
    }

    /// Value of `key`; a repeated key resolves to its last value.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn relation_name(&self) -> &str {
        self.relation
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_EXPORT_RELATION)
    }
}

impl WorldModelExportV1 {
    /// Parse an export document, skipping items that do not have the export shape.
    pub fn from_value(v: &Value) -> Self {
        let axi_digest_v1 = v
            .get("axi_digest_v1")
            .and_then(Value::as_str)
            .map(str::to_string);
        let items = v
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(position, raw)| {
                        match serde_json::from_value::<WorldModelExportItemV1>(raw.clone()) {
                            Ok(mut item) => {
                                item.position = position;
                                Some(item)
                            }
                            Err(e) => {
                                tracing::debug!(position, error = %e, "world model: skipping export item");
                                None
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            axi_digest_v1,
            items,
        }
    }
}

/// Inline `input.export`, else the file at `input.export_path`, else empty.
pub fn load_export(input: &WorldModelInputV1) -> Result<WorldModelExportV1, PluginError> {
    if let Some(export) = input.export.as_ref().filter(|e| is_present(e)) {
        return Ok(WorldModelExportV1::from_value(export));
    }
    let Some(path) = input.export_path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return Ok(WorldModelExportV1::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        PluginError::BackendFailure(format!("failed to read export_path `{path}`: {e}"))
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        PluginError::BackendFailure(format!("export_path `{path}` is not valid JSON: {e}"))
    })?;
    Ok(WorldModelExportV1::from_value(&value))
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Pick the (source, target) field names of a tuple.
///
/// Priority: `from/to`, `source/target`, `lhs/rhs`, `child/parent`, then the
/// first two field names in order.
pub fn infer_endpoint_fields<'a>(field_names: &[&'a str]) -> Option<(&'a str, &'a str)> {
    const PAIRS: [(&str, &str); 4] = [
        ("from", "to"),
        ("source", "target"),
        ("lhs", "rhs"),
        ("child", "parent"),
    ];
    for (src, dst) in PAIRS {
        let found_src = field_names.iter().find(|n| **n == src);
        let found_dst = field_names.iter().find(|n| **n == dst);
        if let (Some(s), Some(d)) = (found_src, found_dst) {
            return Some((*s, *d));
        }
    }
    match field_names {
        [first, second, ..] => Some((*first, *second)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Raw backend output, not yet canonical.
#[derive(Debug, Clone, Default)]
pub struct WorldModelProposalBatch {
    /// A proposals document or a bare list of proposal records.
    pub raw: Value,
    pub notes: Vec<String>,
}

pub trait WorldModelBackend {
    fn label(&self) -> &str;

    fn propose(
        &self,
        req: &WorldModelRequestV1,
        export: &WorldModelExportV1,
    ) -> Result<WorldModelProposalBatch, PluginError>;
}

#[derive(Debug, Clone, Default)]
pub struct BaselineBackend {
    pub strategy: WorldModelStrategy,
}

impl WorldModelBackend for BaselineBackend {
    fn label(&self) -> &str {
        "baseline"
    }

    fn propose(
        &self,
        req: &WorldModelRequestV1,
        export: &WorldModelExportV1,
    ) -> Result<WorldModelProposalBatch, PluginError> {
        let cap = req.options.max_new_proposals;
        let strategy = self.strategy.as_str();
        let mut records: Vec<Value> = Vec::new();

        for item in &export.items {
            if cap > 0 && records.len() >= cap {
                break;
            }
            let names = item.field_names();
            let Some((src_field, dst_field)) = infer_endpoint_fields(&names) else {
                continue;
            };
            let src = item.field(src_field).unwrap_or("");
            let dst = item.field(dst_field).unwrap_or("");
            if src.is_empty() || dst.is_empty() {
                continue;
            }

            let rel = item.relation_name();
            let proposal_id = format!("rel::{rel}::{src}::{dst}::{}", item.position);
            let attributes: BTreeMap<&str, &str> =
                item.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            records.push(json!({
                "kind": "Relation",
                "proposal_id": proposal_id,
                "confidence": self.strategy.confidence(),
                "evidence": [],
                "public_rationale": format!("baseline::{strategy}"),
                "metadata": {"baseline": strategy},
                "schema_hint": item.schema,
                "relation_id": proposal_id,
                "rel_type": rel,
                "source": src,
                "target": dst,
                "attributes": attributes,
            }));
        }

        let notes = vec![format!(
            "baseline strategy={strategy} proposals={}",
            records.len()
        )];
        Ok(WorldModelProposalBatch {
            raw: Value::Array(records),
            notes,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubBackend;

impl WorldModelBackend for StubBackend {
    fn label(&self) -> &str {
        "stub"
    }

    fn propose(
        &self,
        _req: &WorldModelRequestV1,
        _export: &WorldModelExportV1,
    ) -> Result<WorldModelProposalBatch, PluginError> {
        Ok(WorldModelProposalBatch {
            raw: Value::Array(Vec::new()),
            notes: vec!["stub backend (no proposals)".to_string()],
        })
    }
}

/// Replays captured model output. `options.model_path` wins over the configured path.
#[derive(Debug, Clone, Default)]
pub struct RecordedBackend {
    pub default_path: Option<PathBuf>,
}

impl RecordedBackend {
    fn resolve_path(&self, req: &WorldModelRequestV1) -> Option<PathBuf> {
        req.options
            .model_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.default_path.clone())
    }
}

impl WorldModelBackend for RecordedBackend {
    fn label(&self) -> &str {
        "recorded"
    }

    fn propose(
        &self,
        req: &WorldModelRequestV1,
        _export: &WorldModelExportV1,
    ) -> Result<WorldModelProposalBatch, PluginError> {
        let Some(path) = self.resolve_path(req) else {
            return Err(PluginError::BackendFailure(
                "recorded backend needs options.model_path or WORLD_MODEL_MODEL_PATH".to_string(),
            ));
        };
        let text = read_recorded_output(&path)?;
        let raw: Value = parse_llm_json(&text).map_err(|e| {
            PluginError::BackendFailure(format!("recorded output `{}`: {e}", path.display()))
        })?;
        Ok(WorldModelProposalBatch {
            raw,
            notes: vec![format!("recorded output: {}", path.display())],
        })
    }
}

fn read_recorded_output(path: &Path) -> Result<String, PluginError> {
    std::fs::read_to_string(path).map_err(|e| {
        PluginError::BackendFailure(format!(
            "failed to read recorded output `{}`: {e}",
            path.display()
        ))
    })
}

pub fn backend_for(config: &WorldModelConfig) -> Box<dyn WorldModelBackend> {
    match config.backend {
        WorldModelBackendKind::Baseline => Box::new(BaselineBackend {
            strategy: config.strategy,
        }),
        WorldModelBackendKind::Stub => Box::new(StubBackend),
        WorldModelBackendKind::Recorded => Box::new(RecordedBackend {
            default_path: config.model_path.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WorldModelProvenance {
    pub trace_id: String,
    pub backend: String,
    pub axi_digest_v1: Option<String>,
}

/// Stamp provenance keys onto every proposal's metadata (existing keys win).
pub fn apply_world_model_provenance(
    mut proposals: ProposalsFileV1,
    provenance: &WorldModelProvenance,
) -> ProposalsFileV1 {
    for p in &mut proposals.proposals {
        apply_provenance_meta(p.meta_mut(), provenance);
    }
    proposals
}

fn apply_provenance_meta(meta: &mut ProposalMetaV1, provenance: &WorldModelProvenance) {
    meta.metadata
        .entry("axiograph_world_model_trace_id".to_string())
        .or_insert_with(|| provenance.trace_id.clone());
    meta.metadata
        .entry("axiograph_world_model_backend".to_string())
        .or_insert_with(|| provenance.backend.clone());
    if let Some(digest) = provenance.axi_digest_v1.as_ref() {
        meta.metadata
            .entry("axiograph_axi_digest_v1".to_string())
            .or_insert_with(|| digest.clone());
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub fn run_world_model(
    req: &WorldModelRequestV1,
    backend: &dyn WorldModelBackend,
    now_unix_secs: u64,
) -> Result<WorldModelResponseV1, PluginError> {
    let trace_id = req.resolved_trace_id(now_unix_secs);
    let export = load_export(&req.input)?;
    let batch = backend.propose(req, &export)?;

    let mut proposals = normalize_proposals_value(&trace_id, &batch.raw, &now_unix_secs.to_string());
    let cap = req.options.max_new_proposals;
    if cap > 0 && proposals.proposals.len() > cap {
        proposals.proposals.truncate(cap);
    }

    let provenance = WorldModelProvenance {
        trace_id: trace_id.clone(),
        backend: backend.label().to_string(),
        axi_digest_v1: req
            .input
            .axi_digest_v1
            .clone()
            .or_else(|| export.axi_digest_v1.clone()),
    };
    let proposals = apply_world_model_provenance(proposals, &provenance);

    tracing::info!(
        trace_id = %trace_id,
        backend = backend.label(),
        export_items = export.items.len(),
        proposals = proposals.proposals.len(),
        "world model proposals"
    );

    Ok(WorldModelResponseV1 {
        protocol: WORLD_MODEL_PROTOCOL_V1.to_string(),
        trace_id,
        generated_at_unix_secs: now_unix_secs,
        proposals,
        notes: batch.notes,
        error: None,
    })
}

/// Failure envelope: same shape as success, empty proposals, `error` set.
pub fn world_model_error_response(
    trace_id: &str,
    now_unix_secs: u64,
    error: &PluginError,
) -> WorldModelResponseV1 {
    WorldModelResponseV1 {
        protocol: WORLD_MODEL_PROTOCOL_V1.to_string(),
        trace_id: trace_id.to_string(),
        generated_at_unix_secs: now_unix_secs,
        proposals: ProposalsFileV1::empty(WORLD_MODEL_SOURCE_TYPE, trace_id, now_unix_secs.to_string()),
        notes: Vec::new(),
        error: Some(error.to_string()),
    }
}
