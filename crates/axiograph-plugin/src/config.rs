//! Plugin configuration.
//!
//! Precedence for every setting:
//! 1) explicit override (CLI flag)
//! 2) environment variable
//! 3) built-in default
//!
//! World model settings are only needed by `axiograph_world_model_v1`
//! requests, so a bad `WORLD_MODEL_*` value is kept as an error next to the
//! resolved config and reported by the world model handler. LLM requests
//! never look at it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::PluginError;

pub const AXIOGRAPH_PLUGIN_BACKEND_LABEL_ENV: &str = "AXIOGRAPH_PLUGIN_BACKEND_LABEL";
pub const WORLD_MODEL_BACKEND_ENV: &str = "WORLD_MODEL_BACKEND";
pub const WORLD_MODEL_STRATEGY_ENV: &str = "WORLD_MODEL_STRATEGY";
pub const WORLD_MODEL_MODEL_PATH_ENV: &str = "WORLD_MODEL_MODEL_PATH";

/// Label reported in tool-loop notes (`backend=<label> (deterministic)`).
pub const DEFAULT_BACKEND_LABEL: &str = "axiograph_plugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldModelBackendKind {
    #[default]
    Baseline,
    Stub,
    Recorded,
}

impl WorldModelBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldModelBackendKind::Baseline => "baseline",
            WorldModelBackendKind::Stub => "stub",
            WorldModelBackendKind::Recorded => "recorded",
        }
    }
}

impl fmt::Display for WorldModelBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorldModelBackendKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(WorldModelBackendKind::Baseline),
            "stub" => Ok(WorldModelBackendKind::Stub),
            "recorded" => Ok(WorldModelBackendKind::Recorded),
            other => Err(PluginError::InvalidConfig(format!(
                "unknown world model backend `{other}` (expected baseline|stub|recorded)"
            ))),
        }
    }
}

/// Baseline proposal strategy. Only the reported confidence differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldModelStrategy {
    #[default]
    Oracle,
    Random,
}

impl WorldModelStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldModelStrategy::Oracle => "oracle",
            WorldModelStrategy::Random => "random",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            WorldModelStrategy::Oracle => 0.9,
            WorldModelStrategy::Random => 0.5,
        }
    }
}

impl fmt::Display for WorldModelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorldModelStrategy {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" => Ok(WorldModelStrategy::Oracle),
            "random" => Ok(WorldModelStrategy::Random),
            other => Err(PluginError::InvalidConfig(format!(
                "unknown world model strategy `{other}` (expected oracle|random)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldModelConfig {
    pub backend: WorldModelBackendKind,
    pub strategy: WorldModelStrategy,
    /// Recorded model output, used when the request carries no `options.model_path`.
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    pub backend_label: String,
    pub world_model: Result<WorldModelConfig, PluginError>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            backend_label: DEFAULT_BACKEND_LABEL.to_string(),
            world_model: Ok(WorldModelConfig::default()),
        }
    }
}

/// Values given explicitly (e.g. on the command line).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_label: Option<String>,
    pub world_model_backend: Option<WorldModelBackendKind>,
    pub strategy: Option<WorldModelStrategy>,
    pub model_path: Option<PathBuf>,
}

impl PluginConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, PluginError> {
        Self::resolve_with(overrides, env_value)
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn resolve_with<F>(overrides: &ConfigOverrides, lookup: F) -> Result<Self, PluginError>
    where
        F: Fn(&str) -> Result<Option<String>, PluginError>,
    {
        let backend_label = match overrides.backend_label.clone() {
            Some(label) => label,
            None => lookup(AXIOGRAPH_PLUGIN_BACKEND_LABEL_ENV)?
                .unwrap_or_else(|| DEFAULT_BACKEND_LABEL.to_string()),
        };

        Ok(Self {
            backend_label,
            world_model: WorldModelConfig::resolve_with(overrides, &lookup),
        })
    }
}

impl WorldModelConfig {
    pub fn resolve_with<F>(overrides: &ConfigOverrides, lookup: F) -> Result<Self, PluginError>
    where
        F: Fn(&str) -> Result<Option<String>, PluginError>,
    {
        let backend = match overrides.world_model_backend {
            Some(b) => b,
            None => lookup(WORLD_MODEL_BACKEND_ENV)?
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        let strategy = match overrides.strategy {
            Some(s) => s,
            None => lookup(WORLD_MODEL_STRATEGY_ENV)?
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        let model_path = match overrides.model_path.clone() {
            Some(p) => Some(p),
            None => lookup(WORLD_MODEL_MODEL_PATH_ENV)?.map(PathBuf::from),
        };

        Ok(Self {
            backend,
            strategy,
            model_path,
        })
    }
}

/// Trimmed, non-empty value of `name`; unset and blank both read as `None`.
fn env_value(name: &str) -> Result<Option<String>, PluginError> {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            Ok((!v.is_empty()).then(|| v.to_string()))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(PluginError::InvalidConfig(format!("failed to read {name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Result<Option<String>, PluginError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| Ok(vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_env_or_flags() {
        let cfg = PluginConfig::resolve_with(&ConfigOverrides::default(), lookup(&[]))
            .expect("config");
        assert_eq!(cfg, PluginConfig::default());
        assert_eq!(cfg.backend_label, "axiograph_plugin");
        let wm = cfg.world_model.expect("world model config");
        assert_eq!(wm.backend, WorldModelBackendKind::Baseline);
        assert_eq!(wm.strategy, WorldModelStrategy::Oracle);
    }

    #[test]
    fn env_fills_unset_flags() {
        let cfg = PluginConfig::resolve_with(
            &ConfigOverrides {
                strategy: Some(WorldModelStrategy::Oracle),
                ..ConfigOverrides::default()
            },
            lookup(&[
                (AXIOGRAPH_PLUGIN_BACKEND_LABEL_ENV, "mock_plugin"),
                (WORLD_MODEL_BACKEND_ENV, "Recorded"),
                (WORLD_MODEL_STRATEGY_ENV, "random"),
                (WORLD_MODEL_MODEL_PATH_ENV, "/tmp/out.txt"),
            ]),
        )
        .expect("config");
        assert_eq!(cfg.backend_label, "mock_plugin");
        let wm = cfg.world_model.expect("world model config");
        assert_eq!(wm.backend, WorldModelBackendKind::Recorded);
        assert_eq!(wm.strategy, WorldModelStrategy::Oracle);
        assert_eq!(wm.model_path, Some(PathBuf::from("/tmp/out.txt")));
    }

    #[test]
    fn invalid_world_model_env_only_poisons_world_model_settings() {
        let cfg = PluginConfig::resolve_with(
            &ConfigOverrides::default(),
            lookup(&[
                (AXIOGRAPH_PLUGIN_BACKEND_LABEL_ENV, "mock_plugin"),
                (WORLD_MODEL_BACKEND_ENV, "openai"),
            ]),
        )
        .expect("label still resolves");
        assert_eq!(cfg.backend_label, "mock_plugin");
        let err = cfg.world_model.expect_err("openai is not a backend here");
        assert!(matches!(err, PluginError::InvalidConfig(_)));
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn flag_masks_invalid_env_value() {
        let wm = WorldModelConfig::resolve_with(
            &ConfigOverrides {
                world_model_backend: Some(WorldModelBackendKind::Stub),
                ..ConfigOverrides::default()
            },
            lookup(&[(WORLD_MODEL_BACKEND_ENV, "onnx")]),
        )
        .expect("flag wins over env");
        assert_eq!(wm.backend, WorldModelBackendKind::Stub);
    }

    #[test]
    fn strategy_confidence() {
        assert_eq!("RANDOM".parse::<WorldModelStrategy>(), Ok(WorldModelStrategy::Random));
        assert!(WorldModelStrategy::Oracle.confidence() > WorldModelStrategy::Random.confidence());
    }
}
