//! Axiograph plugin process.
//!
//! Spawned by the Axiograph REPL / DB server once per request:
//!
//!   axiograph> llm use command axiograph-plugin
//!   axiograph> llm ask find Node named b
//!
//! stdin: one JSON request, stdout: one JSON response line. Logs go to stderr
//! (`RUST_LOG`), so stdout never carries anything but the response.
//!
//! Exit status: 0 for handled requests (including `{"error": ...}` replies),
//! 1 for a request that is not JSON (or a world model request the plugin cannot
//! run as configured), 2 when a world model backend fails.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use axiograph_plugin::json_extract::parse_llm_json;
use axiograph_plugin::{
    default_trace_id, dispatch, normalize_proposals_value, now_unix_secs, parse_request,
    ConfigOverrides, PluginConfig, WorldModelBackendKind, WorldModelStrategy,
};

#[derive(Parser)]
#[command(name = "axiograph-plugin")]
#[command(
    author,
    version,
    about = "Axiograph LLM / world model plugin (stdin request → stdout response)"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Read the request from a file instead of stdin.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Pretty-print the response.
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Backend label reported in tool-loop notes [env: AXIOGRAPH_PLUGIN_BACKEND_LABEL].
    #[arg(long)]
    backend_label: Option<String>,

    /// World model backend: baseline | stub | recorded [env: WORLD_MODEL_BACKEND].
    #[arg(long)]
    world_model_backend: Option<WorldModelBackendKind>,

    /// Baseline strategy: oracle | random [env: WORLD_MODEL_STRATEGY].
    #[arg(long)]
    strategy: Option<WorldModelStrategy>,

    /// Recorded model output for the `recorded` backend [env: WORLD_MODEL_MODEL_PATH].
    #[arg(long)]
    model_path: Option<PathBuf>,
}

impl ConfigArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            backend_label: self.backend_label.clone(),
            world_model_backend: self.world_model_backend,
            strategy: self.strategy,
            model_path: self.model_path.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalize a proposals file (or free-form model output containing one).
    Normalize {
        /// Input JSON (document, bare proposal list, or text wrapping either).
        input: PathBuf,

        /// Output path (default: stdout).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Trace id used for fallback proposal ids (default: `wm::<now>`).
        #[arg(long)]
        trace_id: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;
    let config = PluginConfig::resolve(&cli.config.overrides())?;
    tracing::debug!(?config, "resolved configuration");

    match &cli.command {
        Some(Commands::Normalize {
            input,
            out,
            trace_id,
        }) => cmd_normalize(input, out.as_deref(), trace_id.as_deref()),
        None => {
            let code = cmd_handle_request(cli.request.as_deref(), cli.pretty, &config)?;
            if code != 0 {
                io::stdout().flush()?;
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("axiograph_plugin=warn"))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn read_request_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read request file {}", path.display())),
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| anyhow!("failed to read stdin: {e}"))?;
            Ok(input)
        }
    }
}

/// Handle one request; returns the process exit code.
fn cmd_handle_request(path: Option<&Path>, pretty: bool, config: &PluginConfig) -> Result<i32> {
    let input = read_request_text(path)?;
    let request = parse_request(&input)?;
    let reply = dispatch(&request, config, now_unix_secs());

    let json = if pretty {
        serde_json::to_string_pretty(&reply.body)?
    } else {
        serde_json::to_string(&reply.body)?
    };
    println!("{json}");
    Ok(reply.exit_code)
}

fn cmd_normalize(input: &Path, out: Option<&Path>, trace_id: Option<&str>) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let raw: Value = parse_llm_json(&text)
        .with_context(|| format!("{} does not contain JSON", input.display()))?;

    let now = now_unix_secs();
    let trace_id = trace_id
        .map(str::to_string)
        .unwrap_or_else(|| default_trace_id(now));
    let proposals = normalize_proposals_value(&trace_id, &raw, &now.to_string());

    let records = match &raw {
        Value::Array(items) => items.len(),
        other => other
            .get("proposals")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
    };
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for p in &proposals.proposals {
        *by_kind.entry(p.kind_str()).or_default() += 1;
    }

    let json = serde_json::to_string_pretty(&proposals)?;
    match out {
        Some(out) => {
            fs::write(out, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{json}"),
    }

    eprintln!(
        "{} {} → {}",
        "Normalized".green().bold(),
        input.display(),
        out.map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string())
    );
    let counts: Vec<String> = by_kind
        .iter()
        .map(|(kind, n)| format!("{} {kind}", n.to_string().cyan()))
        .collect();
    eprintln!(
        "  {} (trace_id={})",
        if counts.is_empty() {
            "no proposals".to_string()
        } else {
            counts.join(", ")
        },
        trace_id
    );
    let skipped = records.saturating_sub(proposals.proposals.len());
    if skipped > 0 {
        eprintln!(
            "  {} {} non-object record(s) skipped",
            "warning:".yellow().bold(),
            skipped
        );
    }
    Ok(())
}
