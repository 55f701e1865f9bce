use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pinsx_core::{
    explore, plugin, DependencyPolicy, ExploreError, ExploreOptions, ProviderOptions, Reason,
    ReasonKind, RecordingHost, StateVector, Stats, Status, TypeId, EXIT_PROVIDER_FAILURE,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const EXIT_TOOL_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "pinsx")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    Describe(ModelArgs),
    Explore(ExploreArgs),
}

#[derive(Args)]
struct ModelArgs {
    file: PathBuf,

    #[arg(long, value_enum, default_value = "full")]
    dependencies: Dependencies,
}

#[derive(Args)]
struct ExploreArgs {
    #[command(flatten)]
    model: ModelArgs,

    #[arg(long)]
    invariant: Option<String>,

    #[arg(long, default_value_t = 1)]
    workers: usize,

    #[arg(long)]
    max_states: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum Dependencies {
    Full,
    Analyzed,
}

impl Dependencies {
    fn policy(self) -> DependencyPolicy {
        match self {
            Dependencies::Full => DependencyPolicy::Full,
            Dependencies::Analyzed => DependencyPolicy::Analyzed,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Dependencies::Full => "full",
            Dependencies::Analyzed => "analyzed",
        }
    }
}

#[derive(Serialize)]
struct ResultJson {
    schema_version: String,
    tool: ToolInfo,
    invocation: Invocation,
    inputs: Vec<InputInfo>,
    status: Status,
    exit_code: i32,
    started_at: String,
    finished_at: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<ModelSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<Stats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    violation: Option<StateVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<Reason>,
}

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    version: String,
    git_sha: String,
}

#[derive(Serialize)]
struct Invocation {
    command: String,
    args: Vec<String>,
    format: String,
    dependencies: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invariant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_states: Option<u64>,
}

#[derive(Serialize)]
struct InputInfo {
    path: String,
    sha256: String,
}

#[derive(Serialize)]
struct ModelSummary {
    state_length: usize,
    slots: Vec<NamedType>,
    labels: Vec<NamedType>,
    groups: usize,
    enum_values: Vec<EnumValue>,
    initial_state: StateVector,
    matrices: MatrixSummary,
}

#[derive(Serialize)]
struct NamedType {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Serialize)]
struct EnumValue {
    #[serde(rename = "type")]
    type_name: String,
    ordinal: u32,
    value: String,
}

#[derive(Serialize)]
struct MatrixSummary {
    dm_info: Vec<String>,
    read: Vec<String>,
    must_write: Vec<String>,
    state_label: Vec<String>,
}

/// What a subcommand produced, before timing and tool metadata are added.
struct Report {
    status: Status,
    exit_code: i32,
    model: Option<ModelSummary>,
    stats: Option<Stats>,
    violation: Option<StateVector>,
    truncated: Option<bool>,
    reason: Option<Reason>,
}

impl Report {
    fn error(exit_code: i32, kind: ReasonKind, message: String) -> Self {
        Self {
            status: Status::Error,
            exit_code,
            model: None,
            stats: None,
            violation: None,
            truncated: None,
            reason: Some(Reason {
                kind,
                message: Some(message),
            }),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("tool error: {err:#}");
            EXIT_TOOL_ERROR
        }
    };
    std::process::exit(exit_code);
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("invalid --log-level `{level}`"))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))
}

fn run(cli: Cli) -> Result<i32> {
    init_logging(cli.log_level.as_deref())?;
    validate(&cli)?;

    let started_at = Utc::now();
    let timer = Instant::now();

    let (report, inputs, invocation) = execute(&cli);

    let finished_at = Utc::now();
    let duration_ms = timer.elapsed().as_millis() as u64;

    let result = ResultJson {
        schema_version: "0.1".to_string(),
        tool: ToolInfo {
            name: "pinsx".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_sha: std::env::var("PINSX_GIT_SHA").unwrap_or_else(|_| "UNKNOWN".to_string()),
        },
        invocation,
        inputs,
        status: report.status,
        exit_code: report.exit_code,
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        finished_at: finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        duration_ms,
        model: report.model,
        stats: report.stats,
        violation: report.violation,
        truncated: report.truncated,
        reason: report.reason,
    };

    match cli.format {
        OutputFormat::Json => emit_json(&result, cli.output.as_deref()),
        OutputFormat::Text => emit_text(&result, cli.output.as_deref()),
    }?;

    Ok(result.exit_code)
}

fn validate(cli: &Cli) -> Result<()> {
    if let Command::Explore(args) = &cli.command {
        if args.workers == 0 {
            bail!("--workers must be >= 1");
        }
        if args.max_states == Some(0) {
            bail!("--max-states must be >= 1");
        }
    }
    Ok(())
}

fn execute(cli: &Cli) -> (Report, Vec<InputInfo>, Invocation) {
    let (command, model_args) = match &cli.command {
        Command::Describe(args) => ("describe", args),
        Command::Explore(args) => ("explore", &args.model),
    };
    let (inputs, io_error) = build_inputs(&[model_args.file.clone()]);

    let report = match (io_error, &cli.command) {
        (Some(message), _) => Report::error(EXIT_TOOL_ERROR, ReasonKind::InvalidInput, message),
        (None, Command::Describe(args)) => run_describe(args),
        (None, Command::Explore(args)) => run_explore(args),
    };

    let mut invocation = Invocation {
        command: command.to_string(),
        args: vec![model_args.file.to_string_lossy().to_string()],
        format: match cli.format {
            OutputFormat::Json => "json".to_string(),
            OutputFormat::Text => "text".to_string(),
        },
        dependencies: model_args.dependencies.as_str().to_string(),
        workers: None,
        invariant: None,
        max_states: None,
    };
    if let Command::Explore(args) = &cli.command {
        invocation.workers = Some(args.workers);
        invocation.invariant = args.invariant.clone();
        invocation.max_states = args.max_states;
    }

    (report, inputs, invocation)
}

fn build_inputs(paths: &[PathBuf]) -> (Vec<InputInfo>, Option<String>) {
    let mut inputs = Vec::new();
    let mut error: Option<String> = None;

    for path in paths {
        match compute_sha256(path) {
            Ok(sha256) => inputs.push(InputInfo {
                path: path.to_string_lossy().to_string(),
                sha256,
            }),
            Err(err) => {
                if error.is_none() {
                    error = Some(err);
                }
                inputs.push(InputInfo {
                    path: path.to_string_lossy().to_string(),
                    sha256: "UNKNOWN".to_string(),
                });
            }
        }
    }

    (inputs, error)
}

fn compute_sha256(path: &Path) -> Result<String, String> {
    let data = fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// Loads the model into a fresh host. A failed load leaves the host
/// unregistered with the abort code latched.
fn load(args: &ModelArgs) -> std::result::Result<RecordingHost, Report> {
    let options = ProviderOptions {
        dependency_policy: args.dependencies.policy(),
    };
    let mut host = RecordingHost::new();
    match plugin().load(&args.file, &mut host, &options) {
        Ok(()) => Ok(host),
        Err(err) => Err(Report::error(
            host.abort_code().unwrap_or(EXIT_PROVIDER_FAILURE),
            ReasonKind::ModelLoad,
            err.to_string(),
        )),
    }
}

fn run_describe(args: &ModelArgs) -> Report {
    let host = match load(args) {
        Ok(host) => host,
        Err(report) => return report,
    };
    match summarize(&host) {
        Some(model) => Report {
            status: Status::Pass,
            exit_code: 0,
            model: Some(model),
            stats: None,
            violation: None,
            truncated: None,
            reason: None,
        },
        None => Report::error(
            EXIT_PROVIDER_FAILURE,
            ReasonKind::InternalError,
            "model load did not register a complete descriptor".to_string(),
        ),
    }
}

fn run_explore(args: &ExploreArgs) -> Report {
    let host = match load(&args.model) {
        Ok(host) => host,
        Err(report) => return report,
    };
    let options = ExploreOptions {
        workers: args.workers,
        invariant: args.invariant.clone(),
        max_states: args.max_states,
    };
    debug!(workers = options.workers, "starting exploration");

    match explore(&host, &options) {
        Ok(outcome) => {
            if outcome.truncated {
                warn!(states = ?outcome.stats.states, "state bound reached; search is incomplete");
            }
            let reason = outcome.abort_code.map(|code| Reason {
                kind: ReasonKind::ProviderFailure,
                message: Some(format!("provider aborted exploration with code {code}")),
            });
            Report {
                status: outcome.status(),
                exit_code: outcome.exit_code(),
                model: None,
                stats: Some(outcome.stats.clone()),
                violation: outcome.violation.clone(),
                truncated: Some(outcome.truncated),
                reason,
            }
        }
        Err(err @ ExploreError::UnknownInvariant(_)) => {
            Report::error(EXIT_TOOL_ERROR, ReasonKind::InvalidInput, err.to_string())
        }
        Err(err) => Report::error(EXIT_TOOL_ERROR, ReasonKind::InternalError, err.to_string()),
    }
}

fn summarize(host: &RecordingHost) -> Option<ModelSummary> {
    let lts_type = host.lts_type()?;
    let type_name = |type_id: TypeId| {
        lts_type
            .type_decl(type_id)
            .map(|decl| decl.name.clone())
            .unwrap_or_default()
    };

    Some(ModelSummary {
        state_length: lts_type.state_length(),
        slots: lts_type
            .slots()
            .iter()
            .map(|slot| NamedType {
                name: slot.name.clone(),
                type_name: type_name(slot.type_id),
            })
            .collect(),
        labels: lts_type
            .labels()
            .iter()
            .map(|label| NamedType {
                name: label.name.clone(),
                type_name: type_name(label.type_id),
            })
            .collect(),
        groups: host.dm_info()?.rows(),
        enum_values: host
            .enum_values()
            .iter()
            .map(|(type_id, ordinal, value)| EnumValue {
                type_name: type_name(*type_id),
                ordinal: *ordinal,
                value: value.clone(),
            })
            .collect(),
        initial_state: host.initial_state()?.clone(),
        matrices: MatrixSummary {
            dm_info: host.dm_info()?.to_rows(),
            read: host.dm_info_read()?.to_rows(),
            must_write: host.dm_info_must_write()?.to_rows(),
            state_label: host.state_label_info()?.to_rows(),
        },
    })
}

fn emit_json(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let payload = serde_json::to_string_pretty(result).context("serialize result json")?;
    if let Some(path) = output {
        write_atomic(path, payload.as_bytes())?;
        return Ok(());
    }

    println!("{payload}");
    Ok(())
}

fn emit_text(result: &ResultJson, output: Option<&Path>) -> Result<()> {
    let mut lines = vec![format!(
        "status={} exit_code={}",
        status_label(&result.status),
        result.exit_code
    )];
    if let Some(model) = &result.model {
        lines.push(format!(
            "state_length={} groups={} labels={}",
            model.state_length,
            model.groups,
            model.labels.len()
        ));
        lines.extend(matrix_lines("dm_info", &model.matrices.dm_info));
        lines.extend(matrix_lines("state_label", &model.matrices.state_label));
    }
    if let Some(stats) = &result.stats {
        lines.push(format!(
            "states={} transitions={}",
            count_label(stats.states),
            count_label(stats.transitions)
        ));
    }
    if let Some(violation) = &result.violation {
        lines.push(format!("violation={:?}", violation.as_slice()));
    }
    if let Some(message) = result.reason.as_ref().and_then(|reason| reason.message.as_ref()) {
        lines.push(format!("reason={message}"));
    }

    let summary = lines.join("\n");
    if let Some(path) = output {
        write_atomic(path, summary.as_bytes())?;
        return Ok(());
    }
    println!("{summary}");
    Ok(())
}

fn matrix_lines<'a>(name: &'a str, rows: &'a [String]) -> impl Iterator<Item = String> + 'a {
    rows.iter()
        .enumerate()
        .map(move |(row, cells)| format!("{name}[{row}]={cells}"))
}

fn count_label(count: Option<u64>) -> String {
    count.map_or_else(|| "unknown".to_string(), |count| count.to_string())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("rename {}", path.display()))?;
    Ok(())
}

fn status_label(status: &Status) -> &'static str {
    match status {
        Status::Pass => "pass",
        Status::Fail => "fail",
        Status::Error => "error",
    }
}
