//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::{info, warn};

use leadflow_adapters::CapabilityRegistry;
use leadflow_core::{
    AgentKind, Engine, PipelineDefinition, ProgressReporter, RunOptions, RunOutcome,
};
use leadflow_shared::{
    AppConfig, CapabilityKind, RetryPolicy, RunId, TraceEntry, TracePhase, init_config,
    load_config, load_config_from, render_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leadflow: find, score and contact leads through a declarative pipeline.
#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Run lead-generation pipelines with traced, fallback-safe capabilities.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.leadflow/leadflow.toml).
    #[arg(long, global = true, env = "LEADFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a pipeline and write its trace and feedback report.
    Run {
        /// Workflow definition (defaults to `defaults.workflow`).
        #[arg(short, long)]
        workflow: Option<PathBuf>,

        /// JSON object seeded into the shared context before the first step.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Send real messages even when `defaults.dry_run` is set.
        #[arg(long)]
        send: bool,

        /// Serve every capability synthetically.
        #[arg(long, conflicts_with = "send")]
        synthetic: bool,
    },

    /// Validate a workflow definition without running it.
    Validate {
        /// Workflow definition (defaults to `defaults.workflow`).
        #[arg(short, long)]
        workflow: Option<PathBuf>,
    },

    /// Summarise a recorded trace file.
    Trace {
        /// Path to a `.trace.jsonl` file.
        file: PathBuf,

        /// Print every entry, not just the per-step summary.
        #[arg(long)]
        entries: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadflow=info",
        1 => "leadflow=debug",
        _ => "leadflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            workflow,
            input,
            out,
            send,
            synthetic,
        } => {
            let config = resolve_config(config_path)?;
            let args = RunArgs {
                workflow,
                input,
                out,
                send,
                synthetic,
            };
            cmd_run(&config, args).await
        }
        Command::Validate { workflow } => {
            let config = resolve_config(config_path)?;
            cmd_validate(&config, workflow.as_deref())
        }
        Command::Trace { file, entries } => cmd_trace(&file, entries),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn load_definition(config: &AppConfig, workflow: Option<&Path>) -> Result<PipelineDefinition> {
    let path = workflow
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.workflow));
    PipelineDefinition::load(&path)
        .wrap_err_with(|| format!("failed to load workflow '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunArgs {
    workflow: Option<PathBuf>,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
    send: bool,
    synthetic: bool,
}

async fn cmd_run(config: &AppConfig, args: RunArgs) -> Result<()> {
    let definition = load_definition(config, args.workflow.as_deref())?;
    let initial = match &args.input {
        Some(path) => read_initial_context(path)?,
        None => Map::new(),
    };
    let out_dir = args
        .out
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let mut force_synthetic = BTreeSet::new();
    if args.synthetic {
        force_synthetic.extend(CapabilityKind::ALL);
    } else if config.defaults.dry_run && !args.send {
        force_synthetic.insert(CapabilityKind::MessageSending);
    }

    let registry = CapabilityRegistry::from_config(config)?;
    let engine = Engine::new(
        registry,
        RunOptions {
            retry: RetryPolicy::from(&config.retry),
            force_synthetic: force_synthetic.clone(),
            concurrency: config.defaults.concurrency as usize,
        },
    );

    for kind in definition.declared_capabilities() {
        if force_synthetic.contains(&kind) || config.provider(kind).is_none() {
            continue;
        }
        if let Err(e) = validate_api_key(config, kind) {
            warn!(capability = %kind, "{e}; using synthetic data");
        }
    }

    info!(
        workflow = %definition.workflow_name,
        steps = definition.steps.len(),
        dry_run = force_synthetic.contains(&CapabilityKind::MessageSending),
        "running pipeline"
    );

    let reporter = CliProgress::new();
    let outcome = match engine.run(&definition, initial, &reporter).await {
        Ok(outcome) => outcome,
        Err(failure) => {
            reporter.spinner.finish_and_clear();
            if !failure.trace.is_empty() {
                let path = write_trace(&out_dir, &failure.run_id, &failure.trace)?;
                eprintln!("  Partial trace written to {}", path.display());
            }
            return Err(failure.into());
        }
    };

    let trace_path = write_trace(&out_dir, &outcome.run_id, &outcome.trace)?;
    let report_path = match outcome.report() {
        Some(report) => {
            let path = out_dir.join(format!("{}.feedback.json", outcome.run_id));
            std::fs::write(&path, serde_json::to_string_pretty(&report)?)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            Some(path)
        }
        None => None,
    };

    print_outcome(&outcome, &trace_path, report_path.as_deref());
    Ok(())
}

fn read_initial_context(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(eyre!("'{}' must contain a JSON object", path.display())),
    }
}

fn write_trace(out_dir: &Path, run_id: &RunId, entries: &[TraceEntry]) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .wrap_err_with(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("{run_id}.trace.jsonl"));
    std::fs::write(&path, leadflow_core::to_jsonl(entries)?)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn print_outcome(outcome: &RunOutcome, trace_path: &Path, report_path: Option<&Path>) {
    let summary = outcome.summary();

    println!();
    println!("  Pipeline '{}' completed", outcome.pipeline);
    println!("  Run:        {}", outcome.run_id);
    println!("  Leads:      {}", summary.leads);
    println!("  Qualified:  {}", summary.qualified);
    println!(
        "  Contacted:  {} ({} failed)",
        summary.contacted, summary.send_failures
    );
    println!("  Engaged:    {}", summary.engaged);
    if let Some((company, score)) = &summary.top_lead {
        println!("  Top lead:   {company} ({score:.1})");
    }
    let served: Vec<String> = outcome
        .capabilities
        .iter()
        .map(|(kind, by)| format!("{kind}={by}"))
        .collect();
    println!("  Sources:    {}", served.join(", "));
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!("  Trace:      {}", trace_path.display());
    if let Some(path) = report_path {
        println!("  Feedback:   {}", path.display());
    }

    if let Some(report) = outcome.report() {
        if !report.recommendations.is_empty() {
            println!();
            println!("  Recommendations:");
            for recommendation in &report.recommendations {
                println!("    - {recommendation}");
            }
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn run_started(&self, pipeline: &str, steps: usize) {
        self.spinner
            .set_message(format!("Running {pipeline} ({steps} steps)"));
    }

    fn step_started(&self, index: usize, total: usize, step_id: &str, agent: AgentKind) {
        self.spinner
            .set_message(format!("[{}/{total}] {step_id} ({agent})", index + 1));
    }

    fn step_finished(&self, step_id: &str, elapsed: Duration) {
        self.spinner
            .println(format!("  ✓ {step_id} ({}ms)", elapsed.as_millis()));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// validate / trace
// ---------------------------------------------------------------------------

fn cmd_validate(config: &AppConfig, workflow: Option<&Path>) -> Result<()> {
    let definition = load_definition(config, workflow)?;
    let registry = CapabilityRegistry::from_config(config)?;

    match definition.validate(&registry) {
        Ok(pipeline) => {
            println!("  '{}' is valid", pipeline.name);
            for (index, step) in pipeline.steps.iter().enumerate() {
                let capabilities: Vec<&str> = step
                    .required_capabilities
                    .iter()
                    .map(CapabilityKind::as_str)
                    .collect();
                println!(
                    "  {:>2}. {:<20} {:<24} {}",
                    index + 1,
                    step.id,
                    step.agent.as_str(),
                    capabilities.join(", ")
                );
            }
            Ok(())
        }
        Err(e) => {
            for violation in e.violations() {
                eprintln!("  ✗ {violation}");
            }
            Err(e.into())
        }
    }
}

fn cmd_trace(file: &Path, show_entries: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let entries = leadflow_core::from_jsonl(&content)?;
    let steps = leadflow_core::timeline(&entries)?;

    println!();
    println!(
        "  {:<20} {:>8} {:>6} {:>4} {:>8} {:>10}",
        "step", "ms", "reason", "act", "observe", "synthetic"
    );
    for step in &steps {
        println!(
            "  {:<20} {:>8} {:>6} {:>4} {:>8} {:>10}{}",
            step.step_id,
            step.duration().num_milliseconds(),
            step.count(TracePhase::Reason),
            step.count(TracePhase::Act),
            step.count(TracePhase::Observe),
            step.synthetic_acts,
            if step.completed { "" } else { "  (incomplete)" },
        );
    }
    println!();

    if show_entries {
        for entry in &entries {
            println!(
                "  {:>4} {} {:<20} {:<8} {}",
                entry.sequence,
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.step_id,
                entry.phase.to_string(),
                entry.message
            );
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    println!("{}", render_config(&config)?);
    Ok(())
}
