//! Pipeline execution engine.
//!
//! A run validates the whole definition, resolves capabilities once, then
//! executes steps strictly in declaration order: render inputs, run the
//! unit, check the output schema, merge the delta. The first fatal error
//! stops the run and is returned with the trace recorded so far.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{Instrument, info, info_span, instrument, warn};

use leadflow_adapters::{
    CapabilityRegistry, ResolveOptions, ResolvedCapabilities, ServedBy,
};
use leadflow_shared::{
    CapabilityKind, FeedbackReport, LeadflowError, Result, RetryPolicy, RunId, TraceEntry,
    Violation,
};

use crate::context::SharedContext;
use crate::definition::{AgentKind, Pipeline, PipelineDefinition, StepDefinition};
use crate::report::{self, RunSummary};
use crate::template;
use crate::trace::TraceRecorder;
use crate::units::{self, Delta, StepEnv};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the definition is valid and capabilities are resolved.
    fn run_started(&self, pipeline: &str, steps: usize);
    /// Called before a step runs. `index` is 0-based.
    fn step_started(&self, index: usize, total: usize, step_id: &str, agent: AgentKind);
    /// Called after a step's output has been merged.
    fn step_finished(&self, step_id: &str, elapsed: Duration);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn run_started(&self, _pipeline: &str, _steps: usize) {}
    fn step_started(&self, _index: usize, _total: usize, _step_id: &str, _agent: AgentKind) {}
    fn step_finished(&self, _step_id: &str, _elapsed: Duration) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub retry: RetryPolicy,
    /// Capabilities to serve synthetically even when a live adapter is usable.
    pub force_synthetic: BTreeSet<CapabilityKind>,
    /// Maximum capability calls a fan-out step keeps in flight.
    pub concurrency: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            force_synthetic: BTreeSet::new(),
            concurrency: 4,
        }
    }
}

/// A completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub pipeline: String,
    pub context: SharedContext,
    pub trace: Vec<TraceEntry>,
    /// How each required capability resolved at run start.
    pub capabilities: Vec<(CapabilityKind, ServedBy)>,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// The feedback report, if the pipeline ran a feedback step.
    pub fn report(&self) -> Option<FeedbackReport> {
        report::report_from_context(&self.context)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_context(&self.context)
    }
}

/// A run that stopped on a fatal error.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} stopped at {}: {error}", .failed_step.as_deref().unwrap_or("validation"))]
pub struct RunFailure {
    pub run_id: RunId,
    pub error: LeadflowError,
    /// Step that failed; `None` when the run never started executing.
    pub failed_step: Option<String>,
    /// Trace entries recorded before the failure.
    pub trace: Vec<TraceEntry>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs pipeline definitions against a capability registry. Holds no state
/// between runs.
pub struct Engine {
    registry: CapabilityRegistry,
    options: RunOptions,
}

impl Engine {
    pub fn new(registry: CapabilityRegistry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Run `definition` from `initial` context data.
    #[instrument(skip_all, fields(pipeline = %definition.workflow_name))]
    pub async fn run(
        &self,
        definition: &PipelineDefinition,
        initial: Map<String, Value>,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        let start = Instant::now();
        let run_id = RunId::new();
        let before_start = |error: LeadflowError| RunFailure {
            run_id: run_id.clone(),
            error,
            failed_step: None,
            trace: Vec::new(),
        };

        let pipeline = definition
            .validate_with(&self.registry, &initial)
            .map_err(before_start)?;

        let resolve = ResolveOptions {
            retry: self.options.retry,
            force_synthetic: self.options.force_synthetic.clone(),
        };
        let capabilities = Arc::new(
            self.registry
                .resolve(pipeline.required_capabilities(), &resolve)
                .map_err(before_start)?,
        );

        let limiter = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        info!(
            %run_id,
            steps = pipeline.steps.len(),
            concurrency = self.options.concurrency,
            "starting run"
        );
        progress.run_started(&pipeline.name, pipeline.steps.len());

        let mut context = SharedContext::new(pipeline.config.clone(), initial);
        let mut trace = TraceRecorder::new();
        let total = pipeline.steps.len();

        for (index, step) in pipeline.steps.iter().enumerate() {
            progress.step_started(index, total, &step.id, step.agent);
            let started = Instant::now();
            let span = info_span!("step", step = %step.id, agent = %step.agent);

            match run_step(&pipeline, step, &capabilities, &limiter, &context, &mut trace)
                .instrument(span)
                .await
            {
                Ok(delta) => {
                    context.merge(&step.id, delta);
                    progress.step_finished(&step.id, started.elapsed());
                }
                Err(error) => {
                    warn!(%run_id, step = %step.id, %error, "run stopped");
                    return Err(RunFailure {
                        run_id,
                        error,
                        failed_step: Some(step.id.clone()),
                        trace: trace.into_entries(),
                    });
                }
            }
        }

        let outcome = RunOutcome {
            run_id,
            pipeline: pipeline.name.clone(),
            context,
            trace: trace.into_entries(),
            capabilities: capabilities.summary(),
            elapsed: start.elapsed(),
        };
        info!(
            run_id = %outcome.run_id,
            trace_entries = outcome.trace.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&outcome);
        Ok(outcome)
    }
}

async fn run_step(
    pipeline: &Pipeline,
    step: &StepDefinition,
    capabilities: &Arc<ResolvedCapabilities>,
    limiter: &Arc<Semaphore>,
    context: &SharedContext,
    trace: &mut TraceRecorder,
) -> Result<Delta> {
    let inputs = match template::render(&step.input_template, context) {
        Ok(Value::Object(inputs)) => inputs,
        Ok(_) => Map::new(),
        Err(unresolved) => {
            return Err(LeadflowError::configuration(
                unresolved
                    .into_iter()
                    .map(|path| {
                        Violation::step(&step.id, format!("`{{{{{path}}}}}` did not resolve"))
                    })
                    .collect(),
            ));
        }
    };

    let env = StepEnv {
        step,
        pipeline,
        capabilities,
        limiter,
        context,
        inputs,
    };
    let delta = units::execute(&env, trace).await?;

    let problems = step.output_schema.check(&Value::Object(delta.clone()));
    if !problems.is_empty() {
        return Err(LeadflowError::SchemaViolation {
            step_id: step.id.clone(),
            problems,
        });
    }
    Ok(delta)
}
