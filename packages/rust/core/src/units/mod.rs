//! Executable units, one per [`AgentKind`].
//!
//! A unit reads its rendered inputs (falling back to the shared context for
//! well-known keys), calls capabilities through the run's resolved set,
//! records a reason/act/observe trace, and returns an output delta. Units
//! never touch the context directly; the engine merges the delta.

mod enrichment;
mod feedback_trainer;
mod outreach_content;
mod outreach_executor;
mod prospect_search;
mod response_tracker;
mod scoring;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use leadflow_adapters::ResolvedCapabilities;
use leadflow_shared::{Lead, LeadflowError, Result};

use crate::context::{LEADS_KEY, SharedContext};
use crate::definition::{AgentKind, Pipeline, StepDefinition};
use crate::trace::TraceRecorder;

/// Output delta of one step.
pub type Delta = Map<String, Value>;

/// Everything a unit may read while it runs.
pub struct StepEnv<'a> {
    pub step: &'a StepDefinition,
    pub pipeline: &'a Pipeline,
    pub capabilities: &'a Arc<ResolvedCapabilities>,
    /// Bounds capability calls a unit has in flight at once.
    pub limiter: &'a Arc<Semaphore>,
    pub context: &'a SharedContext,
    /// The step's rendered input template.
    pub inputs: Map<String, Value>,
}

impl StepEnv<'_> {
    /// Input `key`, or `None` when absent or null.
    pub fn input<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.inputs.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.decode(key, value).map(Some),
        }
    }

    /// Input `key`, falling back to the root context key of the same name.
    pub fn input_or_context<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.input(key)? {
            return Ok(Some(value));
        }
        match self.context.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.decode(key, value).map(Some),
        }
    }

    /// Like [`input_or_context`](Self::input_or_context) but absent is an error.
    pub fn required<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.input_or_context(key)?
            .ok_or_else(|| self.failed(format!("missing input `{key}`")))
    }

    /// The lead list this step works on.
    pub fn leads(&self) -> Result<Vec<Lead>> {
        Ok(self.input_or_context(LEADS_KEY)?.unwrap_or_default())
    }

    /// The first reason message: the step's instructions, or `default`.
    pub fn goal(&self, default: &str) -> String {
        self.step
            .instructions
            .clone()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn failed(&self, message: impl Into<String>) -> LeadflowError {
        LeadflowError::step_failed(&self.step.id, message)
    }

    /// Serialize an output value.
    pub fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| self.failed(format!("output `{key}`: {e}")))
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone())
            .map_err(|e| self.failed(format!("input `{key}`: {e}")))
    }
}

/// Run the unit for `env.step.agent`.
pub async fn execute(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    match env.step.agent {
        AgentKind::ProspectSearch => prospect_search::run(env, trace).await,
        AgentKind::DataEnrichment => enrichment::run(env, trace).await,
        AgentKind::Scoring => scoring::run(env, trace),
        AgentKind::OutreachContent => outreach_content::run(env, trace).await,
        AgentKind::OutreachExecutor => outreach_executor::run(env, trace).await,
        AgentKind::ResponseTracker => response_tracker::run(env, trace).await,
        AgentKind::FeedbackTrainer => feedback_trainer::run(env, trace),
    }
}

/// Call a capability once per item, holding a `limiter` permit for each
/// call. Results come back in item order.
async fn fan_out<I, T, F, Fut>(
    env: &StepEnv<'_>,
    items: &[I],
    call: F,
) -> Result<Vec<Option<Result<T>>>>
where
    I: Clone,
    T: Send + 'static,
    F: Fn(Arc<ResolvedCapabilities>, I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, item) in items.iter().cloned().enumerate() {
        let limiter = Arc::clone(env.limiter);
        let pending = call(Arc::clone(env.capabilities), item);
        tasks.spawn(async move {
            let _permit = limiter.acquire_owned().await;
            (index, pending.await)
        });
    }

    let mut results: Vec<Option<Result<T>>> = (0..items.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| env.failed(format!("capability task: {e}")))?;
        results[index] = Some(result);
    }
    Ok(results)
}

/// Attach `lead_id` (and anything else) to a provenance record.
fn with_fields(mut details: Value, fields: &[(&str, Value)]) -> Value {
    if let Value::Object(map) = &mut details {
        for (key, value) in fields {
            map.insert((*key).to_string(), value.clone());
        }
    }
    details
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving a single unit in tests.

    use std::collections::BTreeSet;
    use std::sync::Arc;

    use serde_json::{Map, Value, json};
    use tokio::sync::Semaphore;

    use leadflow_adapters::{CapabilityRegistry, ResolveOptions, ResolvedCapabilities};
    use leadflow_shared::{CapabilityKind, TraceEntry};

    use super::{Delta, StepEnv, execute};
    use crate::context::SharedContext;
    use crate::definition::{Pipeline, PipelineDefinition};
    use crate::trace::TraceRecorder;

    pub fn pipeline(steps: Value) -> Pipeline {
        let definition: PipelineDefinition = serde_json::from_value(json!({
            "workflow_name": "unit-test",
            "config": {
                "icp": {
                    "industry": ["SaaS"],
                    "employee_count": { "min": 100, "max": 1000 },
                    "revenue": { "min": 20000000, "max": 200000000 },
                    "technologies": ["AWS", "Salesforce", "HubSpot"],
                    "signals": ["recent_funding", "hiring_for_sales"]
                },
                "scoring": { "min_score": 60 }
            },
            "steps": steps
        }))
        .unwrap();
        definition.validate(&CapabilityRegistry::synthetic()).unwrap()
    }

    pub fn synthetic_capabilities() -> Arc<ResolvedCapabilities> {
        Arc::new(
            CapabilityRegistry::synthetic()
                .resolve(CapabilityKind::ALL, &ResolveOptions::default())
                .unwrap(),
        )
    }

    /// Run the pipeline's only step with `inputs` and an empty context.
    pub async fn run_single(
        pipeline: &Pipeline,
        inputs: Value,
        capabilities: Arc<ResolvedCapabilities>,
    ) -> (Delta, Vec<TraceEntry>) {
        run_single_limited(pipeline, inputs, capabilities, 4).await
    }

    /// [`run_single`] with at most `limit` capability calls in flight.
    pub async fn run_single_limited(
        pipeline: &Pipeline,
        inputs: Value,
        capabilities: Arc<ResolvedCapabilities>,
        limit: usize,
    ) -> (Delta, Vec<TraceEntry>) {
        let context = SharedContext::new(Map::new(), Map::new());
        let limiter = Arc::new(Semaphore::new(limit));
        let env = StepEnv {
            step: &pipeline.steps[0],
            pipeline,
            capabilities: &capabilities,
            limiter: &limiter,
            context: &context,
            inputs: inputs.as_object().cloned().unwrap_or_default(),
        };
        let mut trace = TraceRecorder::new();
        let delta = execute(&env, &mut trace).await.unwrap();
        (delta, trace.into_entries())
    }

    pub fn step(id: &str, agent: &str, capability: Option<&str>) -> Value {
        let caps: BTreeSet<&str> = capability.into_iter().collect();
        json!({ "id": id, "agent": agent, "required_capabilities": caps })
    }
}
