//! Pipeline execution engine and step units for Leadflow.
//!
//! A pipeline is a JSON definition of ordered steps. This crate validates
//! definitions, renders step inputs from the shared context, runs each step
//! unit against resolved capabilities, checks outputs against their declared
//! schemas, and records a reason/act/observe trace for the whole run.

pub mod context;
pub mod definition;
pub mod engine;
pub mod report;
pub mod schema;
pub mod template;
pub mod trace;
pub mod units;

pub use context::SharedContext;
pub use definition::{
    AgentKind, CapabilityRef, Pipeline, PipelineDefinition, StepDefinition, StepSpec,
};
pub use engine::{Engine, ProgressReporter, RunFailure, RunOptions, RunOutcome, SilentProgress};
pub use report::{CampaignMetrics, Confidence, Recommendation, RunSummary};
pub use schema::Schema;
pub use trace::{StepTimeline, TraceRecorder, from_jsonl, timeline, to_jsonl};
