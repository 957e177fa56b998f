//! Append-only reason/act/observe trace recorder.
//!
//! The recorder API enforces phase order within a step: a step starts with
//! [`TraceRecorder::begin`] (reason), moves to acting with
//! [`Reasoning::act`], and ends with [`Acting::observe`], which consumes the
//! handle. Entries are also emitted as `tracing` events.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use leadflow_shared::{LeadflowError, Result, TraceEntry, TracePhase};

/// Collects the trace of one run.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    entries: Vec<TraceEntry>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a step with its first `reason` entry.
    pub fn begin(
        &mut self,
        step_id: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Reasoning<'_> {
        self.push(step_id, TracePhase::Reason, message.into(), details);
        Reasoning {
            recorder: self,
            step_id: step_id.to_string(),
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }

    fn push(&mut self, step_id: &str, phase: TracePhase, message: String, details: Option<Value>) {
        debug!(step = step_id, %phase, %message, "trace");
        self.entries.push(TraceEntry {
            sequence: self.entries.len() as u64,
            step_id: step_id.to_string(),
            phase,
            message,
            details,
            timestamp: Utc::now(),
        });
    }
}

/// A step in its reasoning phase.
pub struct Reasoning<'a> {
    recorder: &'a mut TraceRecorder,
    step_id: String,
}

impl<'a> Reasoning<'a> {
    /// Record another `reason` entry.
    pub fn reason(&mut self, message: impl Into<String>, details: Option<Value>) {
        self.recorder
            .push(&self.step_id, TracePhase::Reason, message.into(), details);
    }

    /// Record the first `act` entry and move to acting.
    pub fn act(self, message: impl Into<String>, details: Option<Value>) -> Acting<'a> {
        self.recorder
            .push(&self.step_id, TracePhase::Act, message.into(), details);
        Acting {
            recorder: self.recorder,
            step_id: self.step_id,
        }
    }
}

/// A step in its acting phase.
pub struct Acting<'a> {
    recorder: &'a mut TraceRecorder,
    step_id: String,
}

impl Acting<'_> {
    /// Record another `act` entry.
    pub fn act(&mut self, message: impl Into<String>, details: Option<Value>) {
        self.recorder
            .push(&self.step_id, TracePhase::Act, message.into(), details);
    }

    /// Record the closing `observe` entry.
    pub fn observe(self, message: impl Into<String>, details: Option<Value>) {
        self.recorder
            .push(&self.step_id, TracePhase::Observe, message.into(), details);
    }
}

// ---------------------------------------------------------------------------
// Persistence and replay
// ---------------------------------------------------------------------------

/// Serialize a trace as JSON lines.
pub fn to_jsonl(entries: &[TraceEntry]) -> Result<String> {
    let mut out = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| LeadflowError::parse(format!("trace entry {}: {e}", entry.sequence)))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Parse a JSON-lines trace. Blank lines are ignored.
pub fn from_jsonl(content: &str) -> Result<Vec<TraceEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| LeadflowError::parse(format!("trace line {}: {e}", i + 1)))
        })
        .collect()
}

/// One step's slice of a trace.
#[derive(Debug, Clone)]
pub struct StepTimeline {
    pub step_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether the step reached its `observe` entry.
    pub completed: bool,
    /// `act` entries served by synthetic data (fallback or synthetic).
    pub synthetic_acts: usize,
    pub entries: Vec<TraceEntry>,
}

impl StepTimeline {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn count(&self, phase: TracePhase) -> usize {
        self.entries.iter().filter(|e| e.phase == phase).count()
    }
}

/// Group a trace into per-step timelines, checking its ordering rules.
///
/// Steps must not interleave, phases within a step must not go backwards,
/// and sequence numbers must increase.
pub fn timeline(entries: &[TraceEntry]) -> Result<Vec<StepTimeline>> {
    let mut steps: Vec<StepTimeline> = Vec::new();
    let mut last_sequence: Option<u64> = None;

    for entry in entries {
        if last_sequence.is_some_and(|last| entry.sequence <= last) {
            return Err(LeadflowError::parse(format!(
                "trace sequence {} is out of order",
                entry.sequence
            )));
        }
        last_sequence = Some(entry.sequence);

        let continues = steps.last().is_some_and(|s| s.step_id == entry.step_id);
        if !continues {
            if steps.iter().any(|s| s.step_id == entry.step_id) {
                return Err(LeadflowError::parse(format!(
                    "step `{}` reappears after another step",
                    entry.step_id
                )));
            }
            if entry.phase != TracePhase::Reason {
                return Err(LeadflowError::parse(format!(
                    "step `{}` starts with {} instead of reason",
                    entry.step_id, entry.phase
                )));
            }
            steps.push(StepTimeline {
                step_id: entry.step_id.clone(),
                started_at: entry.timestamp,
                finished_at: entry.timestamp,
                completed: false,
                synthetic_acts: 0,
                entries: Vec::new(),
            });
        }

        let Some(step) = steps.last_mut() else {
            continue;
        };
        if let Some(previous) = step.entries.last() {
            if entry.phase < previous.phase || previous.phase == TracePhase::Observe {
                return Err(LeadflowError::parse(format!(
                    "step `{}`: {} after {}",
                    entry.step_id, entry.phase, previous.phase
                )));
            }
        }
        if entry.phase == TracePhase::Act && is_synthetic(entry) {
            step.synthetic_acts += 1;
        }
        step.completed = entry.phase == TracePhase::Observe;
        step.finished_at = entry.timestamp;
        step.entries.push(entry.clone());
    }

    Ok(steps)
}

fn is_synthetic(entry: &TraceEntry) -> bool {
    entry
        .details
        .as_ref()
        .and_then(|d| d.get("served_by"))
        .and_then(Value::as_str)
        .is_some_and(|s| s == "fallback" || s == "synthetic")
}
