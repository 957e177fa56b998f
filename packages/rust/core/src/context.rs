//! Shared context threaded through a run.

use serde_json::{Map, Value};

use leadflow_shared::Lead;

/// Root key holding the pipeline's `config` block.
pub const CONFIG_KEY: &str = "config";

/// Root key holding the current lead list.
pub const LEADS_KEY: &str = "leads";

/// Accumulated data for one run, keyed by step id and well-known keys.
///
/// Only the engine mutates the context, at merge time. Each merge stores
/// the whole step delta under the step id and overwrites every root key the
/// delta names. Lists are replaced wholesale, never appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext {
    entries: Map<String, Value>,
    steps: Vec<String>,
}

impl SharedContext {
    /// Start a context from caller-provided data, seeding `config`.
    pub fn new(config: Map<String, Value>, initial: Map<String, Value>) -> Self {
        let mut entries = initial;
        entries.insert(CONFIG_KEY.into(), Value::Object(config));
        Self {
            entries,
            steps: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether `key` holds a merged step output.
    pub fn is_step(&self, key: &str) -> bool {
        self.steps.iter().any(|s| s == key)
    }

    /// Merge a step's output delta.
    pub fn merge(&mut self, step_id: &str, delta: Map<String, Value>) {
        for (key, value) in &delta {
            self.entries.insert(key.clone(), value.clone());
        }
        self.entries.insert(step_id.to_string(), Value::Object(delta));
        if !self.is_step(step_id) {
            self.steps.push(step_id.to_string());
        }
    }

    /// The current root lead list, skipping entries that are not leads.
    pub fn leads(&self) -> Vec<Lead> {
        self.entries
            .get(LEADS_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
