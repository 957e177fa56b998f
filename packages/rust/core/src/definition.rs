//! Pipeline definitions: the JSON model, agent kinds, and load-time validation.
//!
//! A [`PipelineDefinition`] is what a workflow file deserializes into.
//! [`PipelineDefinition::validate`] turns it into an executable [`Pipeline`]
//! or fails with every problem it found.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use leadflow_adapters::CapabilityRegistry;
use leadflow_shared::{
    CapabilityKind, IcpCriteria, LeadflowError, Result, ScoreWeights, Violation,
};

use crate::context::{CONFIG_KEY, LEADS_KEY};
use crate::schema::Schema;
use crate::template;

// ---------------------------------------------------------------------------
// Raw definition
// ---------------------------------------------------------------------------

/// A workflow file as written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub workflow_name: String,
    #[serde(default)]
    pub description: String,
    /// Seeded into the shared context under `config`.
    #[serde(default)]
    pub config: Map<String, Value>,
    pub steps: Vec<StepSpec>,
}

/// One step as written in a workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Input template, rendered against the shared context before the step runs.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, alias = "tools")]
    pub required_capabilities: Vec<CapabilityRef>,
    #[serde(default = "empty_object")]
    pub output_schema: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A capability named by a step: either a bare name or a tool object
/// (`{"name": "ApolloAPI", "config": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityRef {
    Name(String),
    Tool { name: String },
}

impl CapabilityRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Tool { name } => name,
        }
    }
}

impl PipelineDefinition {
    /// Parse a definition from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LeadflowError::parse(format!("invalid pipeline definition: {e}")))
    }

    /// Read and parse a definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LeadflowError::io(path, e))?;
        let definition = Self::from_json(&text)?;
        debug!(path = %path.display(), steps = definition.steps.len(), "loaded pipeline definition");
        Ok(definition)
    }
}

// ---------------------------------------------------------------------------
// Agent kinds
// ---------------------------------------------------------------------------

/// The closed set of step behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "ProspectSearchAgent")]
    ProspectSearch,
    #[serde(rename = "DataEnrichmentAgent")]
    DataEnrichment,
    #[serde(rename = "ScoringAgent")]
    Scoring,
    #[serde(rename = "OutreachContentAgent")]
    OutreachContent,
    #[serde(rename = "OutreachExecutorAgent")]
    OutreachExecutor,
    #[serde(rename = "ResponseTrackerAgent")]
    ResponseTracker,
    #[serde(rename = "FeedbackTrainerAgent")]
    FeedbackTrainer,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        Self::ProspectSearch,
        Self::DataEnrichment,
        Self::Scoring,
        Self::OutreachContent,
        Self::OutreachExecutor,
        Self::ResponseTracker,
        Self::FeedbackTrainer,
    ];

    /// Name used in workflow files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProspectSearch => "ProspectSearchAgent",
            Self::DataEnrichment => "DataEnrichmentAgent",
            Self::Scoring => "ScoringAgent",
            Self::OutreachContent => "OutreachContentAgent",
            Self::OutreachExecutor => "OutreachExecutorAgent",
            Self::ResponseTracker => "ResponseTrackerAgent",
            Self::FeedbackTrainer => "FeedbackTrainerAgent",
        }
    }

    /// The capability this agent calls, if any.
    pub fn required_capability(&self) -> Option<CapabilityKind> {
        match self {
            Self::ProspectSearch => Some(CapabilityKind::ProspectSearch),
            Self::DataEnrichment => Some(CapabilityKind::CompanyEnrichment),
            Self::OutreachContent => Some(CapabilityKind::ContentGeneration),
            Self::OutreachExecutor => Some(CapabilityKind::MessageSending),
            Self::ResponseTracker => Some(CapabilityKind::EngagementTracking),
            Self::Scoring | Self::FeedbackTrainer => None,
        }
    }

    /// Keys the agent's output delta always contains.
    pub fn output_keys(&self) -> &'static [&'static str] {
        match self {
            Self::ProspectSearch => &["leads"],
            Self::DataEnrichment => &["leads", "enriched_count"],
            Self::Scoring => &["leads", "ranked_leads", "qualified_count"],
            Self::OutreachContent => &["messages", "leads"],
            Self::OutreachExecutor => &["campaign_id", "sent_status", "leads"],
            Self::ResponseTracker => &["responses", "leads"],
            Self::FeedbackTrainer => &["metrics", "recommendations"],
        }
    }

    /// The shape of each key the agent produces. A key the step's declared
    /// output schema lists takes the declared shape.
    fn output_shapes(&self, declared: &Schema) -> Outputs {
        let declared = match declared {
            Schema::Object(fields) => Some(fields),
            _ => None,
        };
        self.output_keys()
            .iter()
            .map(|&key| {
                let shape = declared
                    .and_then(|fields| fields.get(key))
                    .cloned()
                    .unwrap_or_else(|| intrinsic_shape(key));
                (key, shape)
            })
            .collect()
    }

    fn needs_icp(&self) -> bool {
        matches!(self, Self::ProspectSearch | Self::Scoring)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown agent kind `{s}`"))
    }
}

type Outputs = BTreeMap<&'static str, Schema>;

/// What a unit output key holds regardless of the step's declared schema.
fn intrinsic_shape(key: &str) -> Schema {
    match key {
        "enriched_count" | "qualified_count" => Schema::Integer,
        "campaign_id" => Schema::String,
        "metrics" => Schema::empty(),
        "recommendations" => Schema::Array(Some(Box::new(Schema::String))),
        _ => Schema::Array(Some(Box::new(Schema::empty()))),
    }
}

/// Root keys a step id may not take: `config`, `leads`, and every unit output key.
fn reserved_keys() -> BTreeSet<&'static str> {
    let mut keys: BTreeSet<&'static str> = [CONFIG_KEY, LEADS_KEY].into_iter().collect();
    for kind in AgentKind::ALL {
        keys.extend(kind.output_keys());
    }
    keys
}

// ---------------------------------------------------------------------------
// Validated pipeline
// ---------------------------------------------------------------------------

/// A validated, immutable step.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: String,
    pub agent: AgentKind,
    pub instructions: Option<String>,
    pub input_template: Value,
    pub required_capabilities: BTreeSet<CapabilityKind>,
    pub output_schema: Schema,
}

/// A validated pipeline, ready to run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub description: String,
    pub config: Map<String, Value>,
    pub weights: ScoreWeights,
    pub icp: Option<IcpCriteria>,
    pub min_score: Option<f64>,
    pub steps: Vec<StepDefinition>,
}

impl Pipeline {
    /// Every capability kind any step needs.
    pub fn required_capabilities(&self) -> BTreeSet<CapabilityKind> {
        self.steps
            .iter()
            .flat_map(|s| s.required_capabilities.iter().copied())
            .collect()
    }
}

impl PipelineDefinition {
    /// Capability kinds the steps name, skipping names that do not parse.
    pub fn declared_capabilities(&self) -> BTreeSet<CapabilityKind> {
        self.steps
            .iter()
            .flat_map(|step| &step.required_capabilities)
            .filter_map(|capability| capability.name().parse().ok())
            .collect()
    }

    /// Validate against `registry` with an empty initial context.
    pub fn validate(&self, registry: &CapabilityRegistry) -> Result<Pipeline> {
        self.validate_with(registry, &Map::new())
    }

    /// Validate against `registry`, with `seeded` as the initial data the
    /// run starts from. Placeholders into seeded keys are resolved against
    /// the actual values.
    ///
    /// Every problem is collected into one `Configuration` error.
    pub fn validate_with(
        &self,
        registry: &CapabilityRegistry,
        seeded: &Map<String, Value>,
    ) -> Result<Pipeline> {
        let reserved = reserved_keys();
        let all_ids: BTreeSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        let config_value = Value::Object(self.config.clone());

        let mut violations = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut earlier: BTreeMap<&str, (AgentKind, Outputs)> = BTreeMap::new();
        let mut produced: Outputs = BTreeMap::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        if self.steps.is_empty() {
            violations.push(Violation::global("pipeline declares no steps"));
        }
        if seeded.contains_key(CONFIG_KEY) {
            violations.push(Violation::global(format!(
                "initial data may not set the reserved key `{CONFIG_KEY}`"
            )));
        }

        for spec in &self.steps {
            let id = spec.id.as_str();

            if id.trim().is_empty() {
                violations.push(Violation::global("a step has an empty id"));
            } else if !seen.insert(id) {
                violations.push(Violation::step(id, "duplicate step id"));
            }
            if reserved.contains(id) {
                violations.push(Violation::step(
                    id,
                    format!("step id shadows the reserved context key `{id}`"),
                ));
            }

            let agent = match spec.agent.parse::<AgentKind>() {
                Ok(agent) => Some(agent),
                Err(e) => {
                    violations.push(Violation::step(id, e));
                    None
                }
            };

            let mut capabilities = BTreeSet::new();
            for capability in &spec.required_capabilities {
                match capability.name().parse::<CapabilityKind>() {
                    Ok(kind) => {
                        if !registry.has_adapter(kind) {
                            violations.push(Violation::step(
                                id,
                                format!("no adapter registered for capability `{kind}`"),
                            ));
                        }
                        capabilities.insert(kind);
                    }
                    Err(e) => violations.push(Violation::step(id, e)),
                }
            }
            if let Some(needed) = agent.and_then(|a| a.required_capability()) {
                if !capabilities.contains(&needed) {
                    violations.push(Violation::step(
                        id,
                        format!(
                            "{} needs capability `{needed}` but the step does not declare it",
                            spec.agent
                        ),
                    ));
                }
            }

            let input_template = Value::Object(spec.inputs.clone());
            for path in template::references(&input_template) {
                let scope = Scope {
                    config: &config_value,
                    earlier: &earlier,
                    produced: &produced,
                    seeded,
                    all_ids: &all_ids,
                };
                if let Some(problem) = scope.check(&path) {
                    violations.push(Violation::step(id, problem));
                }
            }

            let output_schema = match Schema::parse(&spec.output_schema) {
                Ok(schema @ Schema::Object(_)) => schema,
                Ok(_) => {
                    violations.push(Violation::step(
                        id,
                        "output_schema must be an object descriptor",
                    ));
                    Schema::empty()
                }
                Err(problems) => {
                    for problem in problems {
                        violations.push(Violation::step(id, format!("output_schema {problem}")));
                    }
                    Schema::empty()
                }
            };

            if let Some(agent) = agent {
                let outputs = agent.output_shapes(&output_schema);
                produced.extend(outputs.iter().map(|(key, shape)| (*key, shape.clone())));
                earlier.insert(id, (agent, outputs));
                steps.push(StepDefinition {
                    id: spec.id.clone(),
                    agent,
                    instructions: spec.instructions.clone(),
                    input_template,
                    required_capabilities: capabilities,
                    output_schema,
                });
            }
        }

        let scoring = self.config.get("scoring");
        let weights = match scoring.and_then(|s| s.get("weights")) {
            None => ScoreWeights::default(),
            Some(raw) => match serde_json::from_value::<ScoreWeights>(raw.clone()) {
                Ok(weights) => {
                    violations.extend(
                        weights
                            .problems()
                            .into_iter()
                            .map(|p| Violation::global(format!("config.scoring: {p}"))),
                    );
                    weights
                }
                Err(e) => {
                    violations.push(Violation::global(format!("config.scoring.weights: {e}")));
                    ScoreWeights::default()
                }
            },
        };

        let min_score = match scoring.and_then(|s| s.get("min_score")) {
            None | Some(Value::Null) => None,
            Some(raw) => match raw.as_f64() {
                Some(value) if (0.0..=100.0).contains(&value) => Some(value),
                _ => {
                    violations.push(Violation::global(format!(
                        "config.scoring.min_score must be a number in [0, 100], got {raw}"
                    )));
                    None
                }
            },
        };

        let icp = match self.config.get("icp") {
            None => {
                if let Some(step) = steps.iter().find(|s| s.agent.needs_icp()) {
                    violations.push(Violation::step(
                        &step.id,
                        format!("{} requires `config.icp`", step.agent),
                    ));
                }
                None
            }
            Some(raw) => match serde_json::from_value::<IcpCriteria>(raw.clone()) {
                Ok(icp) => {
                    violations.extend(icp.problems().into_iter().map(Violation::global));
                    Some(icp)
                }
                Err(e) => {
                    violations.push(Violation::global(format!("config.icp: {e}")));
                    None
                }
            },
        };

        if !violations.is_empty() {
            debug!(count = violations.len(), "pipeline definition rejected");
            return Err(LeadflowError::configuration(violations));
        }

        info!(
            pipeline = %self.workflow_name,
            steps = steps.len(),
            "pipeline definition validated"
        );
        Ok(Pipeline {
            name: self.workflow_name.clone(),
            description: self.description.clone(),
            config: self.config.clone(),
            weights,
            icp,
            min_score,
            steps,
        })
    }
}

/// What a step's input template may reference.
struct Scope<'a> {
    config: &'a Value,
    earlier: &'a BTreeMap<&'a str, (AgentKind, Outputs)>,
    /// Latest shape of each root key a unit has produced so far.
    produced: &'a Outputs,
    seeded: &'a Map<String, Value>,
    all_ids: &'a BTreeSet<&'a str>,
}

impl Scope<'_> {
    /// A problem with placeholder `path`, if it cannot resolve at run time.
    ///
    /// Indices into produced arrays are not bounds-checked here.
    fn check(&self, path: &str) -> Option<String> {
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        let (head, rest) = segments.split_first()?;

        if *head == CONFIG_KEY {
            return template::walk(self.config, rest)
                .is_none()
                .then(|| format!("`{{{{{path}}}}}` does not resolve in the pipeline config"));
        }

        if let Some((agent, outputs)) = self.earlier.get(*head) {
            let fields = match rest.first() {
                Some(&"output") => &rest[1..],
                _ => rest,
            };
            let (field, below) = fields.split_first()?;
            return match outputs.get(*field) {
                Some(shape) => shape
                    .check_path(below)
                    .err()
                    .map(|problem| format!("`{{{{{path}}}}}`: {problem}")),
                None => Some(format!(
                    "`{{{{{path}}}}}`: step `{head}` ({agent}) does not produce `{field}`"
                )),
            };
        }

        if let Some(shape) = self.produced.get(*head) {
            return shape
                .check_path(rest)
                .err()
                .map(|problem| format!("`{{{{{path}}}}}`: {problem}"));
        }

        if let Some(value) = self.seeded.get(*head) {
            return template::walk(value, rest)
                .is_none()
                .then(|| format!("`{{{{{path}}}}}` does not resolve in the initial data"));
        }

        if self.all_ids.contains(*head) {
            Some(format!(
                "`{{{{{path}}}}}` references step `{head}`, which has not run yet"
            ))
        } else {
            Some(format!(
                "`{{{{{path}}}}}` references `{head}`, which nothing before this step produces"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::synthetic()
    }

    fn definition(config: Value, steps: Value) -> PipelineDefinition {
        serde_json::from_value(json!({
            "workflow_name": "test",
            "config": config,
            "steps": steps
        }))
        .unwrap()
    }

    fn icp() -> Value {
        json!({
            "industry": ["SaaS"],
            "employee_count": { "min": 100, "max": 1000 },
            "revenue": { "min": 20000000, "max": 200000000 },
            "technologies": ["AWS"],
            "signals": ["hiring"]
        })
    }

    fn search_and_score() -> Value {
        json!([
            {
                "id": "search",
                "agent": "ProspectSearchAgent",
                "inputs": { "limit": 3 },
                "required_capabilities": ["prospect_search"],
                "output_schema": { "leads": "array" }
            },
            {
                "id": "rank",
                "agent": "ScoringAgent",
                "inputs": { "leads": "{{search.output.leads}}" },
                "output_schema": { "ranked_leads": "array" }
            }
        ])
    }

    fn messages(err: &LeadflowError) -> Vec<String> {
        err.violations().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn fixture_workflow_validates() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../workflows/prospect_to_lead.json");
        let pipeline = PipelineDefinition::load(&path)
            .unwrap()
            .validate(&registry())
            .unwrap();

        assert_eq!(pipeline.steps.len(), 7);
        assert_eq!(pipeline.steps[0].agent, AgentKind::ProspectSearch);
        assert_eq!(pipeline.min_score, Some(60.0));
        assert_eq!(pipeline.required_capabilities().len(), 5);
        assert!(pipeline.icp.is_some());
    }

    #[test]
    fn minimal_pipeline_uses_default_weights() {
        let pipeline = definition(json!({ "icp": icp() }), search_and_score())
            .validate(&registry())
            .unwrap();
        assert_eq!(pipeline.weights, ScoreWeights::default());
        assert_eq!(pipeline.min_score, None);
        assert_eq!(
            pipeline.steps[0].required_capabilities,
            BTreeSet::from([CapabilityKind::ProspectSearch])
        );
    }

    #[test]
    fn every_violation_is_collected() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([
                { "id": "a", "agent": "ScoringAgent" },
                { "id": "a", "agent": "ScoringAgent" },
                { "id": "b", "agent": "MysteryAgent" },
                { "id": "c", "agent": "FeedbackTrainerAgent", "required_capabilities": ["Zapier"] }
            ]),
        );
        let err = def.validate(&registry()).unwrap_err();
        let messages = messages(&err);
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("duplicate step id")));
        assert!(messages.iter().any(|m| m.contains("unknown agent kind `MysteryAgent`")));
        assert!(messages.iter().any(|m| m.contains("unknown capability `Zapier`")));
    }

    #[test]
    fn weights_must_sum_to_one() {
        for (weights, ok) in [
            (json!([0.3, 0.2, 0.2, 0.2]), false),
            (json!([0.4, 0.3, 0.2, 0.2]), false),
            (json!([0.4, 0.2, 0.3, 0.1]), true),
            (json!([0.4, 0.2, 0.3, 0.1000005]), true),
        ] {
            let config = json!({
                "icp": icp(),
                "scoring": { "weights": {
                    "revenue_match": weights[0],
                    "employee_match": weights[1],
                    "technology_match": weights[2],
                    "signal_strength": weights[3]
                }}
            });
            let result = definition(config, search_and_score()).validate(&registry());
            assert_eq!(result.is_ok(), ok, "weights {weights}");
            if let Err(err) = result {
                assert!(matches!(err, LeadflowError::Configuration { .. }));
            }
        }
    }

    #[test]
    fn references_must_point_backwards() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([
                {
                    "id": "rank",
                    "agent": "ScoringAgent",
                    "inputs": { "leads": "{{search.output.leads}}", "min": "{{config.nope}}" }
                },
                {
                    "id": "search",
                    "agent": "ProspectSearchAgent",
                    "required_capabilities": ["ApolloAPI"]
                },
                {
                    "id": "enrich",
                    "agent": "DataEnrichmentAgent",
                    "inputs": { "leads": "{{search.output.enriched_leads}}" },
                    "required_capabilities": ["Clearbit"]
                }
            ]),
        );
        let messages = messages(&def.validate(&registry()).unwrap_err());
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("has not run yet")));
        assert!(messages.iter().any(|m| m.contains("does not resolve in the pipeline config")));
        assert!(messages.iter().any(|m| m.contains("does not produce `enriched_leads`")));
    }

    #[test]
    fn seeded_keys_may_be_referenced() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([{
                "id": "rank",
                "agent": "ScoringAgent",
                "inputs": { "leads": "{{imported}}" }
            }]),
        );
        assert!(def.validate(&registry()).is_err());
        let seeded = json!({ "imported": [] }).as_object().cloned().unwrap();
        assert!(def.validate_with(&registry(), &seeded).is_ok());
    }

    #[test]
    fn seeded_paths_resolve_against_the_values() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([{
                "id": "rank",
                "agent": "ScoringAgent",
                "inputs": { "leads": "{{imported.batch.leads}}" }
            }]),
        );
        let good = json!({ "imported": { "batch": { "leads": [] } } });
        assert!(def.validate_with(&registry(), good.as_object().unwrap()).is_ok());

        let bad = json!({ "imported": { "rows": [] } });
        let messages = messages(
            &def.validate_with(&registry(), bad.as_object().unwrap())
                .unwrap_err(),
        );
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].contains("does not resolve in the initial data"));
    }

    #[test]
    fn seeded_config_key_is_rejected() {
        let def = definition(json!({ "icp": icp() }), search_and_score());
        let seeded = json!({ "config": { "icp": {} } });
        let messages = messages(
            &def.validate_with(&registry(), seeded.as_object().unwrap())
                .unwrap_err(),
        );
        assert_eq!(messages.len(), 1, "{messages:?}");
        assert!(messages[0].contains("reserved key `config`"));
    }

    #[test]
    fn nested_output_paths_follow_the_producer_shape() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([
                {
                    "id": "search",
                    "agent": "ProspectSearchAgent",
                    "required_capabilities": ["prospect_search"],
                    "output_schema": { "leads": [{ "company": "string" }] }
                },
                {
                    "id": "rank",
                    "agent": "ScoringAgent",
                    "inputs": {
                        "first": "{{search.output.leads.0.company}}",
                        "root": "{{leads.2.contact}}",
                        "bad_index": "{{search.output.leads.x}}",
                        "bad_scalar": "{{search.leads.0.company.name}}"
                    }
                },
                {
                    "id": "trainer",
                    "agent": "FeedbackTrainerAgent",
                    "inputs": {
                        "count": "{{rank.qualified_count}}",
                        "bad_count": "{{qualified_count.value}}"
                    }
                }
            ]),
        );
        let messages = messages(&def.validate(&registry()).unwrap_err());
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("`x` is not an array index")));
        assert!(messages.iter().any(|m| m.contains("look up `name` in a value of type string")));
        assert!(messages.iter().any(|m| m.contains("look up `value` in a value of type integer")));
    }

    #[test]
    fn declared_capabilities_skip_unknown_names() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([
                { "id": "a", "agent": "ProspectSearchAgent", "required_capabilities": ["ApolloAPI", "Zapier"] },
                { "id": "b", "agent": "DataEnrichmentAgent", "tools": [{ "name": "Clearbit" }] }
            ]),
        );
        assert_eq!(
            def.declared_capabilities(),
            BTreeSet::from([CapabilityKind::ProspectSearch, CapabilityKind::CompanyEnrichment])
        );
    }

    #[test]
    fn agent_capabilities_must_be_declared_and_registered() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([{ "id": "search", "agent": "ProspectSearchAgent" }]),
        );
        let undeclared = messages(&def.validate(&registry()).unwrap_err());
        assert!(undeclared[0].contains("needs capability `prospect_search`"));

        let def = definition(json!({ "icp": icp() }), search_and_score());
        let unregistered = messages(&def.validate(&CapabilityRegistry::new()).unwrap_err());
        assert_eq!(unregistered.len(), 1, "{unregistered:?}");
        assert!(unregistered[0].contains("no adapter registered"));
    }

    #[test]
    fn structural_config_problems_are_reported() {
        let mut bad_icp = icp();
        bad_icp["revenue"] = json!({ "min": 5, "max": 1 });
        let def = definition(
            json!({ "icp": bad_icp, "scoring": { "min_score": 140 } }),
            json!([
                { "id": "leads", "agent": "ScoringAgent", "output_schema": ["string"] }
            ]),
        );
        let messages = messages(&def.validate(&registry()).unwrap_err());
        assert_eq!(messages.len(), 4, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("reserved context key `leads`")));
        assert!(messages.iter().any(|m| m.contains("must be an object descriptor")));
        assert!(messages.iter().any(|m| m.contains("min_score")));
        assert!(messages.iter().any(|m| m.contains("icp.revenue min 5 exceeds max 1")));
    }

    #[test]
    fn missing_icp_is_reported_for_scoring() {
        let def = definition(json!({}), search_and_score());
        let messages = messages(&def.validate(&registry()).unwrap_err());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("requires `config.icp`"));
    }

    #[test]
    fn tool_objects_are_accepted() {
        let def = definition(
            json!({ "icp": icp() }),
            json!([{
                "id": "search",
                "agent": "ProspectSearchAgent",
                "tools": [{ "name": "ApolloAPI", "config": { "api_key": "{{APOLLO_API_KEY}}" } }]
            }]),
        );
        let pipeline = def.validate(&registry()).unwrap();
        assert!(pipeline.steps[0]
            .required_capabilities
            .contains(&CapabilityKind::ProspectSearch));
    }

    #[test]
    fn agent_kinds_roundtrip() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>(), Ok(kind));
        }
        assert!("Scoring".parse::<AgentKind>().is_err());
    }
}
