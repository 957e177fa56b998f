//! Identifiers, capability kinds and trace records shared by every crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CapabilityKind
// ---------------------------------------------------------------------------

/// An external function a step may need, abstracted behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    ProspectSearch,
    CompanyEnrichment,
    ContentGeneration,
    MessageSending,
    EngagementTracking,
}

impl CapabilityKind {
    /// Every capability kind, in pipeline order.
    pub const ALL: [CapabilityKind; 5] = [
        Self::ProspectSearch,
        Self::CompanyEnrichment,
        Self::ContentGeneration,
        Self::MessageSending,
        Self::EngagementTracking,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProspectSearch => "prospect_search",
            Self::CompanyEnrichment => "company_enrichment",
            Self::ContentGeneration => "content_generation",
            Self::MessageSending => "message_sending",
            Self::EngagementTracking => "engagement_tracking",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = String;

    /// Accepts the snake_case kind or the provider tool name used in
    /// workflow files (`ApolloAPI`, `Clearbit`, `OpenAI`, `SendGrid`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "prospect_search" | "ApolloAPI" => Ok(Self::ProspectSearch),
            "company_enrichment" | "Clearbit" => Ok(Self::CompanyEnrichment),
            "content_generation" | "OpenAI" => Ok(Self::ContentGeneration),
            "message_sending" | "SendGrid" => Ok(Self::MessageSending),
            "engagement_tracking" => Ok(Self::EngagementTracking),
            other => Err(format!("unknown capability `{other}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Phase of a traced action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    Reason,
    Act,
    Observe,
}

impl fmt::Display for TracePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reason => "reason",
            Self::Act => "act",
            Self::Observe => "observe",
        })
    }
}

/// One append-only entry of a run's audit trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the run's trace, starting at 0.
    pub sequence: u64,
    /// Step that produced the entry.
    pub step_id: String,
    pub phase: TracePhase,
    pub message: String,
    /// Structured parameters or results (never secrets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
