//! Capability adapters for Leadflow.
//!
//! Every external function a pipeline step needs (prospect search, company
//! enrichment, message generation, message sending, engagement tracking) sits
//! behind the [`Capability`] trait. Each kind has a live HTTP adapter and/or a
//! deterministic synthetic adapter; live adapters are wrapped in a
//! [`Resilient`] decorator that retries transient failures and then serves the
//! call from the synthetic adapter.

mod error;
pub mod live;
mod registry;
mod request;
mod resilient;
pub mod synthetic;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use leadflow_shared::CapabilityKind;

pub use error::CapabilityUnavailable;
pub use registry::{CapabilityRegistry, ResolveOptions, ResolvedCapabilities};
pub use request::{CapabilityRequest, CapabilityResponse, MessageBrief, ProspectQuery};
pub use resilient::Resilient;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One implementation of one capability kind.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The capability kind this adapter serves.
    fn kind(&self) -> CapabilityKind;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// Whether the adapter's precondition (usually a credential) holds.
    fn is_available(&self) -> bool {
        true
    }

    /// Serve one request.
    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable>;
}

// ---------------------------------------------------------------------------
// Served
// ---------------------------------------------------------------------------

/// Which path served a capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedBy {
    /// The live adapter answered.
    Live,
    /// The live adapter failed and the synthetic adapter answered.
    Fallback,
    /// The capability resolved to synthetic at run start.
    Synthetic,
}

impl ServedBy {
    /// Whether synthetic data was used, for whatever reason.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Live)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
            Self::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for ServedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability result together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub value: T,
    pub served_by: ServedBy,
    /// Live attempts made (0 when served synthetically from the start).
    pub attempts: u32,
    /// Why the live path was abandoned, for fallback results.
    pub fallback_reason: Option<String>,
}

impl<T> Served<T> {
    pub fn live(value: T, attempts: u32) -> Self {
        Self {
            value,
            served_by: ServedBy::Live,
            attempts,
            fallback_reason: None,
        }
    }

    pub fn fallback(value: T, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            value,
            served_by: ServedBy::Fallback,
            attempts,
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn synthetic(value: T) -> Self {
        Self {
            value,
            served_by: ServedBy::Synthetic,
            attempts: 0,
            fallback_reason: None,
        }
    }

    /// Transform the value, keeping the provenance.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            value: f(self.value),
            served_by: self.served_by,
            attempts: self.attempts,
            fallback_reason: self.fallback_reason,
        }
    }

    /// Provenance as JSON for trace details.
    pub fn provenance(&self) -> serde_json::Value {
        let mut details = serde_json::json!({
            "served_by": self.served_by,
            "attempts": self.attempts,
        });
        if let Some(reason) = &self.fallback_reason {
            details["fallback_reason"] = serde_json::Value::String(reason.clone());
        }
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn served_map_keeps_provenance() {
        let served = Served::fallback(vec![1, 2, 3], 3, "HTTP 503").map(|v| v.len());
        assert_eq!(served.value, 3);
        assert_eq!(served.served_by, ServedBy::Fallback);
        assert_eq!(served.fallback_reason.as_deref(), Some("HTTP 503"));
        assert!(served.served_by.is_fallback());
    }

    #[test]
    fn provenance_details() {
        let details = Served::synthetic(()).provenance();
        assert_eq!(details["served_by"], "synthetic");
        assert_eq!(details["attempts"], 0);
        assert!(details.get("fallback_reason").is_none());
        assert!(!ServedBy::Live.is_fallback());
    }
}
