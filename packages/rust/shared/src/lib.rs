//! Shared types, error model, and configuration for Leadflow.
//!
//! This crate is the foundation depended on by all other Leadflow crates.
//! It provides:
//! - [`LeadflowError`], the unified error type
//! - Domain types ([`Lead`], [`IcpCriteria`], [`ScoreWeights`], [`TraceEntry`], [`CapabilityKind`])
//! - Configuration ([`AppConfig`], [`RetryPolicy`], config loading)

pub mod config;
pub mod error;
pub mod lead;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CapabilitiesConfig, DefaultsConfig, ProviderConfig, RetryConfig, RetryPolicy,
    config_dir, config_file_path, init_config, load_config, load_config_from, render_config,
    validate_api_key,
};
pub use error::{LeadflowError, Result, Violation};
pub use lead::{
    CompanyProfile, DeliveryStatus, DraftContent, Engagement, FeedbackReport, IcpCriteria, Lead,
    LeadStatus, NumericRange, OutreachMessage, ScoreBreakdown, ScoreWeights, SendReceipt,
    WEIGHT_SUM_TOLERANCE,
};
pub use types::{CapabilityKind, RunId, TraceEntry, TracePhase};
