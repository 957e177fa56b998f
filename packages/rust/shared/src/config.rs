//! Application configuration for Leadflow.
//!
//! User config lives at `~/.leadflow/leadflow.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored here: each capability names the environment
//! variable that holds its key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::types::CapabilityKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadflow";

// ---------------------------------------------------------------------------
// Config structs (matching leadflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Retry policy for live capability calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-capability provider settings.
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Workflow definition used when `--workflow` is not given.
    #[serde(default = "default_workflow")]
    pub workflow: String,

    /// Directory for trace and report files.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Simulate message sending unless `--send` is passed.
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Maximum capability calls a step keeps in flight when it fans out.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workflow: default_workflow(),
            output_dir: default_output_dir(),
            dry_run: true,
            concurrency: default_concurrency(),
        }
    }
}

fn default_workflow() -> String {
    "workflows/prospect_to_lead.json".into()
}
fn default_output_dir() -> String {
    "./leadflow-output".into()
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> u32 {
    4
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per live call before falling back to synthetic data.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff, in ms.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Timeout for a single live call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_call_timeout_secs() -> u64 {
    30
}

/// `[capabilities]` section: one provider table per live capability.
///
/// Engagement tracking has no live provider and is always synthetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_prospect_search")]
    pub prospect_search: ProviderConfig,

    #[serde(default = "default_company_enrichment")]
    pub company_enrichment: ProviderConfig,

    #[serde(default = "default_content_generation")]
    pub content_generation: ProviderConfig,

    #[serde(default = "default_message_sending")]
    pub message_sending: ProviderConfig,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            prospect_search: default_prospect_search(),
            company_enrichment: default_company_enrichment(),
            content_generation: default_content_generation(),
            message_sending: default_message_sending(),
        }
    }
}

fn default_prospect_search() -> ProviderConfig {
    ProviderConfig::new("APOLLO_API_KEY", "https://api.apollo.io/v1")
}
fn default_company_enrichment() -> ProviderConfig {
    ProviderConfig::new("CLEARBIT_API_KEY", "https://company.clearbit.com/v2")
}
fn default_content_generation() -> ProviderConfig {
    ProviderConfig {
        model: Some("gpt-4o-mini".into()),
        ..ProviderConfig::new("OPENAI_API_KEY", "https://api.openai.com/v1")
    }
}
fn default_message_sending() -> ProviderConfig {
    ProviderConfig {
        from_email: Some("outreach@analytos.ai".into()),
        from_name: Some("Analytos.ai".into()),
        ..ProviderConfig::new("SENDGRID_API_KEY", "https://api.sendgrid.com/v3")
    }
}

/// `[capabilities.<kind>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,

    /// Base URL of the provider API.
    pub endpoint: String,

    /// Model name, for content generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sender address, for message sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,

    /// Sender display name, for message sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
}

impl ProviderConfig {
    fn new(api_key_env: &str, endpoint: &str) -> Self {
        Self {
            api_key_env: api_key_env.into(),
            endpoint: endpoint.into(),
            model: None,
            from_email: None,
            from_name: None,
        }
    }

    /// Read the API key from the environment. Empty values count as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

impl AppConfig {
    /// Provider settings for a capability, if it has a live provider.
    pub fn provider(&self, kind: CapabilityKind) -> Option<&ProviderConfig> {
        match kind {
            CapabilityKind::ProspectSearch => Some(&self.capabilities.prospect_search),
            CapabilityKind::CompanyEnrichment => Some(&self.capabilities.company_enrichment),
            CapabilityKind::ContentGeneration => Some(&self.capabilities.content_generation),
            CapabilityKind::MessageSending => Some(&self.capabilities.message_sending),
            CapabilityKind::EngagementTracking => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy (runtime, derived from config)
// ---------------------------------------------------------------------------

/// Runtime retry policy for live capability calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    /// Upper bound on attempts per call, whatever the config asks for.
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, …
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.clamp(1, Self::MAX_ATTEMPTS),
            base_backoff: Duration::from_millis(config.backoff_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadflow/leadflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = render_config(&AppConfig::default())?;

    std::fs::write(&path, content).map_err(|e| LeadflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Render a config as pretty TOML.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| LeadflowError::config(e.to_string()))
}

/// Check that the API key env var for `kind` is set and non-empty.
pub fn validate_api_key(config: &AppConfig, kind: CapabilityKind) -> Result<()> {
    let Some(provider) = config.provider(kind) else {
        return Err(LeadflowError::config(format!(
            "capability {kind} has no live provider"
        )));
    };
    match provider.api_key() {
        Some(_) => Ok(()),
        None => Err(LeadflowError::config(format!(
            "API key for {kind} not found. Set the {} environment variable.",
            provider.api_key_env
        ))),
    }
}
