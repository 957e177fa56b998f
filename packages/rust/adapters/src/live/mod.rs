//! Live HTTP adapters for external providers.
//!
//! Each adapter is a thin `reqwest` wrapper: build the provider request, map
//! the provider response into Leadflow records, and classify failures as
//! transient or permanent. Credentials come from the environment variable
//! named in the app config; without one the adapter reports itself
//! unavailable and the capability resolves to synthetic data.

mod apollo;
mod clearbit;
mod openai;
mod sendgrid;

use std::time::Duration;

use reqwest::Client;
use url::Url;

use leadflow_shared::{CapabilityKind, LeadflowError, ProviderConfig, Result};

use crate::CapabilityUnavailable;

pub use apollo::ApolloSearch;
pub use clearbit::ClearbitEnrichment;
pub use openai::{OpenAiContent, parse_draft};
pub use sendgrid::SendGridSender;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Leadflow/", env!("CARGO_PKG_VERSION"));

/// HTTP client, base URL and credential shared by every live adapter.
#[derive(Debug, Clone)]
pub struct LiveEndpoint {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl LiveEndpoint {
    /// Create an endpoint for `base` with an explicit credential.
    pub fn new(base: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .map_err(|e| LeadflowError::config(format!("invalid endpoint {base}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Create an endpoint from a `[capabilities.*]` table, reading the key from the environment.
    pub fn from_provider(provider: &ProviderConfig, timeout: Duration) -> Result<Self> {
        Self::new(&provider.endpoint, provider.api_key(), timeout)
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self, kind: CapabilityKind) -> std::result::Result<&str, CapabilityUnavailable> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CapabilityUnavailable::permanent(kind, "API key not configured"))
    }

    fn url(&self, kind: CapabilityKind, path: &str) -> std::result::Result<Url, CapabilityUnavailable> {
        self.base
            .join(path)
            .map_err(|e| CapabilityUnavailable::permanent(kind, format!("invalid URL {path}: {e}")))
    }

    fn client(&self) -> &Client {
        &self.client
    }
}

/// Send a prepared request and return the response if its status is a success.
async fn send(
    kind: CapabilityKind,
    request: reqwest::RequestBuilder,
) -> std::result::Result<reqwest::Response, CapabilityUnavailable> {
    let response = request
        .send()
        .await
        .map_err(|e| CapabilityUnavailable::from_reqwest(kind, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CapabilityUnavailable::from_status(kind, status));
    }
    Ok(response)
}

/// Decode a JSON body into `T`.
async fn json<T: serde::de::DeserializeOwned>(
    kind: CapabilityKind,
    response: reqwest::Response,
) -> std::result::Result<T, CapabilityUnavailable> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CapabilityUnavailable::from_reqwest(kind, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CapabilityUnavailable::bad_response(kind, e))
}
