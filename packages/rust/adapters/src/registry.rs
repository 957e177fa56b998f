//! Capability registry and per-run resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use leadflow_shared::{
    AppConfig, CapabilityKind, CompanyProfile, DraftContent, Engagement, Lead, LeadflowError,
    OutreachMessage, Result, RetryPolicy, SendReceipt,
};

use crate::live::{ApolloSearch, ClearbitEnrichment, LiveEndpoint, OpenAiContent, SendGridSender};
use crate::synthetic::{
    SyntheticContent, SyntheticEngagement, SyntheticEnrichment, SyntheticProspects,
    SyntheticSender,
};
use crate::{
    Capability, CapabilityRequest, CapabilityResponse, MessageBrief, ProspectQuery, Resilient,
    Served, ServedBy,
};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All known adapters, live and synthetic, keyed by capability kind.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    live: BTreeMap<CapabilityKind, Arc<dyn Capability>>,
    synthetic: BTreeMap<CapabilityKind, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a synthetic adapter for every capability kind.
    pub fn synthetic() -> Self {
        let mut registry = Self::new();
        registry.register_synthetic(Arc::new(SyntheticProspects));
        registry.register_synthetic(Arc::new(SyntheticEnrichment));
        registry.register_synthetic(Arc::new(SyntheticContent));
        registry.register_synthetic(Arc::new(SyntheticSender));
        registry.register_synthetic(Arc::new(SyntheticEngagement));
        registry
    }

    /// Synthetic adapters plus a live adapter for every provider in the app config.
    ///
    /// Live adapters are registered even without a credential; they report
    /// themselves unavailable and resolve to synthetic at run start.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = RetryPolicy::from(&config.retry).call_timeout;
        let caps = &config.capabilities;
        let mut registry = Self::synthetic();

        registry.register_live(Arc::new(ApolloSearch::new(LiveEndpoint::from_provider(
            &caps.prospect_search,
            timeout,
        )?)));
        registry.register_live(Arc::new(ClearbitEnrichment::new(LiveEndpoint::from_provider(
            &caps.company_enrichment,
            timeout,
        )?)));
        registry.register_live(Arc::new(OpenAiContent::new(
            LiveEndpoint::from_provider(&caps.content_generation, timeout)?,
            caps.content_generation
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".into()),
        )));
        let sending = &caps.message_sending;
        let from_email = sending.from_email.clone().ok_or_else(|| {
            LeadflowError::config("capabilities.message_sending.from_email is required")
        })?;
        registry.register_live(Arc::new(SendGridSender::new(
            LiveEndpoint::from_provider(sending, timeout)?,
            from_email,
            sending.from_name.clone(),
        )));

        Ok(registry)
    }

    pub fn register_live(&mut self, adapter: Arc<dyn Capability>) {
        self.live.insert(adapter.kind(), adapter);
    }

    pub fn register_synthetic(&mut self, adapter: Arc<dyn Capability>) {
        self.synthetic.insert(adapter.kind(), adapter);
    }

    /// Whether any adapter, live or synthetic, is registered for `kind`.
    pub fn has_adapter(&self, kind: CapabilityKind) -> bool {
        self.live.contains_key(&kind) || self.synthetic.contains_key(&kind)
    }

    /// Decide, once, how each capability in `kinds` is served for a run.
    ///
    /// A kind resolves live when a live adapter is registered, its
    /// precondition holds, and it is not forced synthetic. Otherwise it
    /// resolves to its synthetic adapter.
    pub fn resolve(
        &self,
        kinds: impl IntoIterator<Item = CapabilityKind>,
        options: &ResolveOptions,
    ) -> Result<ResolvedCapabilities> {
        let mut entries = BTreeMap::new();

        for kind in kinds {
            if entries.contains_key(&kind) {
                continue;
            }
            let synthetic = self.synthetic.get(&kind).cloned();
            let live = self
                .live
                .get(&kind)
                .filter(|_| !options.force_synthetic.contains(&kind))
                .filter(|adapter| adapter.is_available())
                .cloned();

            let resolution = match (live, synthetic) {
                (Some(live), fallback) => {
                    debug!(capability = %kind, adapter = live.name(), "resolved live");
                    Resolution::Live(Resilient::new(live, fallback, options.retry))
                }
                (None, Some(synthetic)) => {
                    debug!(capability = %kind, adapter = synthetic.name(), "resolved synthetic");
                    Resolution::Synthetic(synthetic)
                }
                (None, None) => {
                    return Err(LeadflowError::CapabilityUnavailable {
                        capability: kind.to_string(),
                        reason: "no adapter registered".into(),
                    });
                }
            };
            entries.insert(kind, resolution);
        }

        let resolved = ResolvedCapabilities { entries };
        info!(capabilities = ?resolved.summary(), "capabilities resolved");
        Ok(resolved)
    }
}

/// Per-run resolution options.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub retry: RetryPolicy,
    /// Kinds that must be served synthetically (e.g. sending in dry-run mode).
    pub force_synthetic: BTreeSet<CapabilityKind>,
}

// ---------------------------------------------------------------------------
// Resolved capabilities
// ---------------------------------------------------------------------------

enum Resolution {
    Live(Resilient),
    Synthetic(Arc<dyn Capability>),
}

/// The capability set for one run. Resolution never changes during the run.
pub struct ResolvedCapabilities {
    entries: BTreeMap<CapabilityKind, Resolution>,
}

impl ResolvedCapabilities {
    /// How `kind` resolved, if it was requested.
    pub fn source(&self, kind: CapabilityKind) -> Option<ServedBy> {
        self.entries.get(&kind).map(|r| match r {
            Resolution::Live(_) => ServedBy::Live,
            Resolution::Synthetic(_) => ServedBy::Synthetic,
        })
    }

    /// Resolution of every requested kind, in kind order.
    pub fn summary(&self) -> Vec<(CapabilityKind, ServedBy)> {
        self.entries
            .keys()
            .filter_map(|kind| self.source(*kind).map(|s| (*kind, s)))
            .collect()
    }

    /// Serve one request through the resolved adapter.
    pub async fn call(&self, request: CapabilityRequest) -> Result<Served<CapabilityResponse>> {
        let kind = request.kind();
        let entry = self.entries.get(&kind).ok_or_else(|| LeadflowError::CapabilityUnavailable {
            capability: kind.to_string(),
            reason: "capability was not resolved for this run".into(),
        })?;

        let served = match entry {
            Resolution::Live(resilient) => resilient.serve(request).await?,
            Resolution::Synthetic(adapter) => Served::synthetic(adapter.invoke(request).await?),
        };

        if served.value.kind() != kind {
            return Err(LeadflowError::CapabilityUnavailable {
                capability: kind.to_string(),
                reason: format!("adapter answered with a {} response", served.value.kind()),
            });
        }
        Ok(served)
    }

    pub async fn search_prospects(&self, query: ProspectQuery) -> Result<Served<Vec<Lead>>> {
        let served = self.call(CapabilityRequest::SearchProspects(query)).await?;
        Ok(served.map(|response| match response {
            CapabilityResponse::Prospects(leads) => leads,
            _ => Vec::new(),
        }))
    }

    pub async fn enrich_company(&self, lead: Lead) -> Result<Served<CompanyProfile>> {
        let served = self.call(CapabilityRequest::EnrichCompany(lead)).await?;
        Ok(served.map(|response| match response {
            CapabilityResponse::Company(profile) => profile,
            _ => CompanyProfile::default(),
        }))
    }

    pub async fn generate_message(&self, brief: MessageBrief) -> Result<Served<DraftContent>> {
        let served = self.call(CapabilityRequest::GenerateMessage(brief)).await?;
        Ok(served.map(|response| match response {
            CapabilityResponse::Draft(draft) => draft,
            _ => DraftContent {
                subject: String::new(),
                body: String::new(),
            },
        }))
    }

    pub async fn send_message(&self, message: OutreachMessage) -> Result<Served<SendReceipt>> {
        let lead_id = message.lead_id.clone();
        let served = self.call(CapabilityRequest::SendMessage(message)).await?;
        match served.value {
            CapabilityResponse::Receipt(receipt) => Ok(Served {
                value: receipt,
                served_by: served.served_by,
                attempts: served.attempts,
                fallback_reason: served.fallback_reason,
            }),
            _ => Err(LeadflowError::step_failed(lead_id, "sender returned no receipt")),
        }
    }

    pub async fn fetch_engagement(&self, receipt: SendReceipt) -> Result<Served<Engagement>> {
        let lead_id = receipt.lead_id.clone();
        let served = self.call(CapabilityRequest::FetchEngagement(receipt)).await?;
        match served.value {
            CapabilityResponse::Engagement(engagement) => Ok(Served {
                value: engagement,
                served_by: served.served_by,
                attempts: served.attempts,
                fallback_reason: served.fallback_reason,
            }),
            _ => Err(LeadflowError::step_failed(lead_id, "tracker returned no engagement")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::CapabilityUnavailable;
    use leadflow_shared::{IcpCriteria, NumericRange};

    /// Live prospect adapter that counts availability checks and calls.
    #[derive(Default)]
    struct CountingSearch {
        available: bool,
        checks: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Capability for CountingSearch {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::ProspectSearch
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn is_available(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        async fn invoke(
            &self,
            _request: CapabilityRequest,
        ) -> std::result::Result<CapabilityResponse, CapabilityUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CapabilityResponse::Prospects(vec![Lead::new("live-1", "Live Co", "Live Person")]))
        }
    }

    fn query() -> ProspectQuery {
        ProspectQuery {
            icp: IcpCriteria {
                industry: vec![],
                location: None,
                employee_count: NumericRange::new(1, 10),
                revenue: NumericRange::new(1, 10),
                technologies: vec![],
                signals: vec![],
            },
            signals: vec![],
            limit: 2,
        }
    }

    #[tokio::test]
    async fn unavailable_live_adapter_stays_synthetic_for_the_run() {
        let counting = Arc::new(CountingSearch::default());
        let mut registry = CapabilityRegistry::synthetic();
        registry.register_live(counting.clone());

        let resolved = registry
            .resolve([CapabilityKind::ProspectSearch], &ResolveOptions::default())
            .unwrap();
        assert_eq!(resolved.source(CapabilityKind::ProspectSearch), Some(ServedBy::Synthetic));

        for _ in 0..3 {
            let served = resolved.search_prospects(query()).await.unwrap();
            assert_eq!(served.served_by, ServedBy::Synthetic);
            assert_eq!(served.value.len(), 2);
        }
        assert_eq!(counting.checks.load(Ordering::SeqCst), 1);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn available_live_adapter_serves_calls() {
        let counting = Arc::new(CountingSearch {
            available: true,
            ..Default::default()
        });
        let mut registry = CapabilityRegistry::synthetic();
        registry.register_live(counting.clone());

        let resolved = registry
            .resolve(
                [CapabilityKind::ProspectSearch, CapabilityKind::ProspectSearch],
                &ResolveOptions::default(),
            )
            .unwrap();
        let served = resolved.search_prospects(query()).await.unwrap();
        assert_eq!(served.served_by, ServedBy::Live);
        assert_eq!(served.value[0].id, "live-1");
        assert_eq!(counting.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forced_synthetic_skips_live() {
        let counting = Arc::new(CountingSearch {
            available: true,
            ..Default::default()
        });
        let mut registry = CapabilityRegistry::synthetic();
        registry.register_live(counting.clone());

        let options = ResolveOptions {
            force_synthetic: [CapabilityKind::ProspectSearch].into_iter().collect(),
            ..Default::default()
        };
        let resolved = registry.resolve([CapabilityKind::ProspectSearch], &options).unwrap();
        assert_eq!(resolved.source(CapabilityKind::ProspectSearch), Some(ServedBy::Synthetic));
        resolved.search_prospects(query()).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_adapter_fails_resolution() {
        let registry = CapabilityRegistry::new();
        assert!(!registry.has_adapter(CapabilityKind::MessageSending));
        let result = registry.resolve([CapabilityKind::MessageSending], &ResolveOptions::default());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unresolved_kind_is_rejected_at_call_time() {
        let resolved = CapabilityRegistry::synthetic()
            .resolve([CapabilityKind::ProspectSearch], &ResolveOptions::default())
            .unwrap();
        let err = resolved
            .enrich_company(Lead::new("lead-001", "Acme", "Jane Doe"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not resolved"));
    }

    #[test]
    fn config_registry_without_keys_resolves_synthetic() {
        let mut config = AppConfig::default();
        config.capabilities.prospect_search.api_key_env = "LF_TEST_UNSET_APOLLO_KEY_98765".into();
        let registry = CapabilityRegistry::from_config(&config).unwrap();
        let resolved = registry
            .resolve([CapabilityKind::ProspectSearch], &ResolveOptions::default())
            .unwrap();
        assert_eq!(resolved.source(CapabilityKind::ProspectSearch), Some(ServedBy::Synthetic));
    }
}
