//! Company enrichment, fanned out across leads.

use serde_json::json;
use tracing::{info, warn};

use leadflow_shared::Result;

use super::{Delta, StepEnv, fan_out, with_fields};
use crate::trace::TraceRecorder;

pub(super) async fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let mut leads = env.leads()?;

    let reasoning = trace.begin(
        &env.step.id,
        env.goal("adding company data to each lead"),
        Some(json!({ "leads": leads.len() })),
    );

    let mut acting = reasoning.act(
        format!("requested enrichment for {} leads concurrently", leads.len()),
        Some(json!({ "max_in_flight": env.limiter.available_permits() })),
    );
    let results = fan_out(env, &leads, |capabilities, lead| async move {
        capabilities.enrich_company(lead).await
    })
    .await?;

    let mut enriched = 0usize;
    for (lead, result) in leads.iter_mut().zip(results) {
        match result {
            Some(Ok(served)) => {
                let details = with_fields(served.provenance(), &[("lead_id", json!(lead.id))]);
                acting.act(format!("enriched {}", lead.company), Some(details));
                lead.apply_profile(served.value);
                enriched += 1;
            }
            Some(Err(e)) => {
                warn!(lead = %lead.id, error = %e, "enrichment failed, keeping lead as is");
                acting.act(
                    format!("could not enrich {}", lead.company),
                    Some(json!({ "lead_id": lead.id, "error": e.to_string() })),
                );
            }
            None => {}
        }
    }

    info!(step = %env.step.id, enriched, total = leads.len(), "leads enriched");
    acting.observe(
        format!("enriched {enriched} of {} leads", leads.len()),
        Some(json!({ "enriched_count": enriched })),
    );

    let mut delta = Delta::new();
    delta.insert("leads".into(), env.encode("leads", &leads)?);
    delta.insert("enriched_count".into(), json!(enriched));
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use leadflow_adapters::{
        Capability, CapabilityRegistry, CapabilityRequest, CapabilityResponse,
        CapabilityUnavailable, ResolveOptions,
    };
    use leadflow_shared::{CapabilityKind, CompanyProfile, Lead, LeadStatus, TracePhase};

    use crate::units::testing::{
        pipeline, run_single, run_single_limited, step, synthetic_capabilities,
    };

    /// Live enrichment adapter that records how many calls overlap.
    #[derive(Default)]
    struct SlowEnrichment {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Capability for SlowEnrichment {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::CompanyEnrichment
        }

        fn name(&self) -> &str {
            "slow-enrichment"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn invoke(
            &self,
            _request: CapabilityRequest,
        ) -> Result<CapabilityResponse, CapabilityUnavailable> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CapabilityResponse::Company(CompanyProfile {
                industry: Some("SaaS".into()),
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn in_flight_calls_stay_within_the_limit() {
        let live = Arc::new(SlowEnrichment::default());
        let mut registry = CapabilityRegistry::synthetic();
        registry.register_live(live.clone());
        let capabilities = Arc::new(
            registry
                .resolve([CapabilityKind::CompanyEnrichment], &ResolveOptions::default())
                .unwrap(),
        );

        let leads: Vec<Lead> = (0..40)
            .map(|i| Lead::new(format!("lead-{i:03}"), format!("Company {i}"), "Contact"))
            .collect();
        let pipeline = pipeline(json!([step("enrich", "DataEnrichmentAgent", Some("Clearbit"))]));
        let (delta, _) =
            run_single_limited(&pipeline, json!({ "leads": leads }), capabilities, 3).await;

        assert_eq!(delta["enriched_count"], 40);
        assert_eq!(live.calls.load(Ordering::SeqCst), 40);
        let peak = live.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak in-flight calls {peak}");
    }

    #[tokio::test]
    async fn enriches_every_lead_in_input_order() {
        let pipeline = pipeline(json!([step("enrich", "DataEnrichmentAgent", Some("Clearbit"))]));
        let mut a = Lead::new("lead-001", "Salesforce", "Sarah Johnson");
        a.title = Some("VP of Sales".into());
        a.employee_count = Some(500);
        let b = Lead::new("lead-002", "HubSpot", "Michael Chen");

        let (delta, trace) = run_single(
            &pipeline,
            json!({ "leads": [a, b] }),
            synthetic_capabilities(),
        )
        .await;

        assert_eq!(delta["enriched_count"], 2);
        let leads: Vec<Lead> = serde_json::from_value(delta["leads"].clone()).unwrap();
        assert_eq!(leads[0].id, "lead-001");
        assert_eq!(leads[1].id, "lead-002");
        assert!(leads.iter().all(|l| l.status == LeadStatus::Enriched));
        assert!(leads[0].technologies.contains("AWS"));
        assert!(leads[1].technologies.contains("HubSpot"));
        assert_eq!(leads[0].employee_count, Some(500));
        assert!(leads[1].revenue.is_some());

        let acts = trace.iter().filter(|e| e.phase == TracePhase::Act).count();
        assert_eq!(acts, 3);
    }

    #[tokio::test]
    async fn empty_lead_list_still_traces_all_phases() {
        let pipeline = pipeline(json!([step("enrich", "DataEnrichmentAgent", Some("Clearbit"))]));
        let (delta, trace) =
            run_single(&pipeline, json!({ "leads": [] }), synthetic_capabilities()).await;
        assert_eq!(delta["enriched_count"], 0);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[2].phase, TracePhase::Observe);
    }
}
