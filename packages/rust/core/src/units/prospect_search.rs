//! Prospect discovery.

use serde_json::json;
use tracing::info;

use leadflow_adapters::ProspectQuery;
use leadflow_shared::{IcpCriteria, Result};

use super::{Delta, StepEnv};
use crate::trace::TraceRecorder;

const DEFAULT_LIMIT: usize = 10;

pub(super) async fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let icp: IcpCriteria = match env.input("icp")? {
        Some(icp) => icp,
        None => env
            .pipeline
            .icp
            .clone()
            .ok_or_else(|| env.failed("no ICP in inputs or config"))?,
    };
    let signals: Vec<String> = env.input("signals")?.unwrap_or_else(|| icp.signals.clone());
    let limit: usize = env.input("limit")?.unwrap_or(DEFAULT_LIMIT);

    let mut reasoning = trace.begin(
        &env.step.id,
        env.goal("searching for prospects that match the ICP"),
        Some(json!({
            "industry": icp.industry,
            "employee_count": icp.employee_count,
            "revenue": icp.revenue,
            "limit": limit,
        })),
    );
    if !signals.is_empty() {
        reasoning.reason(
            format!("looking for buying signals: {}", signals.join(", ")),
            None,
        );
    }

    let query = ProspectQuery {
        icp,
        signals,
        limit,
    };
    let served = env
        .capabilities
        .search_prospects(query)
        .await
        .map_err(|e| env.failed(e.to_string()))?;

    let acting = reasoning.act(
        format!("searched prospects ({})", served.served_by),
        Some(served.provenance()),
    );
    let mut leads = served.value;
    leads.truncate(limit);

    info!(step = %env.step.id, leads = leads.len(), served_by = %served.served_by, "prospects found");
    acting.observe(
        format!("found {} leads", leads.len()),
        Some(json!({ "companies": leads.iter().map(|l| &l.company).collect::<Vec<_>>() })),
    );

    let mut delta = Delta::new();
    delta.insert("leads".into(), env.encode("leads", &leads)?);
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use leadflow_shared::{Lead, TracePhase};

    use crate::units::testing::{pipeline, run_single, step, synthetic_capabilities};

    #[tokio::test]
    async fn finds_synthetic_leads_with_round_robin_signals() {
        let pipeline = pipeline(json!([step("search", "ProspectSearchAgent", Some("ApolloAPI"))]));
        let (delta, trace) =
            run_single(&pipeline, json!({ "limit": 3 }), synthetic_capabilities()).await;

        let leads: Vec<Lead> = serde_json::from_value(delta["leads"].clone()).unwrap();
        assert_eq!(leads.len(), 3);
        assert_eq!(leads[0].signals, vec!["recent_funding"]);
        assert_eq!(leads[1].signals, vec!["hiring_for_sales"]);
        assert_eq!(leads[0].industry.as_deref(), Some("SaaS"));

        let phases: Vec<TracePhase> = trace.iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![TracePhase::Reason, TracePhase::Reason, TracePhase::Act, TracePhase::Observe]
        );
        let act = trace.iter().find(|e| e.phase == TracePhase::Act).unwrap();
        assert_eq!(act.details.as_ref().unwrap()["served_by"], "synthetic");
    }

    #[tokio::test]
    async fn input_icp_overrides_config() {
        let pipeline = pipeline(json!([step("search", "ProspectSearchAgent", Some("ApolloAPI"))]));
        let inputs = json!({
            "icp": {
                "industry": ["Fintech"],
                "employee_count": { "min": 1, "max": 10 },
                "revenue": { "min": 1, "max": 10 }
            },
            "limit": 2
        });
        let (delta, _) = run_single(&pipeline, inputs, synthetic_capabilities()).await;
        let leads: Vec<Lead> = serde_json::from_value(delta["leads"].clone()).unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].industry.as_deref(), Some("Fintech"));
        assert!(leads[0].signals.is_empty());
    }
}
