//! Engagement tracking, fanned out across delivered messages.

use serde_json::json;
use tracing::{info, warn};

use leadflow_shared::{Result, SendReceipt};

use super::{Delta, StepEnv, fan_out, with_fields};
use crate::trace::TraceRecorder;

pub(super) async fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let receipts: Vec<SendReceipt> = env.required("sent_status")?;
    let mut leads = env.leads()?;
    let delivered: Vec<SendReceipt> = receipts
        .into_iter()
        .filter(|r| r.status.is_delivered())
        .collect();

    let reasoning = trace.begin(
        &env.step.id,
        env.goal("checking engagement on delivered messages"),
        Some(json!({ "delivered": delivered.len() })),
    );

    let mut acting = reasoning.act(
        format!("fetching engagement for {} messages concurrently", delivered.len()),
        None,
    );
    let results = fan_out(env, &delivered, |capabilities, receipt| async move {
        capabilities.fetch_engagement(receipt).await
    })
    .await?;

    let mut responses = Vec::with_capacity(delivered.len());
    for (receipt, result) in delivered.iter().zip(results) {
        match result {
            Some(Ok(served)) => {
                let details = with_fields(
                    served.provenance(),
                    &[
                        ("lead_id", json!(served.value.lead_id)),
                        ("opened", json!(served.value.opened)),
                        ("replied", json!(served.value.replied)),
                        ("meeting_booked", json!(served.value.meeting_booked)),
                    ],
                );
                let engagement = served.value;
                acting.act(format!("tracked {}", engagement.company), Some(details));
                if let Some(lead) = leads.iter_mut().find(|l| l.id == engagement.lead_id) {
                    lead.status = engagement.lead_status();
                }
                responses.push(engagement);
            }
            Some(Err(e)) => {
                warn!(lead = %receipt.lead_id, error = %e, "engagement tracking failed");
                acting.act(
                    format!("could not track {}", receipt.company),
                    Some(json!({ "lead_id": receipt.lead_id, "error": e.to_string() })),
                );
            }
            None => {}
        }
    }

    let opened = responses.iter().filter(|r| r.opened).count();
    let replied = responses.iter().filter(|r| r.replied).count();
    info!(step = %env.step.id, tracked = responses.len(), opened, replied, "engagement tracked");
    acting.observe(
        format!(
            "{} tracked: {opened} opened, {replied} replied",
            responses.len()
        ),
        Some(json!({ "tracked": responses.len(), "opened": opened, "replied": replied })),
    );

    let mut delta = Delta::new();
    delta.insert("responses".into(), env.encode("responses", &responses)?);
    delta.insert("leads".into(), env.encode("leads", &leads)?);
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use leadflow_shared::{DeliveryStatus, Engagement, Lead, LeadStatus, SendReceipt};

    use crate::units::testing::{pipeline, run_single, step, synthetic_capabilities};

    fn receipt(lead_id: &str, status: DeliveryStatus) -> SendReceipt {
        SendReceipt {
            lead_id: lead_id.into(),
            email: Some(format!("{lead_id}@acme.test")),
            company: format!("Company {lead_id}"),
            status,
            message_id: Some(format!("sim_{lead_id}")),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tracks_only_delivered_messages() {
        let pipeline =
            pipeline(json!([step("tracking", "ResponseTrackerAgent", Some("engagement_tracking"))]));
        let ids: Vec<String> = (0..6).map(|i| format!("lead-{i}")).collect();
        let mut receipts: Vec<SendReceipt> = ids
            .iter()
            .map(|id| receipt(id, DeliveryStatus::Simulated))
            .collect();
        receipts[5].status = DeliveryStatus::Failed;
        let leads: Vec<Lead> = ids.iter().map(|id| Lead::new(id, "Acme", "Pat Doe")).collect();

        let (delta, _) = run_single(
            &pipeline,
            json!({ "sent_status": receipts, "leads": leads }),
            synthetic_capabilities(),
        )
        .await;

        let responses: Vec<Engagement> =
            serde_json::from_value(delta["responses"].clone()).unwrap();
        assert_eq!(responses.len(), 5);
        let order: Vec<&str> = responses.iter().map(|r| r.lead_id.as_str()).collect();
        assert_eq!(order, vec!["lead-0", "lead-1", "lead-2", "lead-3", "lead-4"]);

        let leads: Vec<Lead> = serde_json::from_value(delta["leads"].clone()).unwrap();
        for (lead, response) in leads.iter().zip(&responses) {
            assert_eq!(lead.status, response.lead_status());
        }
        assert_eq!(leads[5].status, LeadStatus::Discovered);
    }
}
