//! Message dispatch.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_shared::{DeliveryStatus, LeadStatus, OutreachMessage, Result, SendReceipt};

use super::{Delta, StepEnv, with_fields};
use crate::trace::TraceRecorder;

/// `campaign_<8 hex>_<YYYYMMDD>`, unique per run.
fn campaign_id() -> String {
    let id = Uuid::now_v7().simple().to_string();
    format!("campaign_{}_{}", &id[id.len() - 8..], Utc::now().format("%Y%m%d"))
}

pub(super) async fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let messages: Vec<OutreachMessage> = env.required("messages")?;
    let mut leads = env.leads()?;
    let campaign_id = campaign_id();

    let reasoning = trace.begin(
        &env.step.id,
        env.goal("sending drafted outreach"),
        Some(json!({ "campaign_id": campaign_id, "messages": messages.len() })),
    );
    let mut acting = reasoning.act(
        format!("dispatching {} messages", messages.len()),
        None,
    );

    let mut receipts = Vec::with_capacity(messages.len());
    for message in &messages {
        let receipt = match env.capabilities.send_message(message.clone()).await {
            Ok(served) => {
                let details = with_fields(
                    served.provenance(),
                    &[
                        ("lead_id", json!(message.lead_id)),
                        ("status", json!(served.value.status)),
                    ],
                );
                acting.act(format!("sent message to {}", message.company), Some(details));
                served.value
            }
            Err(e) => {
                warn!(lead = %message.lead_id, error = %e, "send failed");
                acting.act(
                    format!("could not send to {}", message.company),
                    Some(json!({ "lead_id": message.lead_id, "error": e.to_string() })),
                );
                SendReceipt {
                    lead_id: message.lead_id.clone(),
                    email: message.email.clone(),
                    company: message.company.clone(),
                    status: DeliveryStatus::Failed,
                    message_id: None,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        };
        receipts.push(receipt);
    }

    for receipt in &receipts {
        if let Some(lead) = leads.iter_mut().find(|l| l.id == receipt.lead_id) {
            lead.status = if receipt.status.is_delivered() {
                LeadStatus::Contacted
            } else {
                LeadStatus::SendFailed
            };
        }
    }

    let delivered = receipts.iter().filter(|r| r.status.is_delivered()).count();
    info!(step = %env.step.id, %campaign_id, delivered, total = receipts.len(), "outreach sent");
    acting.observe(
        format!("delivered {delivered} of {} messages", receipts.len()),
        Some(json!({ "delivered": delivered, "failed": receipts.len() - delivered })),
    );

    let mut delta = Delta::new();
    delta.insert("campaign_id".into(), json!(campaign_id));
    delta.insert("sent_status".into(), env.encode("sent_status", &receipts)?);
    delta.insert("leads".into(), env.encode("leads", &leads)?);
    Ok(delta)
}
