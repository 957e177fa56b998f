//! Outreach drafting for qualified leads.

use serde_json::json;
use tracing::{info, warn};

use leadflow_adapters::MessageBrief;
use leadflow_shared::{LeadStatus, OutreachMessage, Result};

use super::{Delta, StepEnv, with_fields};
use crate::trace::TraceRecorder;

const DEFAULT_PERSONA: &str = "SDR";
const DEFAULT_TONE: &str = "friendly and professional";

pub(super) async fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let mut leads = env.leads()?;
    let persona: String = env.input("persona")?.unwrap_or_else(|| DEFAULT_PERSONA.into());
    let tone: String = env.input("tone")?.unwrap_or_else(|| DEFAULT_TONE.into());

    let targets = leads
        .iter()
        .filter(|l| l.status == LeadStatus::Qualified)
        .count();
    let mut reasoning = trace.begin(
        &env.step.id,
        env.goal("drafting personalized outreach"),
        Some(json!({ "persona": persona, "tone": tone })),
    );
    reasoning.reason(
        format!("{targets} of {} leads are qualified for outreach", leads.len()),
        None,
    );
    let mut acting = reasoning.act(format!("generating {targets} messages"), None);

    let mut messages = Vec::with_capacity(targets);
    for lead in leads.iter_mut().filter(|l| l.status == LeadStatus::Qualified) {
        let brief = MessageBrief {
            lead: lead.clone(),
            persona: persona.clone(),
            tone: tone.clone(),
        };
        match env.capabilities.generate_message(brief).await {
            Ok(served) => {
                let details = with_fields(
                    served.provenance(),
                    &[
                        ("lead_id", json!(lead.id)),
                        ("subject", json!(served.value.subject)),
                    ],
                );
                acting.act(format!("drafted message for {}", lead.company), Some(details));
                messages.push(OutreachMessage {
                    lead_id: lead.id.clone(),
                    contact: lead.contact.clone(),
                    email: lead.email.clone(),
                    company: lead.company.clone(),
                    subject: served.value.subject,
                    body: served.value.body,
                });
                lead.status = LeadStatus::Drafted;
            }
            Err(e) => {
                warn!(lead = %lead.id, error = %e, "message generation failed");
                acting.act(
                    format!("could not draft a message for {}", lead.company),
                    Some(json!({ "lead_id": lead.id, "error": e.to_string() })),
                );
            }
        }
    }

    info!(step = %env.step.id, messages = messages.len(), "outreach drafted");
    acting.observe(
        format!("drafted {} messages", messages.len()),
        Some(json!({ "messages": messages.len() })),
    );

    let mut delta = Delta::new();
    delta.insert("messages".into(), env.encode("messages", &messages)?);
    delta.insert("leads".into(), env.encode("leads", &leads)?);
    Ok(delta)
}
