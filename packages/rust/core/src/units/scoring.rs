//! Lead scoring and ranking.

use serde_json::json;
use tracing::info;

use leadflow_shared::{IcpCriteria, Lead, LeadStatus, Result};

use super::{Delta, StepEnv};
use crate::trace::TraceRecorder;

pub(super) fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let mut leads = env.leads()?;
    let icp: IcpCriteria = match env.input("icp")? {
        Some(icp) => icp,
        None => env
            .pipeline
            .icp
            .clone()
            .ok_or_else(|| env.failed("no ICP in inputs or config"))?,
    };
    let min_score: Option<f64> = env.input("min_score")?.or(env.pipeline.min_score);
    if let Some(threshold) = min_score {
        if !(0.0..=leadflow_scoring::MAX_SCORE).contains(&threshold) {
            return Err(env.failed(format!("min_score {threshold} is outside [0, 100]")));
        }
    }
    let weights = env.pipeline.weights;

    let reasoning = trace.begin(
        &env.step.id,
        env.goal("scoring leads against the ICP"),
        Some(json!({
            "leads": leads.len(),
            "weights": weights,
            "min_score": min_score,
        })),
    );
    let mut acting = reasoning.act(format!("scoring {} leads", leads.len()), None);

    for lead in &mut leads {
        leadflow_scoring::apply_score(lead, &weights, &icp, min_score);
        acting.act(
            format!("scored {} at {:.1}", lead.company, lead.score.unwrap_or_default()),
            Some(json!({
                "lead_id": lead.id,
                "score": lead.score,
                "breakdown": lead.score_breakdown,
                "status": lead.status,
            })),
        );
    }

    let ranked = leadflow_scoring::rank(leads);
    let qualified: Vec<Lead> = ranked
        .iter()
        .filter(|l| l.status == LeadStatus::Qualified)
        .cloned()
        .collect();

    info!(
        step = %env.step.id,
        total = ranked.len(),
        qualified = qualified.len(),
        "leads scored"
    );
    acting.observe(
        format!("{} of {} leads qualified", qualified.len(), ranked.len()),
        Some(json!({
            "qualified_count": qualified.len(),
            "top": ranked.first().map(|l| json!({ "company": l.company, "score": l.score })),
        })),
    );

    let mut delta = Delta::new();
    delta.insert("leads".into(), env.encode("leads", &ranked)?);
    delta.insert("ranked_leads".into(), env.encode("ranked_leads", &qualified)?);
    delta.insert("qualified_count".into(), json!(qualified.len()));
    Ok(delta)
}
