//! Campaign analysis and recommendations.

use serde_json::json;
use tracing::info;

use leadflow_shared::{Engagement, Result};

use super::{Delta, StepEnv};
use crate::report::{self, CampaignMetrics};
use crate::trace::TraceRecorder;

pub(super) fn run(env: &StepEnv<'_>, trace: &mut TraceRecorder) -> Result<Delta> {
    let responses: Vec<Engagement> = env.input_or_context("responses")?.unwrap_or_default();
    let leads = env.leads()?;

    let reasoning = trace.begin(
        &env.step.id,
        env.goal("analysing campaign performance"),
        Some(json!({ "responses": responses.len(), "leads": leads.len() })),
    );

    let metrics = CampaignMetrics::from_responses(&responses);
    let mut acting = reasoning.act(
        format!(
            "open rate {:.1}%, reply rate {:.1}%",
            metrics.open_rate, metrics.reply_rate
        ),
        Some(json!(metrics)),
    );

    let average_score = report::average_score(&leads);
    let recommendations: Vec<String> = report::recommend(&metrics, average_score)
        .iter()
        .map(ToString::to_string)
        .collect();
    acting.act(
        "applied recommendation rules",
        Some(json!({ "average_score": average_score, "recommendations": recommendations.len() })),
    );

    info!(
        step = %env.step.id,
        open_rate = metrics.open_rate,
        reply_rate = metrics.reply_rate,
        recommendations = recommendations.len(),
        "campaign analysed"
    );
    acting.observe(
        format!("generated {} recommendations", recommendations.len()),
        None,
    );

    let mut delta = Delta::new();
    delta.insert("metrics".into(), env.encode("metrics", &metrics.to_map())?);
    delta.insert("recommendations".into(), json!(recommendations));
    Ok(delta)
}
