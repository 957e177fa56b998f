//! Campaign metrics, recommendation rules, and run summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use leadflow_shared::{Engagement, FeedbackReport, Lead, LeadStatus, SendReceipt};

use crate::context::SharedContext;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Engagement counts and rates for one campaign. Rates are percentages of
/// tracked messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CampaignMetrics {
    pub total_sent: usize,
    pub total_opened: usize,
    pub total_clicked: usize,
    pub total_replied: usize,
    pub total_meetings: usize,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
    pub meeting_rate: f64,
}

impl CampaignMetrics {
    pub fn from_responses(responses: &[Engagement]) -> Self {
        let total = responses.len();
        if total == 0 {
            return Self::default();
        }
        let count = |pred: fn(&Engagement) -> bool| responses.iter().filter(|r| pred(r)).count();
        let rate = |n: usize| n as f64 / total as f64 * 100.0;

        let opened = count(|r| r.opened);
        let clicked = count(|r| r.clicked);
        let replied = count(|r| r.replied);
        let meetings = count(|r| r.meeting_booked);

        Self {
            total_sent: total,
            total_opened: opened,
            total_clicked: clicked,
            total_replied: replied,
            total_meetings: meetings,
            open_rate: rate(opened),
            click_rate: rate(clicked),
            reply_rate: rate(replied),
            meeting_rate: rate(meetings),
        }
    }

    /// Flatten to the report's `name -> value` mapping.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            ("total_sent", self.total_sent as f64),
            ("total_opened", self.total_opened as f64),
            ("total_clicked", self.total_clicked as f64),
            ("total_replied", self.total_replied as f64),
            ("total_meetings", self.total_meetings as f64),
            ("open_rate", self.open_rate),
            ("click_rate", self.click_rate),
            ("reply_rate", self.reply_rate),
            ("meeting_rate", self.meeting_rate),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Mean score of scored leads that were not disqualified. 0 when there are none.
pub fn average_score(leads: &[Lead]) -> f64 {
    let scores: Vec<f64> = leads
        .iter()
        .filter(|l| l.status != LeadStatus::Disqualified)
        .filter_map(|l| l.score)
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
        })
    }
}

/// One improvement suggestion produced by the feedback rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub category: &'static str,
    pub suggestion: &'static str,
    pub confidence: Confidence,
    pub current_value: String,
    pub target_value: &'static str,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (current {}, target {}, confidence {})",
            self.category, self.suggestion, self.current_value, self.target_value, self.confidence
        )
    }
}

/// Apply the fixed recommendation rules, in rule order.
pub fn recommend(metrics: &CampaignMetrics, average_score: f64) -> Vec<Recommendation> {
    let pct = |v: f64| format!("{v:.1}%");
    let mut out = Vec::new();

    if metrics.open_rate < 20.0 {
        out.push(Recommendation {
            category: "Subject Lines",
            suggestion: "Open rate is below the 20% industry average. Test more personalized \
                         subject lines that reference company-specific news or pain points.",
            confidence: Confidence::High,
            current_value: pct(metrics.open_rate),
            target_value: "25-30%",
        });
    }
    if metrics.reply_rate < 2.0 {
        out.push(Recommendation {
            category: "Email Content",
            suggestion: "Reply rate is low. Try shorter emails (under 100 words), clearer value \
                         propositions and more specific calls to action.",
            confidence: Confidence::High,
            current_value: pct(metrics.reply_rate),
            target_value: "3-5%",
        });
    }
    if metrics.meeting_rate < 0.5 && metrics.reply_rate > 2.0 {
        out.push(Recommendation {
            category: "Call-to-Action",
            suggestion: "Replies are healthy but few turn into meetings. Make the ask specific \
                         (\"15-min call Tuesday 2pm?\") and include a calendar link.",
            confidence: Confidence::Medium,
            current_value: pct(metrics.meeting_rate),
            target_value: "1-2%",
        });
    }
    if average_score < 70.0 {
        out.push(Recommendation {
            category: "ICP Targeting",
            suggestion: "Average lead score is below 70. Tighten the ICP criteria to focus on \
                         higher-quality prospects.",
            confidence: Confidence::Medium,
            current_value: format!("{average_score:.1}"),
            target_value: "75+",
        });
    }
    if metrics.open_rate > 25.0 {
        out.push(Recommendation {
            category: "Subject Lines",
            suggestion: "Subject lines are performing well. Document the winning patterns and \
                         keep A/B testing.",
            confidence: Confidence::High,
            current_value: pct(metrics.open_rate),
            target_value: "Maintain",
        });
    }
    if metrics.meeting_rate > 1.0 {
        out.push(Recommendation {
            category: "Overall Performance",
            suggestion: "Meeting booking rate is excellent. Scale this campaign and document \
                         the messaging approach.",
            confidence: Confidence::High,
            current_value: pct(metrics.meeting_rate),
            target_value: "Scale",
        });
    }
    out
}

/// Metrics and recommendations for a campaign, as persisted.
pub fn feedback_report(responses: &[Engagement], leads: &[Lead]) -> FeedbackReport {
    let metrics = CampaignMetrics::from_responses(responses);
    FeedbackReport {
        metrics: metrics.to_map(),
        recommendations: recommend(&metrics, average_score(leads))
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// Headline numbers for a finished run, read from its final context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub leads: usize,
    pub qualified: usize,
    pub contacted: usize,
    pub send_failures: usize,
    pub engaged: usize,
    pub top_lead: Option<(String, f64)>,
}

impl RunSummary {
    pub fn from_context(context: &SharedContext) -> Self {
        let leads = context.leads();
        let receipts: Vec<SendReceipt> = context
            .get("sent_status")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let top_lead = leads
            .iter()
            .filter_map(|l| l.score.map(|s| (l.company.clone(), s)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        Self {
            leads: leads.len(),
            qualified: leads
                .iter()
                .filter(|l| l.score.is_some() && l.status != LeadStatus::Disqualified)
                .count(),
            contacted: receipts.iter().filter(|r| r.status.is_delivered()).count(),
            send_failures: receipts.iter().filter(|r| !r.status.is_delivered()).count(),
            engaged: leads
                .iter()
                .filter(|l| {
                    matches!(
                        l.status,
                        LeadStatus::Opened | LeadStatus::Replied | LeadStatus::MeetingBooked
                    )
                })
                .count(),
            top_lead,
        }
    }
}

/// The feedback report a run left in its context, if a feedback step ran.
pub fn report_from_context(context: &SharedContext) -> Option<FeedbackReport> {
    let metrics = context.get("metrics")?.clone();
    let recommendations = context
        .get("recommendations")
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(serde_json::json!({
        "metrics": metrics,
        "recommendations": recommendations,
    }))
    .ok()
}
