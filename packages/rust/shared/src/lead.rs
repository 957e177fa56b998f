//! Lead records and the records produced around them (ICP, weights,
//! outreach messages, delivery receipts, engagement, feedback).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// ICP
// ---------------------------------------------------------------------------

/// Inclusive numeric range used by ICP criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: u64,
    pub max: u64,
}

impl NumericRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Ideal Customer Profile: the filter criteria leads are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpCriteria {
    #[serde(default)]
    pub industry: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub employee_count: NumericRange,
    pub revenue: NumericRange,
    /// Technology tags that indicate fit.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Buying signals to search for.
    #[serde(default)]
    pub signals: Vec<String>,
}

impl IcpCriteria {
    /// Structural problems (inverted ranges). Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.employee_count.min > self.employee_count.max {
            problems.push(format!(
                "icp.employee_count min {} exceeds max {}",
                self.employee_count.min, self.employee_count.max
            ));
        }
        if self.revenue.min > self.revenue.max {
            problems.push(format!(
                "icp.revenue min {} exceeds max {}",
                self.revenue.min, self.revenue.max
            ));
        }
        problems
    }
}

// ---------------------------------------------------------------------------
// Scoring weights
// ---------------------------------------------------------------------------

/// Relative weight of each sub-score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub revenue_match: f64,
    pub employee_match: f64,
    pub technology_match: f64,
    pub signal_strength: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            revenue_match: 0.3,
            employee_match: 0.2,
            technology_match: 0.2,
            signal_strength: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.revenue_match + self.employee_match + self.technology_match + self.signal_strength
    }

    /// Every problem with these weights. Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, value) in [
            ("revenue_match", self.revenue_match),
            ("employee_match", self.employee_match),
            ("technology_match", self.technology_match),
            ("signal_strength", self.signal_strength),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("weight {name} = {value} is outside [0, 1]"));
            }
        }
        let sum = self.sum();
        if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            problems.push(format!("weights sum to {sum}, expected 1.0"));
        }
        problems
    }
}

/// Normalized sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub revenue_match: f64,
    pub employee_match: f64,
    pub technology_match: f64,
    pub signal_strength: f64,
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// Where a lead is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Discovered,
    Enriched,
    Qualified,
    Disqualified,
    Drafted,
    Contacted,
    SendFailed,
    NoResponse,
    Opened,
    Replied,
    MeetingBooked,
}

impl LeadStatus {
    /// Whether outreach steps should act on a lead in this state.
    pub fn is_outreach_target(&self) -> bool {
        !matches!(self, Self::Discovered | Self::Enriched | Self::Disqualified)
    }
}

/// A single business contact/company record flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub company: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u64>,
    /// Annual revenue in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<u64>,
    #[serde(default)]
    pub technologies: BTreeSet<String>,
    /// Buying signals, in the order they were observed.
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_news: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<ScoreBreakdown>,
    #[serde(default)]
    pub status: LeadStatus,
}

impl Lead {
    /// A freshly discovered lead with only identity fields set.
    pub fn new(id: impl Into<String>, company: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company: company.into(),
            contact: contact.into(),
            email: None,
            title: None,
            linkedin: None,
            industry: None,
            employee_count: None,
            revenue: None,
            technologies: BTreeSet::new(),
            signals: Vec::new(),
            description: None,
            recent_news: None,
            score: None,
            score_breakdown: None,
            status: LeadStatus::Discovered,
        }
    }

    /// Email domain, if the lead has an email address.
    pub fn email_domain(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|e| e.rsplit_once('@'))
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
    }

    /// Contact's first name (falls back to the full contact string).
    pub fn first_name(&self) -> &str {
        self.contact.split_whitespace().next().unwrap_or(&self.contact)
    }

    /// Merge an enrichment profile. Fields are only added or overwritten,
    /// never removed.
    pub fn apply_profile(&mut self, profile: CompanyProfile) {
        if profile.description.is_some() {
            self.description = profile.description;
        }
        if profile.industry.is_some() {
            self.industry = profile.industry;
        }
        if profile.employee_count.is_some() {
            self.employee_count = profile.employee_count;
        }
        if profile.revenue.is_some() {
            self.revenue = profile.revenue;
        }
        if profile.recent_news.is_some() {
            self.recent_news = profile.recent_news;
        }
        self.technologies.extend(profile.technologies);
        for signal in profile.signals {
            if !self.signals.contains(&signal) {
                self.signals.push(signal);
            }
        }
        self.status = LeadStatus::Enriched;
    }
}

/// Company data returned by an enrichment capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u64>,
    #[serde(default)]
    pub revenue: Option<u64>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub recent_news: Option<String>,
    /// Buying signals detected while enriching.
    #[serde(default)]
    pub signals: Vec<String>,
}

// ---------------------------------------------------------------------------
// Outreach
// ---------------------------------------------------------------------------

/// Subject and body produced by a content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftContent {
    pub subject: String,
    pub body: String,
}

/// A personalized message ready to be sent to one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachMessage {
    pub lead_id: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub company: String,
    pub subject: String,
    pub body: String,
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Simulated,
    Failed,
}

impl DeliveryStatus {
    /// Sent or simulated messages count as delivered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Sent | Self::Simulated)
    }
}

/// Receipt for one message dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub lead_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub company: String,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Engagement observed for one delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub lead_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub company: String,
    pub opened: bool,
    pub clicked: bool,
    pub replied: bool,
    pub meeting_booked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_content: Option<String>,
}

impl Engagement {
    /// The lead status this engagement implies.
    pub fn lead_status(&self) -> LeadStatus {
        if self.meeting_booked {
            LeadStatus::MeetingBooked
        } else if self.replied {
            LeadStatus::Replied
        } else if self.opened {
            LeadStatus::Opened
        } else {
            LeadStatus::NoResponse
        }
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// Final summary of a run: campaign metrics plus improvement recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub metrics: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}
