//! Deterministic synthetic adapters.
//!
//! Synthetic data is seeded from SHA-256 hashes of stable inputs (lead id,
//! company, subject), so the same run input always yields the same leads,
//! profiles, drafts and engagement.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use leadflow_shared::{
    CapabilityKind, CompanyProfile, DeliveryStatus, DraftContent, Engagement, Lead, SendReceipt,
};

use crate::{Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable};

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

fn digest(parts: &[&str]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// A value in `[0, 1)` derived from `parts`. Same parts, same value.
pub fn stable_fraction(parts: &[&str]) -> f64 {
    let hash = digest(parts);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    (u64::from_be_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

/// Lowercase hex prefix of the hash of `parts`, `len` characters long (max 64).
pub fn stable_hex(parts: &[&str], len: usize) -> String {
    let hex: String = digest(parts).iter().map(|b| format!("{b:02x}")).collect();
    hex[..len.min(hex.len())].to_string()
}

fn pick<'a>(items: &'a [&'a str], parts: &[&str]) -> &'a str {
    let index = (stable_fraction(parts) * items.len() as f64) as usize;
    items[index.min(items.len() - 1)]
}

fn unsupported(kind: CapabilityKind, request: &CapabilityRequest) -> CapabilityUnavailable {
    CapabilityUnavailable::permanent(
        kind,
        format!("synthetic {kind} adapter cannot serve a {} request", request.kind()),
    )
}

// ---------------------------------------------------------------------------
// Prospect search
// ---------------------------------------------------------------------------

/// (company, contact, email, title, employees)
const SAMPLE_PROSPECTS: [(&str, &str, &str, &str, u64); 10] = [
    ("Salesforce", "Sarah Johnson", "sarah.johnson@salesforce.com", "VP of Sales", 500),
    ("HubSpot", "Michael Chen", "m.chen@hubspot.com", "Director of Marketing", 450),
    ("Zendesk", "Emily Rodriguez", "emily.r@zendesk.com", "Head of Business Development", 380),
    ("Atlassian", "David Park", "david.park@atlassian.com", "VP of Enterprise Sales", 600),
    ("Shopify", "Amanda Williams", "a.williams@shopify.com", "Director of Partnerships", 420),
    ("Slack", "James Martinez", "james.m@slack.com", "Head of Sales Operations", 350),
    ("Zoom", "Lisa Thompson", "l.thompson@zoom.us", "VP of Customer Success", 550),
    ("DocuSign", "Robert Garcia", "r.garcia@docusign.com", "Director of Sales", 400),
    ("Twilio", "Jessica Lee", "jessica.lee@twilio.com", "Head of Growth", 380),
    ("Stripe", "Christopher Brown", "chris.brown@stripe.com", "VP of Business Development", 500),
];

/// Returns up to ten sample SaaS prospects.
#[derive(Debug, Default)]
pub struct SyntheticProspects;

#[async_trait]
impl Capability for SyntheticProspects {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::ProspectSearch
    }

    fn name(&self) -> &str {
        "synthetic-prospects"
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let CapabilityRequest::SearchProspects(query) = request else {
            return Err(unsupported(self.kind(), &request));
        };

        let industry = query.icp.industry.first().cloned();
        let leads = SAMPLE_PROSPECTS
            .iter()
            .take(query.limit)
            .enumerate()
            .map(|(i, (company, contact, email, title, employees))| {
                let mut lead = Lead::new(format!("lead-{:03}", i + 1), *company, *contact);
                lead.email = Some((*email).to_string());
                lead.title = Some((*title).to_string());
                lead.linkedin = Some(format!(
                    "https://linkedin.com/in/{}",
                    contact.to_lowercase().replace(' ', "-")
                ));
                lead.employee_count = Some(*employees);
                lead.industry = industry.clone();
                if let Some(signal) = query.signal_for(i) {
                    lead.signals.push(signal.to_string());
                }
                lead
            })
            .collect();

        Ok(CapabilityResponse::Prospects(leads))
    }
}

// ---------------------------------------------------------------------------
// Company enrichment
// ---------------------------------------------------------------------------

const SAAS_STACK: [&str; 5] = ["AWS", "React", "PostgreSQL", "Redis", "Docker"];
const DEFAULT_STACK: [&str; 4] = ["Salesforce", "HubSpot", "Slack", "Google Workspace"];

/// (headline suffix, buying signal it implies)
const NEWS: [(&str, &str); 5] = [
    ("announces Q4 growth of 25%", "growth"),
    ("expands sales team with 15 new hires", "hiring"),
    ("raises Series B funding", "funding_round"),
    ("launches new product line", "product_launch"),
    ("opens new office in San Francisco", "expansion"),
];

/// Produces a plausible company profile for a lead.
#[derive(Debug, Default)]
pub struct SyntheticEnrichment;

impl SyntheticEnrichment {
    pub fn profile_for(lead: &Lead) -> CompanyProfile {
        let is_vp = lead.title.as_deref().is_some_and(|t| t.contains("VP"));
        let stack: &[&str] = if is_vp { &SAAS_STACK } else { &DEFAULT_STACK };

        let news_index =
            (stable_fraction(&[&lead.company, "news"]) * NEWS.len() as f64) as usize;
        let (headline, signal) = NEWS[news_index.min(NEWS.len() - 1)];

        let employees = lead.employee_count.unwrap_or_else(|| {
            100 + (stable_fraction(&[&lead.company, "employees"]) * 900.0) as u64
        });
        // Revenue per employee between $80k and $200k, rounded to $1k.
        let per_head = 80_000.0 + stable_fraction(&[&lead.company, "revenue"]) * 120_000.0;
        let revenue = ((employees as f64 * per_head) / 1_000.0).round() as u64 * 1_000;

        CompanyProfile {
            description: Some(format!(
                "{} is a leading technology company specializing in enterprise software \
                 solutions. They serve mid-market and enterprise customers across North America.",
                lead.company
            )),
            industry: lead.industry.clone().or_else(|| Some("Technology".into())),
            employee_count: Some(employees),
            revenue: Some(revenue),
            technologies: stack.iter().map(|t| (*t).to_string()).collect(),
            recent_news: Some(format!("{} {headline}", lead.company)),
            signals: vec![signal.to_string()],
        }
    }
}

#[async_trait]
impl Capability for SyntheticEnrichment {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::CompanyEnrichment
    }

    fn name(&self) -> &str {
        "synthetic-enrichment"
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        match request {
            CapabilityRequest::EnrichCompany(lead) => {
                Ok(CapabilityResponse::Company(Self::profile_for(&lead)))
            }
            other => Err(unsupported(self.kind(), &other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Content generation
// ---------------------------------------------------------------------------

/// Template-based outreach drafts.
#[derive(Debug, Default)]
pub struct SyntheticContent;

impl SyntheticContent {
    pub fn subject_for(lead: &Lead) -> String {
        let company = &lead.company;
        let subjects = [
            format!("Quick question about {company}'s sales process"),
            format!("Helping {company} scale lead generation"),
            format!("{}, thoughts on AI-powered sales?", lead.first_name()),
            format!("Scaling sales at {company}"),
            format!("Re: {company}'s recent growth"),
        ];
        let index = (stable_fraction(&[&lead.id, &lead.company, "subject"]) * subjects.len() as f64)
            as usize;
        subjects[index.min(subjects.len() - 1)].clone()
    }

    pub fn draft_for(lead: &Lead, persona: &str) -> DraftContent {
        let company = &lead.company;
        let news = lead
            .recent_news
            .as_deref()
            .map(|n| format!("I saw the recent news: {n}."))
            .unwrap_or_else(|| format!("I noticed {company} has been growing."));
        let role = lead.title.as_deref().unwrap_or("a leader on the team");

        let body = format!(
            "Hi {first},\n\n\
             {news}\n\n\
             At Analytos.ai, we help B2B companies like {company} streamline their lead \
             generation process using AI-powered analytics. Our platform has helped similar \
             companies increase qualified leads by 40% while reducing manual research time by 60%.\n\n\
             Given {company}'s growth trajectory and your role as {role}, I thought this might be \
             relevant for your team.\n\n\
             Would you be open to a quick 15-minute call next week to explore how we could help \
             {company} scale your sales efforts more efficiently?\n\n\
             Best regards,\n{persona}\nAnalytos.ai",
            first = lead.first_name(),
        );

        DraftContent {
            subject: Self::subject_for(lead),
            body,
        }
    }
}

#[async_trait]
impl Capability for SyntheticContent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::ContentGeneration
    }

    fn name(&self) -> &str {
        "synthetic-content"
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        match request {
            CapabilityRequest::GenerateMessage(brief) => Ok(CapabilityResponse::Draft(
                Self::draft_for(&brief.lead, &brief.persona),
            )),
            other => Err(unsupported(self.kind(), &other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Message sending
// ---------------------------------------------------------------------------

/// Simulates delivery: nothing leaves the process.
#[derive(Debug, Default)]
pub struct SyntheticSender;

#[async_trait]
impl Capability for SyntheticSender {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::MessageSending
    }

    fn name(&self) -> &str {
        "synthetic-sender"
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let CapabilityRequest::SendMessage(message) = request else {
            return Err(unsupported(self.kind(), &request));
        };

        let receipt = match &message.email {
            Some(_) => SendReceipt {
                lead_id: message.lead_id.clone(),
                email: message.email.clone(),
                company: message.company.clone(),
                status: DeliveryStatus::Simulated,
                message_id: Some(format!(
                    "sim_{}",
                    stable_hex(&[&message.lead_id, &message.subject], 12)
                )),
                error: None,
                timestamp: Utc::now(),
            },
            None => SendReceipt {
                lead_id: message.lead_id.clone(),
                email: None,
                company: message.company.clone(),
                status: DeliveryStatus::Failed,
                message_id: None,
                error: Some("lead has no email address".into()),
                timestamp: Utc::now(),
            },
        };
        Ok(CapabilityResponse::Receipt(receipt))
    }
}

// ---------------------------------------------------------------------------
// Engagement tracking
// ---------------------------------------------------------------------------

const OPEN_RATE: f64 = 0.25;
/// Of opened messages.
const CLICK_RATE: f64 = 0.15;
/// Of opened messages.
const REPLY_RATE: f64 = 0.08;
/// Of replies.
const MEETING_RATE: f64 = 0.30;

const POSITIVE_REPLIES: [&str; 4] = [
    "Thanks for reaching out! I'd be interested in learning more. Do you have time for a call next week?",
    "This looks interesting. Let's schedule a 15-minute call to discuss further.",
    "I'm interested. Can you send me some more information and your calendar link?",
    "This could be relevant for our team. Let's connect next Tuesday if you're available.",
];

const NEUTRAL_REPLIES: [&str; 4] = [
    "Thanks for the email. Can you send me more details about your solution?",
    "Interesting. We're not looking right now but keep me posted.",
    "I'll review this with my team and get back to you.",
    "Not a priority at the moment, but let's revisit in Q2.",
];

/// Simulates typical B2B cold-email engagement rates.
#[derive(Debug, Default)]
pub struct SyntheticEngagement;

impl SyntheticEngagement {
    pub fn engagement_for(receipt: &SendReceipt) -> Engagement {
        let key = receipt.message_id.as_deref().unwrap_or(&receipt.lead_id);
        let delivered = receipt.status.is_delivered();

        let opened = delivered && stable_fraction(&[key, "open"]) < OPEN_RATE;
        let clicked = opened && stable_fraction(&[key, "click"]) < CLICK_RATE;
        let replied = opened && stable_fraction(&[key, "reply"]) < REPLY_RATE;
        let meeting_booked = replied && stable_fraction(&[key, "meeting"]) < MEETING_RATE;

        let reply_content = replied.then(|| {
            let pool: &[&str] = if meeting_booked {
                &POSITIVE_REPLIES
            } else {
                &NEUTRAL_REPLIES
            };
            pick(pool, &[key, "reply-content"]).to_string()
        });

        Engagement {
            lead_id: receipt.lead_id.clone(),
            email: receipt.email.clone(),
            company: receipt.company.clone(),
            opened,
            clicked,
            replied,
            meeting_booked,
            reply_content,
        }
    }
}

#[async_trait]
impl Capability for SyntheticEngagement {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::EngagementTracking
    }

    fn name(&self) -> &str {
        "synthetic-engagement"
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        match request {
            CapabilityRequest::FetchEngagement(receipt) => Ok(CapabilityResponse::Engagement(
                Self::engagement_for(&receipt),
            )),
            other => Err(unsupported(self.kind(), &other)),
        }
    }
}
