//! Request/response records, one pair per capability kind.

use serde::{Deserialize, Serialize};

use leadflow_shared::{
    CapabilityKind, CompanyProfile, DraftContent, Engagement, IcpCriteria, Lead, OutreachMessage,
    SendReceipt,
};

/// Search parameters for prospect discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectQuery {
    pub icp: IcpCriteria,
    #[serde(default)]
    pub signals: Vec<String>,
    pub limit: usize,
}

impl ProspectQuery {
    /// Signal assigned to the `index`-th prospect, round-robin over the query's signals.
    pub fn signal_for(&self, index: usize) -> Option<&str> {
        if self.signals.is_empty() {
            None
        } else {
            Some(self.signals[index % self.signals.len()].as_str())
        }
    }
}

/// What a content generator needs to draft one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBrief {
    pub lead: Lead,
    pub persona: String,
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    SearchProspects(ProspectQuery),
    EnrichCompany(Lead),
    GenerateMessage(MessageBrief),
    SendMessage(OutreachMessage),
    FetchEngagement(SendReceipt),
}

impl CapabilityRequest {
    /// The capability kind that serves this request.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::SearchProspects(_) => CapabilityKind::ProspectSearch,
            Self::EnrichCompany(_) => CapabilityKind::CompanyEnrichment,
            Self::GenerateMessage(_) => CapabilityKind::ContentGeneration,
            Self::SendMessage(_) => CapabilityKind::MessageSending,
            Self::FetchEngagement(_) => CapabilityKind::EngagementTracking,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityResponse {
    Prospects(Vec<Lead>),
    Company(CompanyProfile),
    Draft(DraftContent),
    Receipt(SendReceipt),
    Engagement(Engagement),
}

impl CapabilityResponse {
    /// The capability kind that produces this response.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Prospects(_) => CapabilityKind::ProspectSearch,
            Self::Company(_) => CapabilityKind::CompanyEnrichment,
            Self::Draft(_) => CapabilityKind::ContentGeneration,
            Self::Receipt(_) => CapabilityKind::MessageSending,
            Self::Engagement(_) => CapabilityKind::EngagementTracking,
        }
    }
}
