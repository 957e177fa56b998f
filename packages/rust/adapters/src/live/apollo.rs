//! Prospect search via Apollo's `mixed_people/search` API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use leadflow_shared::{CapabilityKind, Lead};

use super::{LiveEndpoint, json, send};
use crate::{Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable, ProspectQuery};

/// Apollo caps `per_page` at this value.
const MAX_PER_PAGE: usize = 25;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct Person {
    name: Option<String>,
    email: Option<String>,
    title: Option<String>,
    linkedin_url: Option<String>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    name: Option<String>,
    industry: Option<String>,
    estimated_num_employees: Option<u64>,
    annual_revenue: Option<f64>,
}

pub struct ApolloSearch {
    endpoint: LiveEndpoint,
}

impl ApolloSearch {
    pub fn new(endpoint: LiveEndpoint) -> Self {
        Self { endpoint }
    }

    fn payload(query: &ProspectQuery) -> serde_json::Value {
        json!({
            "person_titles": ["VP", "Director", "Head", "Chief", "Manager"],
            "person_seniorities": ["vp", "director", "head"],
            "organization_locations": [query.icp.location.as_deref().unwrap_or("USA")],
            "organization_num_employees_ranges": [
                format!("{},{}", query.icp.employee_count.min, query.icp.employee_count.max)
            ],
            "page": 1,
            "per_page": query.limit.min(MAX_PER_PAGE),
        })
    }

    fn to_lead(index: usize, person: Person, query: &ProspectQuery) -> Lead {
        let org = person.organization;
        let company = org
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| "Unknown".into());
        let mut lead = Lead::new(
            format!("lead-{:03}", index + 1),
            company,
            person.name.unwrap_or_else(|| "Unknown".into()),
        );
        lead.email = person.email.filter(|e| !e.is_empty());
        lead.title = person.title;
        lead.linkedin = person.linkedin_url;
        if let Some(org) = org {
            lead.industry = org.industry;
            lead.employee_count = org.estimated_num_employees;
            lead.revenue = org
                .annual_revenue
                .filter(|r| r.is_finite() && *r >= 0.0)
                .map(|r| r as u64);
        }
        if lead.industry.is_none() {
            lead.industry = query.icp.industry.first().cloned();
        }
        if let Some(signal) = query.signal_for(index) {
            lead.signals.push(signal.to_string());
        }
        lead
    }
}

#[async_trait]
impl Capability for ApolloSearch {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::ProspectSearch
    }

    fn name(&self) -> &str {
        "apollo"
    }

    fn is_available(&self) -> bool {
        self.endpoint.has_key()
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let kind = self.kind();
        let CapabilityRequest::SearchProspects(query) = request else {
            return Err(CapabilityUnavailable::permanent(kind, "apollo only serves prospect search"));
        };

        let key = self.endpoint.key(kind)?;
        let url = self.endpoint.url(kind, "mixed_people/search")?;
        debug!(%url, limit = query.limit, "searching Apollo");

        let response = send(
            kind,
            self.endpoint
                .client()
                .post(url)
                .header("X-Api-Key", key)
                .header("Cache-Control", "no-cache")
                .json(&Self::payload(&query)),
        )
        .await?;
        let body: SearchResponse = json(kind, response).await?;

        if body.people.is_empty() {
            return Err(CapabilityUnavailable::permanent(kind, "no prospects matched"));
        }

        let leads = body
            .people
            .into_iter()
            .take(query.limit)
            .enumerate()
            .map(|(i, person)| Self::to_lead(i, person, &query))
            .collect();
        Ok(CapabilityResponse::Prospects(leads))
    }
}
