//! Company enrichment via Clearbit's company lookup by domain.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use leadflow_shared::{CapabilityKind, CompanyProfile};

use super::{LiveEndpoint, json, send};
use crate::{Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable};

#[derive(Debug, Deserialize)]
struct Company {
    description: Option<String>,
    category: Option<Category>,
    metrics: Option<Metrics>,
    #[serde(default)]
    tech: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Category {
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    employees: Option<u64>,
    annual_revenue: Option<u64>,
}

pub struct ClearbitEnrichment {
    endpoint: LiveEndpoint,
}

impl ClearbitEnrichment {
    pub fn new(endpoint: LiveEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Capability for ClearbitEnrichment {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::CompanyEnrichment
    }

    fn name(&self) -> &str {
        "clearbit"
    }

    fn is_available(&self) -> bool {
        self.endpoint.has_key()
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let kind = self.kind();
        let CapabilityRequest::EnrichCompany(lead) = request else {
            return Err(CapabilityUnavailable::permanent(kind, "clearbit only serves company enrichment"));
        };

        let key = self.endpoint.key(kind)?;
        let domain = lead
            .email_domain()
            .ok_or_else(|| CapabilityUnavailable::permanent(kind, "lead has no email domain"))?;
        let mut url = self.endpoint.url(kind, "companies/find")?;
        url.query_pairs_mut().append_pair("domain", domain);
        debug!(%domain, company = %lead.company, "looking up company in Clearbit");

        let response = send(kind, self.endpoint.client().get(url).bearer_auth(key)).await?;
        let company: Company = json(kind, response).await?;

        let (employee_count, revenue) = company
            .metrics
            .map(|m| (m.employees, m.annual_revenue))
            .unwrap_or((None, None));

        Ok(CapabilityResponse::Company(CompanyProfile {
            description: company.description,
            industry: company.category.and_then(|c| c.industry),
            employee_count,
            revenue,
            technologies: company.tech,
            recent_news: None,
            signals: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use leadflow_shared::Lead;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> ClearbitEnrichment {
        let endpoint = LiveEndpoint::new(
            &format!("{}/v2", server.uri()),
            Some("cb-key".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        ClearbitEnrichment::new(endpoint)
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("lead-001", "Acme", "Jane Doe");
        lead.email = Some("jane@acme.io".into());
        lead
    }

    #[tokio::test]
    async fn maps_company_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/companies/find"))
            .and(query_param("domain", "acme.io"))
            .and(header("Authorization", "Bearer cb-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "description": "Acme makes anvils",
                "category": { "industry": "Manufacturing" },
                "metrics": { "employees": 250, "annualRevenue": 30000000 },
                "tech": ["aws", "salesforce"]
            })))
            .mount(&server)
            .await;

        let CapabilityResponse::Company(profile) = adapter(&server)
            .invoke(CapabilityRequest::EnrichCompany(lead()))
            .await
            .unwrap()
        else {
            panic!("expected company profile");
        };
        assert_eq!(profile.industry.as_deref(), Some("Manufacturing"));
        assert_eq!(profile.employee_count, Some(250));
        assert_eq!(profile.revenue, Some(30_000_000));
        assert_eq!(profile.technologies, vec!["aws", "salesforce"]);
    }

    #[tokio::test]
    async fn unknown_company_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .invoke(CapabilityRequest::EnrichCompany(lead()))
            .await
            .unwrap_err();
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn lead_without_email_is_rejected_before_calling() {
        let server = MockServer::start().await;
        let mut lead = lead();
        lead.email = None;
        let err = adapter(&server)
            .invoke(CapabilityRequest::EnrichCompany(lead))
            .await
            .unwrap_err();
        assert!(err.reason.contains("email domain"));
    }
}
