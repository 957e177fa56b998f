//! Message sending via SendGrid's v3 mail send API.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use leadflow_shared::{CapabilityKind, DeliveryStatus, SendReceipt};

use super::{LiveEndpoint, send};
use crate::{Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable};

pub struct SendGridSender {
    endpoint: LiveEndpoint,
    from_email: String,
    from_name: Option<String>,
}

impl SendGridSender {
    pub fn new(endpoint: LiveEndpoint, from_email: impl Into<String>, from_name: Option<String>) -> Self {
        Self {
            endpoint,
            from_email: from_email.into(),
            from_name,
        }
    }
}

#[async_trait]
impl Capability for SendGridSender {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::MessageSending
    }

    fn name(&self) -> &str {
        "sendgrid"
    }

    fn is_available(&self) -> bool {
        self.endpoint.has_key()
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let kind = self.kind();
        let CapabilityRequest::SendMessage(message) = request else {
            return Err(CapabilityUnavailable::permanent(kind, "sendgrid only serves message sending"));
        };

        let key = self.endpoint.key(kind)?;
        let to = message
            .email
            .as_deref()
            .ok_or_else(|| CapabilityUnavailable::permanent(kind, "message has no recipient"))?;
        let url = self.endpoint.url(kind, "mail/send")?;

        let mut from = json!({ "email": self.from_email });
        if let Some(name) = &self.from_name {
            from["name"] = json!(name);
        }
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to, "name": message.contact }] }],
            "from": from,
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body }],
        });
        debug!(lead = %message.lead_id, "sending message through SendGrid");

        let response = send(kind, self.endpoint.client().post(url).bearer_auth(key).json(&payload)).await?;
        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(CapabilityResponse::Receipt(SendReceipt {
            lead_id: message.lead_id.clone(),
            email: message.email.clone(),
            company: message.company.clone(),
            status: DeliveryStatus::Sent,
            message_id: Some(message_id),
            error: None,
            timestamp: Utc::now(),
        }))
    }
}
