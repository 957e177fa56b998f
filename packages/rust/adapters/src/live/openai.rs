//! Message generation via an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use leadflow_shared::{CapabilityKind, DraftContent, Lead};

use super::{LiveEndpoint, json, send};
use crate::synthetic::SyntheticContent;
use crate::{Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable, MessageBrief};

const SYSTEM_PROMPT: &str = "You are an expert sales copywriter who writes compelling, \
                             personalized outreach emails.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct OpenAiContent {
    endpoint: LiveEndpoint,
    model: String,
}

impl OpenAiContent {
    pub fn new(endpoint: LiveEndpoint, model: impl Into<String>) -> Self {
        Self {
            endpoint,
            model: model.into(),
        }
    }

    fn prompt(brief: &MessageBrief) -> String {
        let lead = &brief.lead;
        let technologies = lead
            .technologies
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let score = lead
            .score
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "N/A".into());

        format!(
            "You are a {persona} writing a personalized outreach email.\n\n\
             Lead Information:\n\
             - Name: {name}\n\
             - Role: {role}\n\
             - Company: {company}\n\
             - Company Description: {description}\n\
             - Recent News: {news}\n\
             - Technologies: {technologies}\n\
             - Lead Score: {score}/100\n\n\
             Write a {tone} outreach email to this prospect. Keep it under 150 words, \
             personalize it with their company and recent news, state a clear value \
             proposition, and ask for a 15-minute call.\n\n\
             Product: Analytos.ai - AI-powered sales analytics and lead generation platform\n\n\
             Return ONLY two things:\n\
             SUBJECT: [subject line here]\n\
             BODY: [email body here]\n",
            persona = brief.persona,
            name = lead.contact,
            role = lead.title.as_deref().unwrap_or("N/A"),
            company = lead.company,
            description = lead.description.as_deref().unwrap_or("N/A"),
            news = lead.recent_news.as_deref().unwrap_or("N/A"),
            tone = brief.tone,
        )
    }
}

/// Split a `SUBJECT:` / `BODY:` completion into a draft.
///
/// Without a `BODY:` marker the whole completion is the body; without a
/// subject the template subject for `lead` is used.
pub fn parse_draft(content: &str, lead: &Lead) -> DraftContent {
    let content = content.trim();
    let mut subject = None;
    let mut body = None;

    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("SUBJECT:") {
            subject = Some(rest.trim().to_string()).filter(|s| !s.is_empty());
        } else if let Some(rest) = line.strip_prefix("BODY:") {
            let mut parts = vec![rest.trim()];
            parts.extend(&lines[i + 1..]);
            body = Some(parts.join("\n").trim().to_string()).filter(|b| !b.is_empty());
            break;
        }
    }

    DraftContent {
        subject: subject.unwrap_or_else(|| SyntheticContent::subject_for(lead)),
        body: body.unwrap_or_else(|| content.to_string()),
    }
}

#[async_trait]
impl Capability for OpenAiContent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::ContentGeneration
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn is_available(&self) -> bool {
        self.endpoint.has_key()
    }

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityUnavailable> {
        let kind = self.kind();
        let CapabilityRequest::GenerateMessage(brief) = request else {
            return Err(CapabilityUnavailable::permanent(kind, "openai only serves content generation"));
        };

        let key = self.endpoint.key(kind)?;
        let url = self.endpoint.url(kind, "chat/completions")?;
        debug!(model = %self.model, lead = %brief.lead.id, "generating outreach draft");

        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::prompt(&brief) },
            ],
            "temperature": 0.7,
            "max_tokens": 500,
        });
        let response = send(kind, self.endpoint.client().post(url).bearer_auth(key).json(&payload)).await?;
        let chat: ChatResponse = json(kind, response).await?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CapabilityUnavailable::bad_response(kind, "empty completion"))?;

        Ok(CapabilityResponse::Draft(parse_draft(&content, &brief.lead)))
    }
}
