use leadflow_shared::{CapabilityKind, LeadflowError};

/// A capability could not serve a call.
///
/// `retryable` marks transient failures (timeouts, rate limits, 5xx,
/// connection errors) that are worth another attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("capability `{capability}` unavailable: {reason}")]
pub struct CapabilityUnavailable {
    pub capability: CapabilityKind,
    pub reason: String,
    pub retryable: bool,
}

impl CapabilityUnavailable {
    pub fn transient(capability: CapabilityKind, reason: impl Into<String>) -> Self {
        Self {
            capability,
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn permanent(capability: CapabilityKind, reason: impl Into<String>) -> Self {
        Self {
            capability,
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Classify an HTTP status returned by a provider.
    pub fn from_status(capability: CapabilityKind, status: reqwest::StatusCode) -> Self {
        let reason = format!("HTTP {status}");
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::transient(capability, reason)
        } else {
            Self::permanent(capability, reason)
        }
    }

    /// Classify a transport-level error.
    pub fn from_reqwest(capability: CapabilityKind, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(capability, status);
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transient(capability, err.to_string())
        } else {
            Self::permanent(capability, err.to_string())
        }
    }

    /// A well-formed response that could not be understood.
    pub fn bad_response(capability: CapabilityKind, detail: impl std::fmt::Display) -> Self {
        Self::permanent(capability, format!("unexpected response: {detail}"))
    }
}

impl From<CapabilityUnavailable> for LeadflowError {
    fn from(err: CapabilityUnavailable) -> Self {
        LeadflowError::CapabilityUnavailable {
            capability: err.capability.to_string(),
            reason: err.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_classification() {
        let kind = CapabilityKind::ProspectSearch;
        assert!(CapabilityUnavailable::from_status(kind, StatusCode::TOO_MANY_REQUESTS).retryable);
        assert!(CapabilityUnavailable::from_status(kind, StatusCode::BAD_GATEWAY).retryable);
        assert!(!CapabilityUnavailable::from_status(kind, StatusCode::UNAUTHORIZED).retryable);
        assert!(!CapabilityUnavailable::from_status(kind, StatusCode::NOT_FOUND).retryable);
    }

    #[test]
    fn converts_into_shared_error() {
        let err: LeadflowError =
            CapabilityUnavailable::transient(CapabilityKind::MessageSending, "timeout").into();
        assert_eq!(
            err.to_string(),
            "capability `message_sending` unavailable: timeout"
        );
    }
}
