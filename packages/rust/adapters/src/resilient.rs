//! Retry + fallback decorator around a live adapter.

use std::sync::Arc;

use tracing::{debug, warn};

use leadflow_shared::{CapabilityKind, RetryPolicy};

use crate::{
    Capability, CapabilityRequest, CapabilityResponse, CapabilityUnavailable, Served,
};

/// Wraps a live adapter with per-call timeouts, bounded retries with
/// exponential backoff, and a per-call fallback adapter.
///
/// Transient failures are retried up to `policy.max_attempts` times. Once the
/// attempts are spent, or on a permanent failure, that single call is served
/// by the fallback. The next call tries the live adapter again.
pub struct Resilient {
    live: Arc<dyn Capability>,
    fallback: Option<Arc<dyn Capability>>,
    policy: RetryPolicy,
}

impl Resilient {
    pub fn new(
        live: Arc<dyn Capability>,
        fallback: Option<Arc<dyn Capability>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            live,
            fallback,
            policy,
        }
    }

    /// Serve a request, reporting whether the live adapter or the fallback answered.
    pub async fn serve(
        &self,
        request: CapabilityRequest,
    ) -> Result<Served<CapabilityResponse>, CapabilityUnavailable> {
        let kind = self.live.kind();
        let mut attempts = 0u32;

        let failure = loop {
            attempts += 1;
            let outcome =
                match tokio::time::timeout(self.policy.call_timeout, self.live.invoke(request.clone()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(CapabilityUnavailable::transient(
                        kind,
                        format!("timed out after {:?}", self.policy.call_timeout),
                    )),
                };

            match outcome {
                Ok(response) => return Ok(Served::live(response, attempts)),
                Err(err) if err.retryable && attempts < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempts);
                    debug!(
                        capability = %kind,
                        adapter = self.live.name(),
                        attempt = attempts,
                        ?delay,
                        reason = %err.reason,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break err,
            }
        };

        let Some(fallback) = &self.fallback else {
            return Err(failure);
        };
        warn!(
            capability = %kind,
            adapter = self.live.name(),
            fallback = fallback.name(),
            attempts,
            reason = %failure.reason,
            "live call failed, serving from fallback"
        );
        let response = fallback.invoke(request).await?;
        Ok(Served::fallback(response, attempts, failure.reason))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::ServedBy;
    use crate::synthetic::SyntheticEngagement;
    use chrono::Utc;
    use leadflow_shared::{DeliveryStatus, Engagement, SendReceipt};

    /// Fails `failures` times with the given retryability, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        retryable: bool,
        delay: Option<Duration>,
    }

    impl Flaky {
        fn new(failures: u32, retryable: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                retryable,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Capability for Flaky {
        fn kind(&self) -> CapabilityKind {
            CapabilityKind::EngagementTracking
        }

        fn name(&self) -> &str {
            "flaky"
        }

        async fn invoke(
            &self,
            request: CapabilityRequest,
        ) -> Result<CapabilityResponse, CapabilityUnavailable> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if call < self.failures {
                return Err(CapabilityUnavailable {
                    capability: self.kind(),
                    reason: "HTTP 503".into(),
                    retryable: self.retryable,
                });
            }
            let CapabilityRequest::FetchEngagement(receipt) = request else {
                unreachable!("tests only send engagement requests");
            };
            Ok(CapabilityResponse::Engagement(Engagement {
                lead_id: receipt.lead_id,
                email: receipt.email,
                company: receipt.company,
                opened: true,
                clicked: true,
                replied: true,
                meeting_booked: true,
                reply_content: None,
            }))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            call_timeout: Duration::from_millis(200),
        }
    }

    fn request() -> CapabilityRequest {
        CapabilityRequest::FetchEngagement(SendReceipt {
            lead_id: "lead-001".into(),
            email: Some("jane@acme.io".into()),
            company: "Acme".into(),
            status: DeliveryStatus::Simulated,
            message_id: Some("sim_000000000001".into()),
            error: None,
            timestamp: Utc::now(),
        })
    }

    fn resilient(live: Arc<Flaky>) -> Resilient {
        Resilient::new(live, Some(Arc::new(SyntheticEngagement)), policy())
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let live = Arc::new(Flaky::new(2, true));
        let served = resilient(live.clone()).serve(request()).await.unwrap();
        assert_eq!(served.served_by, ServedBy::Live);
        assert_eq!(served.attempts, 3);
        assert_eq!(live.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back() {
        let live = Arc::new(Flaky::new(10, true));
        let served = resilient(live.clone()).serve(request()).await.unwrap();
        assert_eq!(served.served_by, ServedBy::Fallback);
        assert_eq!(served.attempts, 3);
        assert_eq!(served.fallback_reason.as_deref(), Some("HTTP 503"));
        assert_eq!(live.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_falls_back_immediately() {
        let live = Arc::new(Flaky::new(1, false));
        let served = resilient(live.clone()).serve(request()).await.unwrap();
        assert_eq!(served.served_by, ServedBy::Fallback);
        assert_eq!(live.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let live = Arc::new(Flaky {
            delay: Some(Duration::from_secs(5)),
            ..Flaky::new(0, true)
        });
        let served = resilient(live.clone()).serve(request()).await.unwrap();
        assert_eq!(served.served_by, ServedBy::Fallback);
        assert!(served.fallback_reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn without_fallback_the_error_surfaces() {
        let live = Arc::new(Flaky::new(10, false));
        let err = Resilient::new(live, None, policy())
            .serve(request())
            .await
            .unwrap_err();
        assert_eq!(err.reason, "HTTP 503");
    }
}
