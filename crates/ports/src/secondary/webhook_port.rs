use std::future::Future;
use std::pin::Pin;

use domain::alert::entity::{AlertPayload, DispatchOutcome};

/// Secondary port for delivering alert payloads to a webhook endpoint.
///
/// Uses `Pin<Box<dyn Future>>` (instead of RPITIT) so the trait is
/// dyn-compatible and the orchestrator can hold `Arc<dyn WebhookPort>`.
pub trait WebhookPort: Send + Sync {
    /// Deliver `payload` to `url`, with the adapter's retry policy.
    ///
    /// `None` means the rule has no webhook configured; implementations
    /// must return `DispatchOutcome::Skipped` without side effects.
    /// Delivery failures are values, not errors: the caller aggregates
    /// them per cycle instead of propagating.
    fn dispatch<'a>(
        &'a self,
        url: Option<&'a str>,
        payload: &'a AlertPayload,
    ) -> Pin<Box<dyn Future<Output = DispatchOutcome> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::hazard::entity::{HazardRecord, HazardType, SeverityValue};
    use std::collections::BTreeMap;

    struct SkippingPort;

    impl WebhookPort for SkippingPort {
        fn dispatch<'a>(
            &'a self,
            url: Option<&'a str>,
            _payload: &'a AlertPayload,
        ) -> Pin<Box<dyn Future<Output = DispatchOutcome> + Send + 'a>> {
            Box::pin(async move {
                match url {
                    Some(_) => DispatchOutcome::Delivered { attempts: 1 },
                    None => DispatchOutcome::Skipped,
                }
            })
        }
    }

    fn payload() -> AlertPayload {
        AlertPayload::from_record(&HazardRecord {
            hazard_type: HazardType::Earthquake,
            identifier: "us7000abcd".to_string(),
            severity: SeverityValue::Scalar(7.2),
            location: Some("Mexico".to_string()),
            observed_at: "2025-03-01T12:00:00Z".to_string(),
            raw_attributes: BTreeMap::new(),
        })
    }

    #[test]
    fn webhook_port_is_dyn_compatible() {
        let port: Box<dyn WebhookPort> = Box::new(SkippingPort);
        let _ = port;
    }

    #[test]
    fn webhook_port_impls_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SkippingPort>();
    }

    #[test]
    fn dispatch_future_is_send() {
        fn assert_send<T: Send>(_t: T) {}
        let port = SkippingPort;
        let payload = payload();
        assert_send(port.dispatch(Some("https://x/y"), &payload));
    }
}
