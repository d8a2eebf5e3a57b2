use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use application::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
use domain::alert::circuit_breaker::CircuitBreaker;
use domain::alert::entity::{AlertPayload, DispatchOutcome};
use domain::alert::error::DispatchError;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::webhook_port::WebhookPort;

const DEFAULT_BREAKER_THRESHOLD: usize = 5;
const DEFAULT_BREAKER_OPEN_PERIOD: Duration = Duration::from_secs(60);

/// Outbound adapter that POSTs alert JSON to webhook URLs.
///
/// Each distinct URL gets its own circuit breaker, so a dead endpoint
/// for one hazard type never throttles deliveries to another. The
/// breaker counts whole dispatches (post-retry), not individual
/// attempts.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    breaker_threshold: usize,
    breaker_open_period: Duration,
    metrics: Arc<dyn MetricsPort>,
}

impl WebhookDispatcher {
    pub fn new(policy: RetryPolicy, metrics: Arc<dyn MetricsPort>) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            sleeper: Arc::new(TokioSleeper),
            breakers: Mutex::new(HashMap::new()),
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_open_period: DEFAULT_BREAKER_OPEN_PERIOD,
            metrics,
        }
    }

    #[must_use]
    pub fn with_breaker(mut self, failure_threshold: usize, open_period: Duration) -> Self {
        self.breaker_threshold = failure_threshold;
        self.breaker_open_period = open_period;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn breaker_allows(&self, url: &str) -> Result<(), DispatchError> {
        let mut breakers = self.breakers.lock().expect("breaker map poisoned");
        let breaker = breakers.entry(url.to_string()).or_insert_with(|| {
            CircuitBreaker::new(self.breaker_threshold, self.breaker_open_period)
        });
        if breaker.allow(Instant::now()) {
            Ok(())
        } else {
            self.metrics
                .record_circuit_state(url, breaker.state().as_u8());
            Err(DispatchError::CircuitOpen {
                destination: url.to_string(),
            })
        }
    }

    fn breaker_record(&self, url: &str, success: bool) {
        let mut breakers = self.breakers.lock().expect("breaker map poisoned");
        if let Some(breaker) = breakers.get_mut(url) {
            if success {
                breaker.on_success();
            } else {
                breaker.on_failure(Instant::now());
            }
            self.metrics
                .record_circuit_state(url, breaker.state().as_u8());
        }
    }
}

impl WebhookPort for WebhookDispatcher {
    fn dispatch<'a>(
        &'a self,
        url: Option<&'a str>,
        payload: &'a AlertPayload,
    ) -> Pin<Box<dyn Future<Output = DispatchOutcome> + Send + 'a>> {
        Box::pin(async move {
            let Some(url) = url else {
                return DispatchOutcome::Skipped;
            };

            if let Err(e) = self.breaker_allows(url) {
                self.metrics.record_dispatch_failed(e.kind_label());
                return DispatchOutcome::Failed {
                    reason: e.to_string(),
                    attempts: 0,
                };
            }

            let body = match serde_json::to_string(payload) {
                Ok(body) => body,
                Err(e) => {
                    let e = DispatchError::Serialize(e.to_string());
                    self.metrics.record_dispatch_failed(e.kind_label());
                    return DispatchOutcome::Failed {
                        reason: e.to_string(),
                        attempts: 0,
                    };
                }
            };

            // Jitter seed derived from the URL so concurrent dispatches
            // to different endpoints desynchronize their retries.
            let mut hasher = DefaultHasher::new();
            url.hash(&mut hasher);
            let seed = hasher.finish();

            let started = Instant::now();
            let result = retry_with_backoff(&self.policy, self.sleeper.as_ref(), seed, || {
                post_once(&self.client, url, &body)
            })
            .await;
            self.metrics
                .observe_dispatch_duration(started.elapsed().as_secs_f64());

            match result {
                Ok(((), attempts)) => {
                    self.breaker_record(url, true);
                    DispatchOutcome::Delivered { attempts }
                }
                Err((e, attempts)) => {
                    self.breaker_record(url, false);
                    self.metrics.record_dispatch_failed(e.kind_label());
                    tracing::warn!(url, attempts, error = %e, "webhook dispatch failed");
                    DispatchOutcome::Failed {
                        reason: e.to_string(),
                        attempts,
                    }
                }
            }
        })
    }
}

async fn post_once(client: &reqwest::Client, url: &str, body: &str) -> Result<(), DispatchError> {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout
            } else {
                DispatchError::Connect(e.to_string())
            }
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(DispatchError::RateLimited { retry_after });
    }
    Err(DispatchError::Status {
        code: status.as_u16(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::hazard::entity::{HazardRecord, HazardType, SeverityValue};
    use ports::secondary::metrics_port::{AlertMetrics, ConfigMetrics, NoopMetrics};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const ERR_500: &str =
        "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const RATE_LIMITED: &str =
        "HTTP/1.1 429 Too Many Requests\r\nretry-after: 2\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    /// Minimal HTTP server: serves one canned response per connection,
    /// in order, then stops accepting.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicU32>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (format!("http://{addr}/hook"), hits)
    }

    /// Sleeper that records requested delays and returns immediately.
    #[derive(Default)]
    struct InstantSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for InstantSleeper {
        fn sleep<'a>(
            &'a self,
            duration: Duration,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            self.delays.lock().unwrap().push(duration);
            Box::pin(std::future::ready(()))
        }
    }

    #[derive(Default)]
    struct TestMetrics {
        circuit_state_calls: AtomicU32,
        durations_observed: AtomicU32,
    }

    impl AlertMetrics for TestMetrics {
        fn record_circuit_state(&self, _destination: &str, _state: u8) {
            self.circuit_state_calls.fetch_add(1, Ordering::Relaxed);
        }
        fn observe_dispatch_duration(&self, _seconds: f64) {
            self.durations_observed.fetch_add(1, Ordering::Relaxed);
        }
    }
    impl ConfigMetrics for TestMetrics {}

    fn sample_payload() -> AlertPayload {
        AlertPayload::from_record(&HazardRecord {
            hazard_type: HazardType::Earthquake,
            identifier: "us7000abcd".to_string(),
            severity: SeverityValue::Scalar(7.2),
            location: Some("Mexico".to_string()),
            observed_at: "2025-03-01T12:00:00Z".to_string(),
            raw_attributes: BTreeMap::new(),
        })
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(2),
        }
    }

    fn dispatcher(policy: RetryPolicy) -> (WebhookDispatcher, Arc<InstantSleeper>) {
        let sleeper = Arc::new(InstantSleeper::default());
        let dispatcher = WebhookDispatcher::new(policy, Arc::new(NoopMetrics))
            .with_sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>);
        (dispatcher, sleeper)
    }

    #[tokio::test]
    async fn delivered_on_first_success() {
        let (url, hits) = serve(vec![OK]).await;
        let (dispatcher, _) = dispatcher(fast_policy());

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_exhaust_every_attempt() {
        let (url, hits) = serve(vec![ERR_500, ERR_500, ERR_500]).await;
        let (dispatcher, _) = dispatcher(fast_policy());

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        match outcome {
            DispatchOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("500"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_error_stops_after_one_attempt() {
        let (url, hits) = serve(vec![NOT_FOUND]).await;
        let (dispatcher, _) = dispatcher(fast_policy());

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        match outcome {
            DispatchOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts, 1);
                assert!(reason.contains("404"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_server_error() {
        let (url, hits) = serve(vec![ERR_500, OK]).await;
        let (dispatcher, _) = dispatcher(fast_policy());

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 2 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_drives_backoff_clamped() {
        let (url, _) = serve(vec![RATE_LIMITED, OK]).await;
        let (dispatcher, sleeper) = dispatcher(fast_policy());

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 2 });

        // Retry-After said 2s; max_backoff clamps it to 5ms.
        let delays = sleeper.delays.lock().unwrap().clone();
        assert_eq!(delays, vec![Duration::from_millis(5)]);
    }

    #[tokio::test]
    async fn missing_url_is_skipped() {
        let (dispatcher, _) = dispatcher(fast_policy());
        let outcome = dispatcher.dispatch(None, &sample_payload()).await;
        assert_eq!(outcome, DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn connection_refused_retries_then_fails() {
        let (dispatcher, _) = dispatcher(fast_policy());

        let outcome = dispatcher
            .dispatch(Some("http://127.0.0.1:1/unreachable"), &sample_payload())
            .await;
        match outcome {
            DispatchOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("connection failed"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn breaker_opens_and_blocks_without_attempting() {
        let sleeper = Arc::new(InstantSleeper::default());
        let dispatcher = WebhookDispatcher::new(fast_policy(), Arc::new(NoopMetrics))
            .with_sleeper(sleeper as Arc<dyn Sleeper>)
            .with_breaker(1, Duration::from_secs(60));

        let url = "http://127.0.0.1:1/unreachable";

        // First dispatch exhausts its retries and trips the breaker.
        let first = dispatcher.dispatch(Some(url), &sample_payload()).await;
        assert!(matches!(
            first,
            DispatchOutcome::Failed { attempts: 3, .. }
        ));

        // Second dispatch is rejected before any network attempt.
        let second = dispatcher.dispatch(Some(url), &sample_payload()).await;
        match second {
            DispatchOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts, 0);
                assert!(reason.contains("circuit breaker open"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn breakers_are_per_destination() {
        let (good_url, _) = serve(vec![OK]).await;
        let sleeper = Arc::new(InstantSleeper::default());
        let dispatcher = WebhookDispatcher::new(fast_policy(), Arc::new(NoopMetrics))
            .with_sleeper(sleeper as Arc<dyn Sleeper>)
            .with_breaker(1, Duration::from_secs(60));

        let _ = dispatcher
            .dispatch(Some("http://127.0.0.1:1/unreachable"), &sample_payload())
            .await;

        // Tripped breaker on the dead endpoint leaves this one untouched.
        let outcome = dispatcher.dispatch(Some(&good_url), &sample_payload()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 1 });
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_retryable() {
        // Accept connections but never respond.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let policy = RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(50),
            ..fast_policy()
        };
        let (dispatcher, _) = dispatcher(policy);

        let outcome = dispatcher.dispatch(Some(&url), &sample_payload()).await;
        match outcome {
            DispatchOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("timed out"), "got: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn metrics_updated_on_dispatch() {
        let (url, _) = serve(vec![OK]).await;
        let metrics = Arc::new(TestMetrics::default());
        let dispatcher = WebhookDispatcher::new(fast_policy(), Arc::clone(&metrics) as _)
            .with_sleeper(Arc::new(InstantSleeper::default()) as Arc<dyn Sleeper>);

        let _ = dispatcher.dispatch(Some(&url), &sample_payload()).await;

        assert!(metrics.circuit_state_calls.load(Ordering::Relaxed) >= 1);
        assert_eq!(metrics.durations_observed.load(Ordering::Relaxed), 1);
    }
}
