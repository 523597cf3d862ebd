//! HTTP health probe with Docker `HEALTHCHECK` semantics.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodic probe definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Time between probes.
    #[serde(rename = "interval_secs", with = "duration_secs")]
    pub interval: Duration,

    /// Time a single probe may take.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,

    /// Grace period after start during which failures are not counted.
    #[serde(rename = "start_period_secs", with = "duration_secs")]
    pub start_period: Duration,

    /// Consecutive failures that mark the target unhealthy.
    pub retries: u32,

    /// URL probed with a GET request.
    pub url: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            start_period: Duration::from_secs(5),
            retries: 3,
            url: "http://localhost:5000/health".to_owned(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Health as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No successful probe yet.
    Starting,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Tracks consecutive probe failures.
///
/// Failures inside the start period are ignored while the target has not
/// yet reported healthy. Any success resets the failure count.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    retries: u32,
    start_period: Duration,
    consecutive_failures: u32,
    status: HealthStatus,
}

impl HealthTracker {
    /// Creates a tracker for the given probe definition.
    #[must_use]
    pub fn new(check: &HealthCheck) -> Self {
        Self {
            retries: check.retries.max(1),
            start_period: check.start_period,
            consecutive_failures: 0,
            status: HealthStatus::Starting,
        }
    }

    /// Records a probe result taken `elapsed` after the target started.
    pub fn record(&mut self, success: bool, elapsed: Duration) -> HealthStatus {
        if success {
            self.consecutive_failures = 0;
            self.status = HealthStatus::Healthy;
        } else if self.status == HealthStatus::Starting && elapsed < self.start_period {
            debug!("Probe failed during start period, not counted");
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.retries {
                self.status = HealthStatus::Unhealthy;
            }
        }
        self.status
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Reasons a single probe fails.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Probe returned status {0}")]
    Status(StatusCode),
}

/// Issues one GET to the probe URL.
///
/// # Errors
///
/// Returns an error on timeout, transport failure or a non-2xx status.
pub async fn probe_once(client: &Client, check: &HealthCheck) -> Result<(), ProbeError> {
    let response = tokio::time::timeout(check.timeout, client.get(&check.url).send())
        .await
        .map_err(|_| ProbeError::Timeout(check.timeout))??;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status(response.status()))
    }
}

/// Probes on the configured interval until the target turns unhealthy or
/// `shutdown` completes. Returns the last status.
pub async fn run_probe<F>(client: &Client, check: &HealthCheck, shutdown: F) -> HealthStatus
where
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let mut tracker = HealthTracker::new(check);
    let mut ticker = tokio::time::interval(check.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut shutdown = std::pin::pin!(shutdown);

    info!(
        "Probing {} every {:?} (timeout {:?}, retries {})",
        check.url, check.interval, check.timeout, check.retries
    );

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Probe stopped, last status: {}", tracker.status());
                return tracker.status();
            }
            _ = ticker.tick() => {
                let previous = tracker.status();
                let result = probe_once(client, check).await;
                if let Err(e) = &result {
                    warn!("Health probe failed: {}", e);
                }

                let status = tracker.record(result.is_ok(), started.elapsed());
                if status != previous {
                    info!("Health status changed: {} -> {}", previous, status);
                }
                if status == HealthStatus::Unhealthy {
                    return status;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;

    use super::*;

    fn check(url: String) -> HealthCheck {
        HealthCheck {
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(1),
            start_period: Duration::ZERO,
            retries: 3,
            url,
        }
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_unhealthy_after_exactly_three_failures() {
        let mut tracker = HealthTracker::new(&HealthCheck::default());
        let later = Duration::from_secs(60);

        assert_eq!(tracker.record(true, later), HealthStatus::Healthy);
        assert_eq!(tracker.record(false, later), HealthStatus::Healthy);
        assert_eq!(tracker.record(false, later), HealthStatus::Healthy);
        assert_eq!(tracker.record(false, later), HealthStatus::Unhealthy);
        assert_eq!(tracker.consecutive_failures(), 3);
    }

    #[test]
    fn test_success_resets_failures() {
        let mut tracker = HealthTracker::new(&HealthCheck::default());
        let later = Duration::from_secs(60);

        tracker.record(false, later);
        tracker.record(false, later);
        tracker.record(true, later);
        assert_eq!(tracker.consecutive_failures(), 0);

        tracker.record(false, later);
        tracker.record(false, later);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_start_period_failures_not_counted() {
        let mut tracker = HealthTracker::new(&HealthCheck::default());

        for _ in 0..5 {
            assert_eq!(
                tracker.record(false, Duration::from_secs(1)),
                HealthStatus::Starting
            );
        }
        assert_eq!(tracker.consecutive_failures(), 0);

        tracker.record(false, Duration::from_secs(6));
        tracker.record(false, Duration::from_secs(36));
        assert_eq!(
            tracker.record(false, Duration::from_secs(66)),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_unhealthy_recovers_on_success() {
        let mut tracker = HealthTracker::new(&HealthCheck::default());
        let later = Duration::from_secs(60);
        for _ in 0..3 {
            tracker.record(false, later);
        }
        assert_eq!(tracker.status(), HealthStatus::Unhealthy);
        assert_eq!(tracker.record(true, later), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_check_json() {
        let json = r#"{"interval_secs":30,"timeout_secs":10,"start_period_secs":5,"retries":3,"url":"http://localhost:5000/health"}"#;
        let parsed: HealthCheck = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, HealthCheck::default());
    }

    #[tokio::test]
    async fn test_probe_once_against_health_router() {
        let addr = serve(crate::health::router()).await;
        let client = Client::new();

        assert!(probe_once(&client, &check(format!("http://{addr}/health"))).await.is_ok());

        let err = probe_once(&client, &check(format!("http://{addr}/missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Status(s) if s == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = probe_once(&Client::new(), &check(format!("http://{addr}/health")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[tokio::test]
    async fn test_run_probe_stops_after_three_consecutive_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/health",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    // First probe succeeds, every later one fails.
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        AxumStatus::OK
                    } else {
                        AxumStatus::SERVICE_UNAVAILABLE
                    }
                }),
            )
            .with_state(Arc::clone(&hits));
        let addr = serve(router).await;

        let status = run_probe(
            &Client::new(),
            &check(format!("http://{addr}/health")),
            std::future::pending(),
        )
        .await;

        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_probe_honours_shutdown() {
        let addr = serve(crate::health::router()).await;

        let status = run_probe(
            &Client::new(),
            &check(format!("http://{addr}/health")),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;

        assert_eq!(status, HealthStatus::Healthy);
    }
}
