//! Health probes and the activity clock.
//!
//! A health ping is answered in two steps: an unconditional ack first, then
//! a pong carrying the probe outcome. The expensive live LLM probe is
//! skipped when the caller asks for it or when the agent has shown
//! non-protocol activity inside the grace window; recent conversation is
//! itself evidence that the model is responsive.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::error::HealthError;
use crate::protocol::{Envelope, HealthAck, HealthPing, HealthPong, ReplySink};
use crate::protocol::{TYPE_HEALTH_ACK, TYPE_HEALTH_PONG};

/// Upper bound on one live LLM probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Latency value reported when the probe was skipped.
const LATENCY_SKIPPED: i64 = -1;

/// Process-wide record of the last non-protocol inbound message.
///
/// Touched by the dispatcher for every message that is not a recognized
/// protocol envelope. Protocol traffic does not count as activity; it says
/// nothing about whether the underlying model is engaged.
#[derive(Clone, Default)]
pub struct ActivityClock {
    last_activity: Arc<RwLock<Option<Instant>>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record non-protocol activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Record non-protocol activity at a specific instant.
    pub fn touch_at(&self, at: Instant) {
        *self.last_activity.write().expect("activity clock lock") = Some(at);
    }

    /// Time since the last non-protocol message, if any was ever seen.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_activity
            .read()
            .expect("activity clock lock")
            .map(|at| at.elapsed())
    }

    /// Whether the agent counts as active within the grace window. The
    /// ACTIVE -> IDLE transition is purely elapsed time, evaluated here at
    /// query time; no background timer exists.
    pub fn is_active(&self, grace_window: Duration) -> bool {
        self.idle_for().is_some_and(|idle| idle < grace_window)
    }
}

/// Live liveness probe against the language model.
#[async_trait::async_trait]
pub trait LlmProbe: Send + Sync {
    async fn probe(&self) -> Result<(), HealthError>;
}

/// Answers health pings for one agent/gateway identity.
pub struct HealthMonitor {
    clock: ActivityClock,
    probe: Arc<dyn LlmProbe>,
    agent_id: String,
    gateway_id: String,
    grace_window: Duration,
    started_at: Instant,
    version: String,
}

impl HealthMonitor {
    pub fn new(
        clock: ActivityClock,
        probe: Arc<dyn LlmProbe>,
        agent_id: String,
        gateway_id: String,
        grace_window: Duration,
        version: String,
    ) -> Self {
        Self {
            clock,
            probe,
            agent_id,
            gateway_id,
            grace_window,
            started_at: Instant::now(),
            version,
        }
    }

    /// Handle one ping: ack immediately, probe if warranted, then pong.
    ///
    /// The ack always goes out before any probing so perceived round-trip
    /// latency stays independent of probe duration. Probe failures are
    /// reported inside the pong, never raised; only a failure to deliver the
    /// ack itself propagates.
    pub async fn handle_ping(
        &self,
        ping: HealthPing,
        reply: &dyn ReplySink,
    ) -> Result<(), crate::error::ProtocolError> {
        let ack = HealthAck {
            request_id: ping.request_id.clone(),
            agent_id: self.agent_id.clone(),
            gateway_id: self.gateway_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        reply.reply(Envelope::new(TYPE_HEALTH_ACK, ack)).await?;

        let skip = ping.skip_llm_test || self.clock.is_active(self.grace_window);
        let (status, llm_status, llm_latency_ms) = if skip {
            ("online", "skipped".to_string(), LATENCY_SKIPPED)
        } else {
            let start = Instant::now();
            let outcome = tokio::time::timeout(PROBE_TIMEOUT, self.probe.probe()).await;
            let latency = start.elapsed().as_millis() as i64;
            match outcome {
                Ok(Ok(())) => ("online", "ok".to_string(), latency),
                Ok(Err(e)) => {
                    tracing::warn!(request_id = %ping.request_id, error = %e, "LLM probe failed");
                    ("unresponsive", e.to_string(), latency)
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %ping.request_id,
                        timeout_secs = PROBE_TIMEOUT.as_secs(),
                        "LLM probe timed out"
                    );
                    (
                        "unresponsive",
                        HealthError::ProbeTimeout {
                            timeout: PROBE_TIMEOUT,
                        }
                        .to_string(),
                        latency,
                    )
                }
            }
        };

        let pong = HealthPong {
            request_id: ping.request_id,
            agent_id: self.agent_id.clone(),
            gateway_id: self.gateway_id.clone(),
            status: status.to_string(),
            llm_status,
            llm_latency_ms,
            load: load_average(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            version: self.version.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        reply.reply(Envelope::new(TYPE_HEALTH_PONG, pong)).await
    }

    pub fn clock(&self) -> &ActivityClock {
        &self.clock
    }
}

/// One-minute load average, best effort. Reports 0.0 where unavailable.
fn load_average() -> f64 {
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| s.split_whitespace().next().map(str::to_string))
        .and_then(|first| first.parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::Mutex;

    use crate::error::ProtocolError;

    /// Captures replies in order for assertions.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait::async_trait]
    impl ReplySink for RecordingSink {
        async fn reply(&self, envelope: Envelope) -> Result<(), ProtocolError> {
            self.sent.lock().await.push(envelope);
            Ok(())
        }
    }

    struct HealthyProbe;

    #[async_trait::async_trait]
    impl LlmProbe for HealthyProbe {
        async fn probe(&self) -> Result<(), HealthError> {
            Ok(())
        }
    }

    struct FailingProbe;

    #[async_trait::async_trait]
    impl LlmProbe for FailingProbe {
        async fn probe(&self) -> Result<(), HealthError> {
            Err(HealthError::ProbeFailed {
                reason: "model unavailable".to_string(),
            })
        }
    }

    fn monitor(clock: ActivityClock, probe: Arc<dyn LlmProbe>) -> HealthMonitor {
        HealthMonitor::new(
            clock,
            probe,
            "@agent:example.org".to_string(),
            "gw-1".to_string(),
            Duration::from_secs(300),
            "0.1.0".to_string(),
        )
    }

    fn ping(request_id: &str, skip: bool) -> HealthPing {
        HealthPing {
            request_id: request_id.to_string(),
            skip_llm_test: skip,
        }
    }

    #[test]
    fn test_clock_idle_without_activity() {
        let clock = ActivityClock::new();
        assert!(clock.idle_for().is_none());
        assert!(!clock.is_active(Duration::from_secs(300)));
    }

    #[test]
    fn test_clock_active_inside_grace_window() {
        let clock = ActivityClock::new();
        clock.touch_at(Instant::now() - Duration::from_secs(120));
        assert!(clock.is_active(Duration::from_secs(300)));
    }

    #[test]
    fn test_clock_idle_after_grace_window() {
        let clock = ActivityClock::new();
        clock.touch_at(Instant::now() - Duration::from_secs(301));
        assert!(!clock.is_active(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_ack_precedes_pong_for_same_request() {
        let sink = RecordingSink::default();
        let mon = monitor(ActivityClock::new(), Arc::new(HealthyProbe));

        mon.handle_ping(ping("r1", true), &sink).await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message_type, TYPE_HEALTH_ACK);
        assert_eq!(sent[0].content["requestId"], "r1");
        assert_eq!(sent[1].message_type, TYPE_HEALTH_PONG);
        assert_eq!(sent[1].content["requestId"], "r1");
    }

    #[tokio::test]
    async fn test_skip_flag_skips_probe() {
        let sink = RecordingSink::default();
        // FailingProbe would flip status if it ran.
        let mon = monitor(ActivityClock::new(), Arc::new(FailingProbe));

        mon.handle_ping(ping("r2", true), &sink).await.unwrap();

        let sent = sink.sent.lock().await;
        let pong = &sent[1].content;
        assert_eq!(pong["status"], "online");
        assert_eq!(pong["llmStatus"], "skipped");
        assert_eq!(pong["llmLatencyMs"], -1);
    }

    #[tokio::test]
    async fn test_recent_activity_skips_probe() {
        let sink = RecordingSink::default();
        let clock = ActivityClock::new();
        clock.touch_at(Instant::now() - Duration::from_secs(120));
        let mon = monitor(clock, Arc::new(FailingProbe));

        mon.handle_ping(ping("r3", false), &sink).await.unwrap();

        let pong = &sink.sent.lock().await[1].content;
        assert_eq!(pong["status"], "online");
        assert_eq!(pong["llmLatencyMs"], -1);
    }

    #[tokio::test]
    async fn test_idle_agent_runs_probe() {
        let sink = RecordingSink::default();
        let mon = monitor(ActivityClock::new(), Arc::new(HealthyProbe));

        mon.handle_ping(ping("r4", false), &sink).await.unwrap();

        let pong = &sink.sent.lock().await[1].content;
        assert_eq!(pong["status"], "online");
        assert_eq!(pong["llmStatus"], "ok");
        assert!(pong["llmLatencyMs"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_probe_failure_reported_in_pong_not_raised() {
        let sink = RecordingSink::default();
        let mon = monitor(ActivityClock::new(), Arc::new(FailingProbe));

        // Handler itself succeeds; the failure lives in the pong.
        mon.handle_ping(ping("r5", false), &sink).await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent[0].message_type, TYPE_HEALTH_ACK);
        let pong = &sent[1].content;
        assert_eq!(pong["status"], "unresponsive");
        assert!(pong["llmStatus"]
            .as_str()
            .unwrap()
            .contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_pong_never_says_offline() {
        let sink = RecordingSink::default();
        let mon = monitor(ActivityClock::new(), Arc::new(FailingProbe));
        mon.handle_ping(ping("r6", false), &sink).await.unwrap();

        let pong = &sink.sent.lock().await[1].content;
        assert_ne!(pong["status"], "offline");
    }

    #[tokio::test]
    async fn test_pong_carries_identity_and_version() {
        let sink = RecordingSink::default();
        let mon = monitor(ActivityClock::new(), Arc::new(HealthyProbe));
        mon.handle_ping(ping("r7", true), &sink).await.unwrap();

        let pong = &sink.sent.lock().await[1].content;
        assert_eq!(pong["agentId"], "@agent:example.org");
        assert_eq!(pong["gatewayId"], "gw-1");
        assert_eq!(pong["version"], "0.1.0");
    }
}
