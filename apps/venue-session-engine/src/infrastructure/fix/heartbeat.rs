//! Heartbeat Manager
//!
//! Drives the session's Heartbeat ticker and watches inbound liveness.
//!
//! Every interval the manager asks the session to send a Heartbeat (35=0).
//! When nothing has arrived for one interval plus grace it asks for a
//! TestRequest (35=1); if the line is still silent a further interval later
//! it reports a timeout and the session reconnects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ticker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// HeartBtInt (108) negotiated at logon.
    pub interval: Duration,
    /// Slack allowed for network delay before probing.
    pub grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HeartbeatConfig {
    /// Config for the given interval, grace of one fifth of it.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            grace: match interval.checked_div(5) {
                Some(grace) => grace,
                None => Duration::ZERO,
            },
        }
    }
}

/// Requests emitted to the session's receive task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a Heartbeat.
    SendHeartbeat,
    /// Send a TestRequest with this TestReqID.
    SendTestRequest(String),
    /// Counterparty went silent; tear the connection down.
    Timeout,
}

#[derive(Debug)]
struct Liveness {
    last_inbound: Instant,
    pending_test_request: Option<String>,
}

/// Inbound liveness shared between the receive task and the manager.
#[derive(Debug)]
pub struct HeartbeatState {
    inner: RwLock<Liveness>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Fresh state, as if a message had just arrived.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Liveness {
                last_inbound: Instant::now(),
                pending_test_request: None,
            }),
        }
    }

    /// Any inbound message proves the line is alive.
    pub fn record_inbound(&self) {
        let mut inner = self.inner.write();
        inner.last_inbound = Instant::now();
        inner.pending_test_request = None;
    }

    /// Remember an outstanding TestRequest.
    pub fn mark_test_request_sent(&self, test_req_id: impl Into<String>) {
        self.inner.write().pending_test_request = Some(test_req_id.into());
    }

    /// TestReqID awaiting an answer, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<String> {
        self.inner.read().pending_test_request.clone()
    }

    /// Time since the last inbound message.
    #[must_use]
    pub fn time_since_inbound(&self) -> Duration {
        self.inner.read().last_inbound.elapsed()
    }

    /// Reset for a new connection.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.last_inbound = Instant::now();
        inner.pending_test_request = None;
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        let mut inner = self.inner.write();
        if let Some(earlier) = inner.last_inbound.checked_sub(by) {
            inner.last_inbound = earlier;
        }
    }
}

/// Per-connection heartbeat ticker.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a manager; spawn [`Self::run`] to start it.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Tick until cancelled, the event channel closes, or a timeout fires.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.tick().await {
                        break;
                    }
                }
            }
        }
    }

    /// One tick. Returns `false` when the loop should stop.
    async fn tick(&self) -> bool {
        let silent_for = self.state.time_since_inbound();
        let probe_after = self.config.interval + self.config.grace;

        if self.state.pending_test_request().is_some() && silent_for > probe_after + self.config.interval {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                interval_secs = self.config.interval.as_secs(),
                "TestRequest unanswered, declaring connection dead"
            );
            let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
            return false;
        }

        if self.state.pending_test_request().is_none() && silent_for > probe_after {
            let test_req_id = format!("TEST-{}", chrono::Utc::now().timestamp_millis());
            self.state.mark_test_request_sent(test_req_id.clone());
            tracing::info!(
                test_req_id = %test_req_id,
                silent_secs = silent_for.as_secs(),
                "No inbound traffic, probing with TestRequest"
            );
            if self.event_tx.send(HeartbeatEvent::SendTestRequest(test_req_id)).await.is_err() {
                return false;
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendHeartbeat).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return false;
        }
        true
    }
}
