//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: FIX messages sent and received per session and type
//! - **Sessions**: logged-on state, reconnect attempts, gap fills
//! - **Sequencing**: outbound sequence persist failures
//! - **Pricing**: price entries stored and entries dropped
//! - **Executions**: execution report events by kind
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "venue_engine_messages_sent_total",
        "FIX messages written to the venue"
    );
    describe_counter!(
        "venue_engine_messages_received_total",
        "FIX messages received from the venue"
    );
    describe_counter!(
        "venue_engine_malformed_frames_total",
        "Inbound frames dropped as malformed"
    );
    describe_counter!(
        "venue_engine_unhandled_messages_total",
        "Inbound messages with no handler"
    );

    describe_gauge!(
        "venue_engine_session_logged_on",
        "1 while the session is logged on"
    );
    describe_counter!(
        "venue_engine_reconnects_total",
        "Reconnect attempts after an unsolicited disconnect"
    );
    describe_counter!(
        "venue_engine_disconnects_total",
        "Unsolicited disconnects"
    );
    describe_counter!(
        "venue_engine_gap_fills_total",
        "GapFill messages sent in answer to ResendRequest"
    );
    describe_counter!(
        "venue_engine_sequence_persist_failures_total",
        "Sends aborted because the sequence counter could not be stored"
    );

    describe_counter!(
        "venue_engine_price_updates_total",
        "Price entries written to the price store"
    );
    describe_counter!(
        "venue_engine_price_entries_dropped_total",
        "Price entries skipped as invalid or incomplete"
    );
    describe_counter!(
        "venue_engine_execution_events_total",
        "Execution report events dispatched"
    );
    describe_gauge!(
        "venue_engine_outstanding_requests",
        "Entries in the correlation registry"
    );

    describe_histogram!(
        "venue_engine_dispatch_seconds",
        "Time to dispatch one inbound message"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an outbound message.
pub fn record_message_sent(session: &str, msg_type: &'static str) {
    counter!(
        "venue_engine_messages_sent_total",
        "session" => session.to_string(),
        "message_type" => msg_type
    )
    .increment(1);
}

/// Record an inbound message.
pub fn record_message_received(session: &str, msg_type: &'static str) {
    counter!(
        "venue_engine_messages_received_total",
        "session" => session.to_string(),
        "message_type" => msg_type
    )
    .increment(1);
}

/// Record a malformed inbound frame.
pub fn record_malformed_frame() {
    counter!("venue_engine_malformed_frames_total").increment(1);
}

/// Record an inbound message no handler accepted.
pub fn record_unhandled_message(msg_type: &str) {
    counter!(
        "venue_engine_unhandled_messages_total",
        "message_type" => msg_type.to_string()
    )
    .increment(1);
}

/// Set the logged-on gauge for a session.
pub fn set_session_logged_on(session: &str, logged_on: bool) {
    gauge!(
        "venue_engine_session_logged_on",
        "session" => session.to_string()
    )
    .set(if logged_on { 1.0 } else { 0.0 });
}

/// Record a reconnect attempt.
pub fn record_reconnect(session: &str) {
    counter!(
        "venue_engine_reconnects_total",
        "session" => session.to_string()
    )
    .increment(1);
}

/// Record an unsolicited disconnect.
pub fn record_disconnect(session: &str) {
    counter!(
        "venue_engine_disconnects_total",
        "session" => session.to_string()
    )
    .increment(1);
}

/// Record a GapFill sent.
pub fn record_gap_fill(session: &str) {
    counter!(
        "venue_engine_gap_fills_total",
        "session" => session.to_string()
    )
    .increment(1);
}

/// Record a failed sequence persist.
pub fn record_sequence_persist_failure(session: &str) {
    counter!(
        "venue_engine_sequence_persist_failures_total",
        "session" => session.to_string()
    )
    .increment(1);
}

/// Record a stored price entry.
pub fn record_price_update(instrument_type: &'static str) {
    counter!(
        "venue_engine_price_updates_total",
        "instrument_type" => instrument_type
    )
    .increment(1);
}

/// Record a skipped price entry.
pub fn record_price_entry_dropped(reason: &'static str) {
    counter!(
        "venue_engine_price_entries_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record an execution report event.
pub fn record_execution_event(kind: &'static str) {
    counter!(
        "venue_engine_execution_events_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the correlation registry size.
#[allow(clippy::cast_precision_loss)]
pub fn set_outstanding_requests(count: usize) {
    gauge!("venue_engine_outstanding_requests").set(count as f64);
}

/// Record inbound dispatch duration.
pub fn record_dispatch_duration(msg_type: &'static str, duration: Duration) {
    histogram!(
        "venue_engine_dispatch_seconds",
        "message_type" => msg_type
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
