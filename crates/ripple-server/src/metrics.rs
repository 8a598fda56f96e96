//! Metrics collection and export for Ripple.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use ripple_core::{CloseReason, ExitReason, SessionReport};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "ripple_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "ripple_sessions_active";
    pub const SESSIONS_PENDING: &str = "ripple_sessions_pending";
    pub const SESSION_SECONDS: &str = "ripple_session_seconds";
    pub const FRAMES_TOTAL: &str = "ripple_frames_total";
    pub const FRAME_BYTES: &str = "ripple_frame_bytes";
    pub const OVERLOADS_TOTAL: &str = "ripple_overloads_total";
    pub const ERRORS_TOTAL: &str = "ripple_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of sessions connected since server start"
    );
    metrics::describe_gauge!(
        names::SESSIONS_ACTIVE,
        "Current number of sessions with a live transport"
    );
    metrics::describe_gauge!(
        names::SESSIONS_PENDING,
        "Rendered sessions still waiting for their transport"
    );
    metrics::describe_histogram!(names::SESSION_SECONDS, "Session lifetime in seconds");
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames moved");
    metrics::describe_counter!(names::FRAME_BYTES, "Total bytes of frames moved");
    metrics::describe_counter!(
        names::OVERLOADS_TOTAL,
        "Sessions terminated because a queue was full"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a session whose transport connected.
pub fn record_session_open() {
    counter!(names::SESSIONS_TOTAL).increment(1);
    gauge!(names::SESSIONS_ACTIVE).increment(1.0);
}

/// Record a session whose transport went away.
pub fn record_session_close() {
    gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
}

/// Update the pending session count.
pub fn set_pending_sessions(count: usize) {
    gauge!(names::SESSIONS_PENDING).set(count as f64);
}

/// Record frames moved in one direction.
pub fn record_frames(direction: &'static str, frames: u64, bytes: u64) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(frames);
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Record the outcome of a served session.
pub fn record_report(report: &SessionReport, lifetime: Duration) {
    record_frames("in", report.received.frames, report.received.bytes);
    record_frames("out", report.sent.frames, report.sent.bytes);
    histogram!(names::SESSION_SECONDS).record(lifetime.as_secs_f64());

    if let ExitReason::Overload(queue) = report.exit {
        counter!(names::OVERLOADS_TOTAL, "queue" => queue.as_str()).increment(1);
    }
    if let Some(CloseReason::Transport(_)) = report.close_reason {
        record_error("transport");
    }
}

/// Metrics guard that records the session close on drop.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session open.
    #[must_use]
    pub fn new() -> Self {
        record_session_open();
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        record_session_close();
    }
}
