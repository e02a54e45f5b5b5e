//! Metric helpers for the conversion service.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "exrframe_connections_active";
/// Name of the gauge tracking streaming sessions in progress.
pub const SESSIONS_ACTIVE: &str = "exrframe_sessions_active";
/// Name of the counter tracking streaming frames.
pub const FRAMES_TOTAL: &str = "exrframe_frames_total";
/// Name of the counter tracking failed conversions, labelled by kind.
pub const FAILURES_TOTAL: &str = "exrframe_failures_total";

/// Direction of a streaming frame.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from a client.
    Inbound,
    /// Frames sent to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a streaming frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a failure of the given kind.
pub fn inc_failures(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(FAILURES_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
