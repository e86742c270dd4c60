//! Handshake metrics.
//!
//! Aggregate counters only; nothing here identifies a client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::Error;

/// Server metrics collector.
pub struct ServerMetrics {
    start_time: Instant,
    accepted: AtomicU64,
    active: AtomicU64,
    established: AtomicU64,
    bad_client_hello: AtomicU64,
    not_cloak: AtomicU64,
    bad_proxy_method: AtomicU64,
    first_packet_timeouts: AtomicU64,
    reply_failures: AtomicU64,
}

impl ServerMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            accepted: AtomicU64::new(0),
            active: AtomicU64::new(0),
            established: AtomicU64::new(0),
            bad_client_hello: AtomicU64::new(0),
            not_cloak: AtomicU64::new(0),
            bad_proxy_method: AtomicU64::new(0),
            first_packet_timeouts: AtomicU64::new(0),
            reply_failures: AtomicU64::new(0),
        }
    }

    /// Increment accepted and active connections.
    pub fn increment_connections(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn decrement_connections(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A reply went out and the session was handed on.
    pub fn increment_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
    }

    /// The client never finished sending its first packet.
    pub fn increment_first_packet_timeouts(&self) {
        self.first_packet_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Writing the reply failed.
    pub fn increment_reply_failures(&self) {
        self.reply_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a handshake rejection by kind. Other errors are ignored.
    pub fn record_rejection(&self, err: &Error) {
        let counter = match err {
            Error::BadClientHello => &self.bad_client_hello,
            Error::NotCloak => &self.not_cloak,
            Error::BadProxyMethod => &self.bad_proxy_method,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get accepted connections.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Get active connections.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Get established sessions.
    pub fn established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            accepted: self.accepted(),
            active: self.active(),
            established: self.established(),
            bad_client_hello: self.bad_client_hello.load(Ordering::Relaxed),
            not_cloak: self.not_cloak.load(Ordering::Relaxed),
            bad_proxy_method: self.bad_proxy_method.load(Ordering::Relaxed),
            first_packet_timeouts: self.first_packet_timeouts.load(Ordering::Relaxed),
            reply_failures: self.reply_failures.load(Ordering::Relaxed),
        }
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        let snapshot = self.snapshot();

        format!(
            r#"Cloak Handshake Metrics
=======================
Uptime: {} seconds

Connections:
  Accepted:    {}
  Active:      {}
  Established: {}

Rejected:
  Bad ClientHello:  {}
  Not Cloak:        {}
  Bad Proxy Method: {}
  Timed Out:        {}

Errors:
  Reply Failures: {}
"#,
            snapshot.uptime_secs,
            snapshot.accepted,
            snapshot.active,
            snapshot.established,
            snapshot.bad_client_hello,
            snapshot.not_cloak,
            snapshot.bad_proxy_method,
            snapshot.first_packet_timeouts,
            snapshot.reply_failures,
        )
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub active: u64,
    pub established: u64,
    pub bad_client_hello: u64,
    pub not_cloak: u64,
    pub bad_proxy_method: u64,
    pub first_packet_timeouts: u64,
    pub reply_failures: u64,
}

impl MetricsSnapshot {
    /// Total handshakes turned away.
    pub fn rejected(&self) -> u64 {
        self.bad_client_hello + self.not_cloak + self.bad_proxy_method + self.first_packet_timeouts
    }

    /// Fraction of accepted connections that became sessions.
    pub fn establish_rate(&self) -> f64 {
        if self.accepted == 0 {
            0.0
        } else {
            self.established as f64 / self.accepted as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counting() {
        let metrics = ServerMetrics::new();

        metrics.increment_connections();
        metrics.increment_connections();
        assert_eq!(metrics.accepted(), 2);
        assert_eq!(metrics.active(), 2);

        metrics.decrement_connections();
        assert_eq!(metrics.accepted(), 2);
        assert_eq!(metrics.active(), 1);
    }

    #[test]
    fn test_rejections_by_kind() {
        let metrics = ServerMetrics::new();
        metrics.record_rejection(&Error::BadClientHello);
        metrics.record_rejection(&Error::NotCloak);
        metrics.record_rejection(&Error::NotCloak);
        metrics.record_rejection(&Error::BadProxyMethod);
        metrics.record_rejection(&Error::Timeout(5));
        metrics.increment_first_packet_timeouts();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bad_client_hello, 1);
        assert_eq!(snapshot.not_cloak, 2);
        assert_eq!(snapshot.bad_proxy_method, 1);
        assert_eq!(snapshot.rejected(), 5);
    }

    #[test]
    fn test_establish_rate() {
        let metrics = ServerMetrics::new();
        assert_eq!(metrics.snapshot().establish_rate(), 0.0);

        for _ in 0..4 {
            metrics.increment_connections();
        }
        metrics.increment_established();
        assert!((metrics.snapshot().establish_rate() - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_format_report() {
        let metrics = ServerMetrics::new();
        metrics.increment_connections();
        metrics.increment_reply_failures();

        let report = metrics.format_report();
        assert!(report.contains("Cloak Handshake Metrics"));
        assert!(report.contains("Accepted:    1"));
        assert!(report.contains("Reply Failures: 1"));
    }
}
