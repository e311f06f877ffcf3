// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine metrics.
//!
//! Counters give callers the delivery feedback the fire-and-forget entry
//! points do not return:
//! - Datagram jobs (queued, sent, failed, dropped during drain)
//! - Inbound datagrams and bytes
//! - HTTP jobs (queued, completed, transport failures, dropped during drain)
//! - HTTP concurrency (current and peak in-flight requests)
//!
//! # Example
//!
//! ```
//! use agentwire::EngineMetrics;
//!
//! let metrics = EngineMetrics::new();
//! metrics.record_datagram_queued();
//! metrics.record_datagram_sent();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.datagrams_sent, 1);
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the datagram channel and the HTTP dispatcher.
#[derive(Debug)]
pub struct EngineMetrics {
    // Datagram metrics
    datagrams_queued: AtomicU64,
    datagrams_sent: AtomicU64,
    datagrams_failed: AtomicU64,
    datagrams_dropped: AtomicU64,
    /// Individual per-interface sends that succeeded during broadcasts
    broadcast_interface_sends: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_received: AtomicU64,

    // HTTP metrics
    http_queued: AtomicU64,
    http_completed: AtomicU64,
    /// Callbacks fired with status 0
    http_failed: AtomicU64,
    http_dropped: AtomicU64,
    http_in_flight: AtomicUsize,
    http_peak_in_flight: AtomicUsize,

    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            datagrams_queued: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            datagrams_failed: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            broadcast_interface_sends: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            http_queued: AtomicU64::new(0),
            http_completed: AtomicU64::new(0),
            http_failed: AtomicU64::new(0),
            http_dropped: AtomicU64::new(0),
            http_in_flight: AtomicUsize::new(0),
            http_peak_in_flight: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    // ========================================================================
    // Datagram recording
    // ========================================================================

    pub fn record_datagram_queued(&self) {
        self.datagrams_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram_sent(&self) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram_failed(&self) {
        self.datagrams_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagrams_dropped(&self, count: usize) {
        self.datagrams_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_broadcast_interface_send(&self) {
        self.broadcast_interface_sends
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    // ========================================================================
    // HTTP recording
    // ========================================================================

    pub fn record_http_queued(&self) {
        self.http_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_dropped(&self, count: usize) {
        self.http_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Mark one request as started; tracks the peak concurrency seen.
    pub fn record_http_started(&self) {
        let now = self.http_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.http_peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    /// Mark one request as finished. `status == 0` counts as a transport failure.
    pub fn record_http_finished(&self, status: u16) {
        self.http_in_flight.fetch_sub(1, Ordering::SeqCst);
        if status == 0 {
            self.http_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.http_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_queued: self.datagrams_queued.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_failed: self.datagrams_failed.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            broadcast_interface_sends: self.broadcast_interface_sends.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            http_queued: self.http_queued.load(Ordering::Relaxed),
            http_completed: self.http_completed.load(Ordering::Relaxed),
            http_failed: self.http_failed.load(Ordering::Relaxed),
            http_dropped: self.http_dropped.load(Ordering::Relaxed),
            http_in_flight: self.http_in_flight.load(Ordering::SeqCst),
            http_peak_in_flight: self.http_peak_in_flight.load(Ordering::SeqCst),
            uptime: self.start_time.elapsed(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_queued: u64,
    pub datagrams_sent: u64,
    pub datagrams_failed: u64,
    pub datagrams_dropped: u64,
    pub broadcast_interface_sends: u64,
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub http_queued: u64,
    pub http_completed: u64,
    pub http_failed: u64,
    pub http_dropped: u64,
    pub http_in_flight: usize,
    pub http_peak_in_flight: usize,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Datagram jobs not yet accounted for as sent, failed or dropped.
    pub fn datagrams_outstanding(&self) -> u64 {
        self.datagrams_queued
            .saturating_sub(self.datagrams_sent + self.datagrams_failed + self.datagrams_dropped)
    }

    /// HTTP jobs whose callback has not fired and that were not dropped.
    pub fn http_outstanding(&self) -> u64 {
        self.http_queued
            .saturating_sub(self.http_completed + self.http_failed + self.http_dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_accounting() {
        let metrics = EngineMetrics::new();
        for _ in 0..5 {
            metrics.record_datagram_queued();
        }
        metrics.record_datagram_sent();
        metrics.record_datagram_failed();
        metrics.record_datagrams_dropped(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.datagrams_queued, 5);
        assert_eq!(snap.datagrams_outstanding(), 1);
    }

    #[test]
    fn test_http_peak_in_flight() {
        let metrics = EngineMetrics::new();
        metrics.record_http_started();
        metrics.record_http_started();
        metrics.record_http_started();
        metrics.record_http_finished(200);
        metrics.record_http_finished(0);
        metrics.record_http_started();

        let snap = metrics.snapshot();
        assert_eq!(snap.http_in_flight, 2);
        assert_eq!(snap.http_peak_in_flight, 3);
        assert_eq!(snap.http_completed, 1);
        assert_eq!(snap.http_failed, 1);
    }

    #[test]
    fn test_received_bytes() {
        let metrics = EngineMetrics::new();
        metrics.record_datagram_received(4);
        metrics.record_datagram_received(10);

        let snap = metrics.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.bytes_received, 14);
    }
}
