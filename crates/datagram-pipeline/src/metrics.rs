// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline counters.
//!
//! All fields use relaxed atomics which is sufficient because readers only
//! need monotonic snapshots for observability.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the pump, dequeue and send paths.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Datagrams read off the socket
    pub packets_received: AtomicU64,
    /// Datagrams accepted by the queue
    pub packets_enqueued: AtomicU64,
    /// Datagrams dropped because the queue stayed full
    pub packets_dropped: AtomicU64,
    /// Pump steps that ended in a receive timeout
    pub receive_timeouts: AtomicU64,
    /// Pump steps skipped because the pool was empty
    pub pool_exhausted: AtomicU64,
    /// Packets rejected by the receive-side transform
    pub transform_failures: AtomicU64,
    /// Final packets handed to consumers
    pub packets_delivered: AtomicU64,
    /// Datagrams transmitted
    pub packets_sent: AtomicU64,
    /// Send attempts that failed (transform or transmission)
    pub send_failures: AtomicU64,
    /// Packets returned to the pool by the pipeline
    pub packets_recycled: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_enqueued: u64,
    pub packets_dropped: u64,
    pub receive_timeouts: u64,
    pub pool_exhausted: u64,
    pub transform_failures: u64,
    pub packets_delivered: u64,
    pub packets_sent: u64,
    pub send_failures: u64,
    pub packets_recycled: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_enqueued: self.packets_enqueued.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            pool_exhausted: self.pool_exhausted.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            packets_recycled: self.packets_recycled.load(Ordering::Relaxed),
        }
    }
}
