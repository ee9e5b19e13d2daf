// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded, lossy packet queue between the pump and consumers.
//!
//! Backed by a crossbeam bounded channel: the producer side blocks for at most
//! a given budget and gets the packet back on overflow, consumers never block.

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Fixed-capacity FIFO of pooled packets.
///
/// Safe for one producer and any number of concurrent consumers/inspectors
/// without external locking. `len() <= capacity()` holds at all times.
pub struct PacketQueue<P> {
    tx: Sender<P>,
    rx: Receiver<P>,
    capacity: usize,
}

impl<P> PacketQueue<P> {
    /// Create a queue holding at most `capacity` packets.
    ///
    /// # Panics
    /// Panics if `capacity` is 0 (a zero-capacity channel is a rendezvous,
    /// not a buffer).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "PacketQueue capacity must be at least 1");
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Insert, waiting up to `timeout` for room.
    ///
    /// On overflow the packet is handed back so the caller can recycle it.
    pub fn offer(&self, packet: P, timeout: Duration) -> Result<(), P> {
        match self.tx.send_timeout(packet, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(packet) | SendTimeoutError::Disconnected(packet)) => {
                Err(packet)
            }
        }
    }

    /// Insert without waiting.
    pub fn try_offer(&self, packet: P) -> Result<(), P> {
        self.tx.try_send(packet).map_err(|e| e.into_inner())
    }

    /// Remove the oldest packet, or `None` immediately if empty.
    pub fn poll(&self) -> Option<P> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<P> {
        self.rx.try_iter().collect()
    }
}
