// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet pool contract and a lock-free datagram buffer pool.
//!
//! Pre-allocates N buffers of a fixed size, managed via a lock-free freelist.
//! The pump acquires buffers, whoever ends up owning the packet recycles it.
//!
//! # Memory Budget
//! - 64 buffers x 1500 bytes = 96 KB
//! - 256 buffers x 65535 bytes = 16 MB (max UDP payload)

use crate::packet::{FinalPacket, PooledPacket};
use crossbeam::queue::ArrayQueue;
use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of pooled packets.
pub trait PacketPool<P>: Send + Sync {
    /// Hand out a packet, or `None` when the pool is exhausted.
    fn acquire(&self) -> Option<P>;
}

struct PoolShared {
    /// Free buffers
    freelist: ArrayQueue<Vec<u8>>,
    /// Size of every buffer
    buffer_size: usize,
    /// Count of pool exhaustion events (diagnostic)
    exhausted_count: AtomicU64,
}

/// Datagram buffer pool.
///
/// # Design
/// - **Lock-free:** crossbeam `ArrayQueue` freelist (MPMC-safe)
/// - **Zero allocation after start-up:** buffers are moved in and out, never reallocated
/// - **Metrics:** tracks exhaustion events
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers of `buffer_size` bytes.
    ///
    /// # Examples
    /// ```
    /// use datagram_pipeline::BufferPool;
    ///
    /// let pool = BufferPool::new(16, 1500).expect("pool creation should succeed");
    /// assert_eq!(pool.capacity(), 16);
    /// assert_eq!(pool.available(), 16);
    /// ```
    pub fn new(capacity: usize, buffer_size: usize) -> Result<Self, &'static str> {
        if capacity == 0 {
            return Err("BufferPool capacity must be at least 1");
        }
        if buffer_size == 0 {
            return Err("BufferPool buffer size must be at least 1");
        }

        let freelist = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            freelist
                .push(vec![0u8; buffer_size])
                .map_err(|_| "Freelist init failed: capacity mismatch")?;
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                freelist,
                buffer_size,
                exhausted_count: AtomicU64::new(0),
            }),
        })
    }

    /// Total number of buffers.
    pub fn capacity(&self) -> usize {
        self.shared.freelist.capacity()
    }

    /// Buffers currently free.
    pub fn available(&self) -> usize {
        self.shared.freelist.len()
    }

    /// Buffers currently handed out (includes buffers dropped without recycle).
    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Size of each buffer in bytes.
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Number of times `acquire` found the pool empty.
    pub fn exhausted_count(&self) -> u64 {
        self.shared.exhausted_count.load(Ordering::Relaxed)
    }
}

impl PacketPool<PoolBuffer> for BufferPool {
    fn acquire(&self) -> Option<PoolBuffer> {
        match self.shared.freelist.pop() {
            Some(buf) => Some(PoolBuffer {
                buf,
                len: 0,
                peer: None,
                pool: Arc::clone(&self.shared),
            }),
            None => {
                self.shared.exhausted_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

/// Buffer borrowed from a [`BufferPool`].
pub struct PoolBuffer {
    buf: Vec<u8>,
    len: usize,
    peer: Option<SocketAddr>,
    pool: Arc<PoolShared>,
}

impl PoolBuffer {
    /// Filled bytes.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Filled bytes, mutable (for in-place transforms).
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// Replace the payload; fails if it does not fit the buffer.
    pub fn write_payload(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() > self.buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "payload of {} bytes exceeds buffer size {}",
                    data.len(),
                    self.buf.len()
                ),
            ));
        }
        self.buf[..data.len()].copy_from_slice(data);
        self.len = data.len();
        Ok(())
    }

    /// Shrink the filled region (e.g. after stripping a trailer).
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Source of a received datagram, or destination of an outgoing one.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// Total buffer size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl PooledPacket for PoolBuffer {
    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize> {
        let (len, peer) = socket.recv_from(&mut self.buf)?;
        self.len = len;
        self.peer = Some(peer);
        Ok(len)
    }

    fn to_final(&self) -> FinalPacket {
        FinalPacket::new(self.payload().to_vec(), self.peer)
    }

    fn recycle(self) {
        let PoolBuffer { buf, pool, .. } = self;
        if pool.freelist.push(buf).is_err() {
            log::error!("[POOL] CRITICAL: freelist full on recycle, buffer discarded");
        }
    }
}

impl fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .field("peer", &self.peer)
            .finish()
    }
}
