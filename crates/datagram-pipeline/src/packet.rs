// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pooled and final packet types.
//!
//! A [`PooledPacket`] is a mutable buffer borrowed from a pool. It moves
//! through `Acquired -> Filled -> {Recycled | Finalized}`; `recycle` takes the
//! packet by value so a packet can never be released twice.
//!
//! A [`FinalPacket`] is the immutable snapshot produced once a transform step
//! succeeded. It owns its bytes and holds no reference back to the pool.

use crate::error::PipelineError;
use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::ops::{Deref, DerefMut};

/// Poolable receive/send buffer.
pub trait PooledPacket: Send + 'static {
    /// Perform one blocking receive on `socket`.
    ///
    /// Bounded by the socket's read timeout; a timeout surfaces as an
    /// `io::Error` of kind `WouldBlock` or `TimedOut`.
    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize>;

    /// Produce the immutable, transform-complete form of this packet.
    fn to_final(&self) -> FinalPacket;

    /// Return the packet to its pool.
    fn recycle(self);
}

/// Immutable, transform-complete packet.
#[derive(Clone, PartialEq, Eq)]
pub struct FinalPacket {
    payload: Vec<u8>,
    address: Option<SocketAddr>,
}

impl FinalPacket {
    /// Create a final packet from payload bytes and an optional peer address.
    pub fn new(payload: Vec<u8>, address: Option<SocketAddr>) -> Self {
        Self { payload, address }
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Peer address (source for received packets, destination for sends).
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take ownership of the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Build the transport-ready envelope.
    pub fn envelope(&self) -> Result<Envelope<'_>, PipelineError> {
        let destination = self.address.ok_or(PipelineError::NoDestination)?;
        Ok(Envelope {
            bytes: &self.payload,
            destination,
        })
    }
}

impl fmt::Debug for FinalPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalPacket")
            .field("len", &self.payload.len())
            .field("address", &self.address)
            .finish()
    }
}

/// Wire-ready datagram: bytes plus destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub bytes: &'a [u8],
    pub destination: SocketAddr,
}

/// Holds a pooled packet and recycles it on drop unless ownership is taken.
///
/// Every path through the pump, dequeue and send code keeps the packet inside
/// a guard, so unwinding also returns the buffer to its pool.
pub struct RecycleGuard<P: PooledPacket> {
    packet: Option<P>,
}

impl<P: PooledPacket> RecycleGuard<P> {
    pub fn new(packet: P) -> Self {
        Self {
            packet: Some(packet),
        }
    }

    /// Take the packet out; the guard no longer recycles it.
    pub fn take(mut self) -> P {
        match self.packet.take() {
            Some(packet) => packet,
            // `take` consumes the guard, so the slot is always filled here.
            None => unreachable!("RecycleGuard emptied twice"),
        }
    }

    /// Recycle now.
    pub fn recycle(self) {
        drop(self);
    }
}

impl<P: PooledPacket> Deref for RecycleGuard<P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self.packet.as_ref() {
            Some(packet) => packet,
            None => unreachable!("RecycleGuard used after take"),
        }
    }
}

impl<P: PooledPacket> DerefMut for RecycleGuard<P> {
    fn deref_mut(&mut self) -> &mut P {
        match self.packet.as_mut() {
            Some(packet) => packet,
            None => unreachable!("RecycleGuard used after take"),
        }
    }
}

impl<P: PooledPacket> Drop for RecycleGuard<P> {
    fn drop(&mut self) {
        if let Some(packet) = self.packet.take() {
            packet.recycle();
        }
    }
}
