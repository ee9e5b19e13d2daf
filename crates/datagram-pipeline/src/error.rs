// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the pipeline.
//!
//! Conditions that are part of normal operation (receive timeout, pool
//! exhaustion, full queue) are not errors: they surface as a [`PumpOutcome`].
//! Only unexpected failures become a [`PipelineError`].

use std::io;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure reported by a protocol transform step.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("packet rejected: {0}")]
    Rejected(String),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("module not started")]
    NotStarted,

    #[error("module already started")]
    AlreadyStarted,

    #[error("collaborator '{0}' unavailable")]
    CollaboratorUnavailable(String),

    #[error("socket closed")]
    Closed,

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("packet has no destination address")]
    NoDestination,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a single receive pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Datagram received and handed to the queue.
    Enqueued,
    /// Datagram received but the queue stayed full past the enqueue budget.
    Dropped,
    /// No datagram arrived within the receive timeout.
    TimedOut,
    /// The packet pool had nothing to hand out; the socket was not touched.
    PoolExhausted,
}

impl PumpOutcome {
    /// True when a datagram was read off the socket during this step.
    pub fn received(self) -> bool {
        matches!(self, Self::Enqueued | Self::Dropped)
    }
}

/// Returns true for the error kinds a socket read timeout produces.
///
/// Unix reports `WouldBlock`, Windows reports `TimedOut`.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
