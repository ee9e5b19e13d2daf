// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol transform contract.

use crate::error::TransformError;

/// Protocol-specific validation/encoding applied before a packet is finalized.
///
/// Both steps mutate the packet in place. An `Err` means the packet must not be
/// finalized; the pipeline recycles it.
pub trait Protocol<P>: Send + Sync {
    /// Validate/decode a packet that just came off the socket.
    fn on_receive(&self, packet: &mut P) -> Result<(), TransformError>;

    /// Encode a packet that is about to be transmitted.
    fn on_send(&self, packet: &mut P) -> Result<(), TransformError>;
}

/// Identity transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl<P> Protocol<P> for Passthrough {
    fn on_receive(&self, _packet: &mut P) -> Result<(), TransformError> {
        Ok(())
    }

    fn on_send(&self, _packet: &mut P) -> Result<(), TransformError> {
        Ok(())
    }
}
