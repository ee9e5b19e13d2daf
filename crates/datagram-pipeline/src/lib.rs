// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffered UDP sender/receiver built on pooled packets.
//!
//! A [`PacketPipeline`] binds one UDP socket and exposes three paths:
//!
//! - **Receive pump**: [`PacketPipeline::pump`] borrows a packet from the pool,
//!   lets it read one datagram and hands it to a bounded queue. A full queue
//!   drops the packet (lossy, never unbounded).
//! - **Dequeue**: [`PacketPipeline::next_packet`] polls the queue without
//!   blocking, runs the protocol's receive transform and returns an
//!   immutable [`FinalPacket`].
//! - **Send**: [`PacketPipeline::send_packet`] runs the protocol's send
//!   transform and transmits to the packet's destination.
//!
//! # Architecture
//!
//! ```text
//!                 +-------------+          +-------------+
//!  UDP socket --> | pump()      | -------> | PacketQueue | --> next_packet() --> FinalPacket
//!                 |  PacketPool |  offer   |  (bounded)  |        |
//!                 +-------------+          +-------------+        v
//!                        |  timeout/full                     Protocol::on_receive
//!                        v
//!                    recycle()
//! ```
//!
//! Every packet acquired from the pool is recycled exactly once on every
//! non-shutdown path. Collaborators (protocol, pool) are resolved by name
//! through a [`ModuleDirectory`] and held weakly.
//!
//! # Quick Start
//!
//! ```no_run
//! use datagram_pipeline::{
//!     BufferPool, ModuleRegistry, PacketPipeline, Passthrough, PipelineConfig, PoolBuffer,
//!     PumpDriver,
//! };
//! use std::sync::Arc;
//!
//! let registry: Arc<ModuleRegistry<PoolBuffer>> = Arc::new(ModuleRegistry::new());
//! registry.register_protocol("Protocol", Arc::new(Passthrough));
//! registry.register_packet_pool("PacketPool", Arc::new(BufferPool::new(64, 1500)?));
//!
//! let pipeline = Arc::new(PacketPipeline::new("udp", PipelineConfig::default(), registry));
//! pipeline.start()?;
//! let driver = PumpDriver::spawn(Arc::clone(&pipeline))?;
//!
//! while pipeline.is_alive() {
//!     if let Some(packet) = pipeline.next_packet() {
//!         println!("{} bytes from {:?}", packet.len(), packet.address());
//!     }
//! }
//! driver.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! protocol-module-name = "Protocol"
//! packetpool-module-name = "PacketPool"
//! packetbuffer-size = 128
//! socket-port = 49300
//! socket-timeout-ms = 1500
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod packet;
pub mod pipeline;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod socket;

pub use config::PipelineConfig;
pub use driver::PumpDriver;
pub use error::{ConfigError, PipelineError, PumpOutcome, TransformError};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use packet::{Envelope, FinalPacket, PooledPacket, RecycleGuard};
pub use pipeline::{ModuleStatus, PacketPipeline, PacketReceiver, PacketSender};
pub use pool::{BufferPool, PacketPool, PoolBuffer};
pub use protocol::{Passthrough, Protocol};
pub use queue::PacketQueue;
pub use registry::{CollaboratorHandle, ModuleDirectory, ModuleRegistry};
pub use socket::SocketResource;
