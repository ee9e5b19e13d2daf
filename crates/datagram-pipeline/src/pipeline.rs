// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Buffered UDP sender/receiver.
//!
//! ```text
//! pump():   PacketPool::acquire() -> socket receive -> PacketQueue::offer() | recycle
//! next():   PacketQueue::poll() -> Protocol::on_receive() -> FinalPacket + recycle
//! send():   Protocol::on_send() -> FinalPacket -> Envelope -> socket send
//! ```
//!
//! Every packet taken from the pool is recycled exactly once on every path:
//! the pipeline keeps it inside a [`RecycleGuard`] until ownership moves to
//! the queue or the packet is released.

use crate::config::PipelineConfig;
use crate::error::{is_timeout, PipelineError, PumpOutcome};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::packet::{FinalPacket, PooledPacket, RecycleGuard};
use crate::pool::PacketPool;
use crate::protocol::Protocol;
use crate::queue::PacketQueue;
use crate::registry::{CollaboratorHandle, ModuleDirectory};
use crate::socket::SocketResource;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Receive-side capability exposed to other modules.
pub trait PacketReceiver {
    /// True while the module is started.
    fn is_alive(&self) -> bool;

    /// True if at least one packet is waiting. Never blocks.
    fn has_next_packet(&self) -> bool;

    /// Pull the next finished packet, or `None` if nothing (acceptable) is waiting.
    fn next_packet(&self) -> Option<FinalPacket>;
}

/// Send-side capability exposed to other modules.
pub trait PacketSender<P> {
    /// Transform and transmit `packet`. Failures are logged, never returned.
    fn send_packet(&self, packet: &mut P);

    /// Like [`send_packet`](Self::send_packet), then recycle `packet` unconditionally.
    fn send_packet_and_recycle(&self, packet: P);
}

/// Resources that exist only while the module is started.
struct Running<P: PooledPacket> {
    protocol: CollaboratorHandle<dyn Protocol<P>>,
    pool: CollaboratorHandle<dyn PacketPool<P>>,
    queue: PacketQueue<P>,
    socket: SocketResource,
    enqueue_timeout: Duration,
    recycle_on_stop: bool,
    metrics: Arc<PipelineMetrics>,
}

impl<P: PooledPacket> Running<P> {
    /// Empty the queue according to the shutdown policy.
    fn discard_queued(&self) -> usize {
        let leftovers = self.queue.drain();
        let count = leftovers.len();
        if count == 0 {
            return 0;
        }
        if self.recycle_on_stop {
            for packet in leftovers {
                PipelineMetrics::bump(&self.metrics.packets_recycled);
                packet.recycle();
            }
            log::debug!("[PIPELINE] recycled {} queued packets at stop", count);
        } else {
            log::warn!(
                "[PIPELINE] dropped {} queued packets at stop without recycling",
                count
            );
        }
        count
    }
}

impl<P: PooledPacket> Drop for Running<P> {
    fn drop(&mut self) {
        // A pump step still in flight during stop may have enqueued after the
        // drain in `stop`.
        self.discard_queued();
    }
}

/// Bounded, lossy, pooled-buffer UDP pipeline.
pub struct PacketPipeline<P: PooledPacket> {
    name: String,
    config: PipelineConfig,
    directory: Arc<dyn ModuleDirectory<P>>,
    status: Mutex<ModuleStatus>,
    running: RwLock<Option<Arc<Running<P>>>>,
    metrics: Arc<PipelineMetrics>,
}

impl<P: PooledPacket> PacketPipeline<P> {
    /// Create a stopped pipeline; nothing is resolved or bound until [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        config: PipelineConfig,
        directory: Arc<dyn ModuleDirectory<P>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            directory,
            status: Mutex::new(ModuleStatus::Stopped),
            running: RwLock::new(None),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> ModuleStatus {
        *self.status.lock()
    }

    /// Bound socket address while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current().map(|running| running.socket.local_addr())
    }

    /// Packets currently queued (0 when stopped).
    pub fn queue_len(&self) -> usize {
        self.current().map_or(0, |running| running.queue.len())
    }

    /// Configured queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.config.packetbuffer_size
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn current(&self) -> Option<Arc<Running<P>>> {
        self.running.read().clone()
    }

    fn release(&self, packet: RecycleGuard<P>) {
        PipelineMetrics::bump(&self.metrics.packets_recycled);
        packet.recycle();
    }

    // ===== Lifecycle =====

    /// Resolve collaborators, allocate the queue and bind the socket.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut status = self.status.lock();
        if *status != ModuleStatus::Stopped {
            return Err(PipelineError::AlreadyStarted);
        }
        *status = ModuleStatus::Starting;

        match self.open() {
            Ok(running) => {
                log::info!(
                    "[PIPELINE] '{}' started addr={} capacity={} timeout={}ms",
                    self.name,
                    running.socket.local_addr(),
                    running.queue.capacity(),
                    running.socket.timeout().as_millis()
                );
                *self.running.write() = Some(Arc::new(running));
                *status = ModuleStatus::Started;
                Ok(())
            }
            Err(e) => {
                log::error!("[PIPELINE] '{}' failed to start: {}", self.name, e);
                *status = ModuleStatus::Stopped;
                Err(e)
            }
        }
    }

    fn open(&self) -> Result<Running<P>, PipelineError> {
        self.config.validate()?;

        let protocol: CollaboratorHandle<dyn Protocol<P>> = {
            let directory = Arc::clone(&self.directory);
            let name = self.config.protocol_module_name.clone();
            CollaboratorHandle::new(name.clone(), move || directory.protocol(&name))
        };
        let pool: CollaboratorHandle<dyn PacketPool<P>> = {
            let directory = Arc::clone(&self.directory);
            let name = self.config.packetpool_module_name.clone();
            CollaboratorHandle::new(name.clone(), move || directory.packet_pool(&name))
        };

        for (name, resolved) in [
            (protocol.name(), protocol.refresh()),
            (pool.name(), pool.refresh()),
        ] {
            if resolved {
                continue;
            }
            if self.config.require_collaborators {
                return Err(PipelineError::CollaboratorUnavailable(name.to_string()));
            }
            log::warn!(
                "[PIPELINE] '{}' collaborator '{}' not available yet, resolving lazily",
                self.name,
                name
            );
        }

        let queue = PacketQueue::new(self.config.packetbuffer_size);
        let socket = SocketResource::open(self.config.bind_addr(), self.config.socket_timeout())?;

        Ok(Running {
            protocol,
            pool,
            queue,
            socket,
            enqueue_timeout: self.config.enqueue_timeout(),
            recycle_on_stop: self.config.recycle_on_stop,
            metrics: Arc::clone(&self.metrics),
        })
    }

    /// Close the socket, discard queued packets and release collaborators.
    ///
    /// Queued packets are dropped without recycling unless `recycle-on-stop`
    /// is set. No-op when not started.
    pub fn stop(&self) {
        let mut status = self.status.lock();
        if *status != ModuleStatus::Started {
            return;
        }
        *status = ModuleStatus::Stopping;

        let running = self.running.write().take();
        if let Some(running) = running {
            running.socket.close();
            running.discard_queued();
            running.protocol.release();
            running.pool.release();
        }

        *status = ModuleStatus::Stopped;
        log::info!("[PIPELINE] '{}' stopped", self.name);
    }

    pub fn is_alive(&self) -> bool {
        self.status() == ModuleStatus::Started
    }

    // ===== Receive pump =====

    /// Run one acquire -> receive -> enqueue step.
    ///
    /// Blocks for at most the receive timeout plus the enqueue timeout.
    /// Anticipated conditions come back as a [`PumpOutcome`]; only unexpected
    /// failures are `Err`, and only after the held packet was recycled.
    pub fn pump(&self) -> Result<PumpOutcome, PipelineError> {
        let running = self.current().ok_or(PipelineError::NotStarted)?;
        let pool = running.pool.get()?;

        let Some(packet) = pool.acquire() else {
            PipelineMetrics::bump(&self.metrics.pool_exhausted);
            log::warn!("[PIPELINE] PacketPool is empty");
            return Ok(PumpOutcome::PoolExhausted);
        };
        let mut packet = RecycleGuard::new(packet);

        match running.socket.receive_into(&mut *packet) {
            Ok(len) => {
                PipelineMetrics::bump(&self.metrics.packets_received);
                log::trace!("[PIPELINE] received len={}", len);
            }
            Err(PipelineError::Io(ref e)) if is_timeout(e) => {
                PipelineMetrics::bump(&self.metrics.receive_timeouts);
                log::debug!("[PIPELINE] '{}' receive timed out", self.name);
                self.release(packet);
                return Ok(PumpOutcome::TimedOut);
            }
            Err(e) => {
                self.release(packet);
                return Err(e);
            }
        }

        match running.queue.offer(packet.take(), running.enqueue_timeout) {
            Ok(()) => {
                PipelineMetrics::bump(&self.metrics.packets_enqueued);
                Ok(PumpOutcome::Enqueued)
            }
            Err(rejected) => {
                PipelineMetrics::bump(&self.metrics.packets_dropped);
                log::warn!(
                    "[PIPELINE] buffer is full (capacity={}), dropping packet",
                    running.queue.capacity()
                );
                self.release(RecycleGuard::new(rejected));
                Ok(PumpOutcome::Dropped)
            }
        }
    }

    // ===== Dequeue path =====

    /// True if a packet is waiting. Never blocks; false when stopped.
    pub fn has_next_packet(&self) -> bool {
        self.current().is_some_and(|running| !running.queue.is_empty())
    }

    /// Pull one packet through the receive transform.
    ///
    /// `Ok(None)` means nothing was queued. A transform failure or missing
    /// protocol is logged and the packet recycled before the error is returned.
    pub fn try_next_packet(&self) -> Result<Option<FinalPacket>, PipelineError> {
        let running = self.current().ok_or(PipelineError::NotStarted)?;
        let Some(packet) = running.queue.poll() else {
            return Ok(None);
        };
        let mut packet = RecycleGuard::new(packet);

        let transformed = running
            .protocol
            .get()
            .and_then(|protocol| protocol.on_receive(&mut *packet).map_err(PipelineError::from));
        if let Err(e) = transformed {
            PipelineMetrics::bump(&self.metrics.transform_failures);
            log::error!("[PIPELINE] '{}' dropping received packet: {}", self.name, e);
            self.release(packet);
            return Err(e);
        }

        let final_packet = packet.to_final();
        self.release(packet);
        PipelineMetrics::bump(&self.metrics.packets_delivered);
        Ok(Some(final_packet))
    }

    /// Pull the next finished packet; every failure collapses to `None`.
    pub fn next_packet(&self) -> Option<FinalPacket> {
        self.try_next_packet().ok().flatten()
    }

    // ===== Send path =====

    /// Transform and transmit, returning the number of bytes sent.
    pub fn try_send_packet(&self, packet: &mut P) -> Result<usize, PipelineError> {
        let result = self.transmit(packet);
        match result {
            Ok(_) => PipelineMetrics::bump(&self.metrics.packets_sent),
            Err(_) => PipelineMetrics::bump(&self.metrics.send_failures),
        }
        result
    }

    fn transmit(&self, packet: &mut P) -> Result<usize, PipelineError> {
        let running = self.current().ok_or(PipelineError::NotStarted)?;
        let protocol = running.protocol.get()?;
        protocol.on_send(packet)?;
        let final_packet = packet.to_final();
        running.socket.send(final_packet.envelope()?)
    }

    /// Transform and transmit; failures are logged and absorbed, never retried.
    pub fn send_packet(&self, packet: &mut P) {
        if let Err(e) = self.try_send_packet(packet) {
            log::error!("[PIPELINE] '{}' failed send packet: {}", self.name, e);
        }
    }

    /// Send, then recycle `packet` whether or not the send succeeded.
    pub fn send_packet_and_recycle(&self, packet: P) {
        let mut packet = RecycleGuard::new(packet);
        self.send_packet(&mut *packet);
        self.release(packet);
    }
}

impl<P: PooledPacket> PacketReceiver for PacketPipeline<P> {
    fn is_alive(&self) -> bool {
        PacketPipeline::is_alive(self)
    }

    fn has_next_packet(&self) -> bool {
        PacketPipeline::has_next_packet(self)
    }

    fn next_packet(&self) -> Option<FinalPacket> {
        PacketPipeline::next_packet(self)
    }
}

impl<P: PooledPacket> PacketSender<P> for PacketPipeline<P> {
    fn send_packet(&self, packet: &mut P) {
        PacketPipeline::send_packet(self, packet);
    }

    fn send_packet_and_recycle(&self, packet: P) {
        PacketPipeline::send_packet_and_recycle(self, packet);
    }
}

impl<P: PooledPacket> Drop for PacketPipeline<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
