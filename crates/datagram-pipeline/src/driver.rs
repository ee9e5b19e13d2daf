// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dedicated receive thread for a [`PacketPipeline`].
//!
//! The pipeline itself never spawns threads: [`PacketPipeline::pump`] performs
//! exactly one step per call. `PumpDriver` wraps that in a loop on a named
//! thread, one step per pass.
//!
//! ```text
//! loop while running:
//!     pump() -> Enqueued | Dropped | TimedOut  -> next pass
//!            -> PoolExhausted                  -> back off, next pass
//!            -> Err(NotStarted | Closed)       -> exit
//!            -> Err(other)                     -> log, back off, next pass
//! ```

use crate::error::{PipelineError, PumpOutcome};
use crate::packet::PooledPacket;
use crate::pipeline::PacketPipeline;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause after a pump step that could not touch the socket.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);
/// Pause after an unexpected pump failure.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Receive thread driving one pipeline.
pub struct PumpDriver {
    /// Thread join handle
    handle: Option<JoinHandle<()>>,
    /// Running flag for graceful shutdown
    running: Arc<AtomicBool>,
}

impl PumpDriver {
    /// Spawn the receive thread.
    ///
    /// The thread exits on its own once the pipeline is stopped.
    pub fn spawn<P: PooledPacket>(pipeline: Arc<PacketPipeline<P>>) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("dgp-pump-rx".to_string())
            .spawn(move || Self::run_loop(&pipeline, &running_clone))?;

        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    fn run_loop<P: PooledPacket>(pipeline: &PacketPipeline<P>, running: &AtomicBool) {
        log::debug!(
            "[PUMP-THREAD] started pipeline='{}' thread={:?}",
            pipeline.name(),
            std::thread::current().id()
        );

        while running.load(Ordering::Relaxed) {
            match pipeline.pump() {
                Ok(PumpOutcome::PoolExhausted) => std::thread::sleep(IDLE_BACKOFF),
                Ok(_) => {}
                Err(PipelineError::NotStarted | PipelineError::Closed) => {
                    log::debug!(
                        "[PUMP-THREAD] pipeline='{}' stopped, exiting",
                        pipeline.name()
                    );
                    break;
                }
                Err(e) => {
                    log::error!(
                        "[PUMP-THREAD] pipeline='{}' pump step failed: {}",
                        pipeline.name(),
                        e
                    );
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        running.store(false, Ordering::Relaxed);
    }

    /// True while the receive thread is looping.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread to exit and wait for it.
    ///
    /// Returns after at most one pump step (receive timeout + enqueue timeout).
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[PUMP-THREAD] receive thread panicked");
            }
        }
    }
}

impl Drop for PumpDriver {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pool::{BufferPool, PoolBuffer};
    use crate::protocol::Passthrough;
    use crate::registry::ModuleRegistry;
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};
    use std::time::Instant;

    fn started_pipeline(pool: &BufferPool) -> Arc<PacketPipeline<PoolBuffer>> {
        let registry: Arc<ModuleRegistry<PoolBuffer>> = Arc::new(ModuleRegistry::new());
        registry.register_protocol("Protocol", Arc::new(Passthrough));
        registry.register_packet_pool("PacketPool", Arc::new(pool.clone()));
        let config = PipelineConfig::default()
            .bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .timeout(Duration::from_millis(50));
        let pipeline = Arc::new(PacketPipeline::new("driven", config, registry));
        pipeline.start().expect("start");
        pipeline
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_driver_feeds_queue() {
        let pool = BufferPool::new(8, 256).expect("pool");
        let pipeline = started_pipeline(&pool);
        let driver = PumpDriver::spawn(Arc::clone(&pipeline)).expect("spawn");
        assert!(driver.is_running());

        let addr = pipeline.local_addr().expect("bound");
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind");
        for i in 0..3u8 {
            peer.send_to(&[i], addr).expect("send");
        }

        assert!(wait_for(|| pipeline.queue_len() == 3));
        let payloads: Vec<Vec<u8>> = std::iter::from_fn(|| pipeline.next_packet())
            .map(|p| p.into_payload())
            .collect();
        assert_eq!(payloads, vec![vec![0], vec![1], vec![2]]);

        driver.shutdown();
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_driver_exits_when_pipeline_stops() {
        let pool = BufferPool::new(2, 64).expect("pool");
        let pipeline = started_pipeline(&pool);
        let driver = PumpDriver::spawn(Arc::clone(&pipeline)).expect("spawn");

        pipeline.stop();
        assert!(wait_for(|| !driver.is_running()));
        driver.shutdown();
        assert_eq!(pool.available(), 2);
    }
}
