// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for pipeline integration tests.
//!
//! - `TrackedPool` / `TrackedPacket`: pool double that counts recycles per packet
//! - `RejectingProtocol`: transform that fails both directions
//! - log capture scoped to the calling test thread

#![allow(dead_code)]

use datagram_pipeline::{
    FinalPacket, ModuleRegistry, PacketPipeline, PacketPool, Passthrough, PipelineConfig,
    PooledPacket, Protocol, TransformError,
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

// ============================================================================
// Log capture
// ============================================================================

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let entry = (record.level(), record.args().to_string());
        // Thread-local storage may already be gone while a thread shuts down.
        let _ = CAPTURED.try_with(|captured| captured.borrow_mut().push(entry));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static LOGGER_INIT: Once = Once::new();

/// Install the capturing logger (once per process) and clear this thread's buffer.
pub fn capture_logs() {
    LOGGER_INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    CAPTURED.with(|captured| captured.borrow_mut().clear());
}

/// Drain everything logged on this thread since the last call.
pub fn take_logs() -> Vec<(Level, String)> {
    CAPTURED.with(|captured| std::mem::take(&mut *captured.borrow_mut()))
}

/// True if a record at `level` containing `needle` was captured.
pub fn logged(logs: &[(Level, String)], level: Level, needle: &str) -> bool {
    logs.iter()
        .any(|(l, message)| *l == level && message.contains(needle))
}

// ============================================================================
// Tracked pool
// ============================================================================

/// How a tracked packet behaves when asked to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Read a datagram off the socket.
    Socket,
    /// Fail with an I/O error of the given kind.
    Fail(io::ErrorKind),
    /// Panic inside the receive call.
    Panic,
}

/// Per-pool bookkeeping shared with every packet it hands out.
#[derive(Default)]
pub struct Ledger {
    acquired: AtomicUsize,
    finalized: AtomicUsize,
    recycles: Mutex<HashMap<usize, usize>>,
}

impl Ledger {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Times packet `id` was recycled.
    pub fn recycle_count(&self, id: usize) -> usize {
        self.recycles.lock().get(&id).copied().unwrap_or(0)
    }

    /// Total recycle calls across all packets.
    pub fn recycled(&self) -> usize {
        self.recycles.lock().values().sum()
    }

    /// Packets acquired and not yet recycled.
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.recycled()
    }

    /// True if no packet was ever recycled more than once.
    pub fn no_double_recycle(&self) -> bool {
        self.recycles.lock().values().all(|&count| count <= 1)
    }
}

pub struct TrackedPacket {
    pub id: usize,
    pub payload: Vec<u8>,
    pub peer: Option<SocketAddr>,
    mode: ReceiveMode,
    ledger: Arc<Ledger>,
}

impl PooledPacket for TrackedPacket {
    fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize> {
        match self.mode {
            ReceiveMode::Socket => {
                let mut buf = [0u8; 2048];
                let (len, peer) = socket.recv_from(&mut buf)?;
                self.payload = buf[..len].to_vec();
                self.peer = Some(peer);
                Ok(len)
            }
            ReceiveMode::Fail(kind) => Err(io::Error::new(kind, "injected receive failure")),
            ReceiveMode::Panic => panic!("injected receive panic"),
        }
    }

    fn to_final(&self) -> FinalPacket {
        self.ledger.finalized.fetch_add(1, Ordering::SeqCst);
        FinalPacket::new(self.payload.clone(), self.peer)
    }

    fn recycle(self) {
        *self.ledger.recycles.lock().entry(self.id).or_insert(0) += 1;
    }
}

/// Pool double with an adjustable limit on outstanding packets.
pub struct TrackedPool {
    pub ledger: Arc<Ledger>,
    mode: Mutex<ReceiveMode>,
    limit: AtomicUsize,
}

impl TrackedPool {
    pub fn new(mode: ReceiveMode) -> Arc<Self> {
        Arc::new(Self {
            ledger: Arc::new(Ledger::default()),
            mode: Mutex::new(mode),
            limit: AtomicUsize::new(usize::MAX),
        })
    }

    pub fn set_mode(&self, mode: ReceiveMode) {
        *self.mode.lock() = mode;
    }

    /// Cap the number of packets that may be outstanding at once.
    pub fn set_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::SeqCst);
    }
}

impl PacketPool<TrackedPacket> for TrackedPool {
    fn acquire(&self) -> Option<TrackedPacket> {
        if self.ledger.outstanding() >= self.limit.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.ledger.acquired.fetch_add(1, Ordering::SeqCst);
        Some(TrackedPacket {
            id,
            payload: Vec::new(),
            peer: None,
            mode: *self.mode.lock(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

// ============================================================================
// Protocols
// ============================================================================

/// Rejects every packet in both directions.
pub struct RejectingProtocol;

impl Protocol<TrackedPacket> for RejectingProtocol {
    fn on_receive(&self, _packet: &mut TrackedPacket) -> Result<(), TransformError> {
        Err(TransformError::Rejected("checksum mismatch".into()))
    }

    fn on_send(&self, _packet: &mut TrackedPacket) -> Result<(), TransformError> {
        Err(TransformError::Malformed("no header".into()))
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

/// Loopback config on an ephemeral port.
pub fn loopback_config(capacity: usize, timeout: Duration) -> PipelineConfig {
    PipelineConfig::default()
        .bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        .capacity(capacity)
        .timeout(timeout)
}

/// Pipeline wired to `pool` and the given protocol, plus its registry.
pub fn tracked_pipeline_with_registry(
    config: PipelineConfig,
    pool: &Arc<TrackedPool>,
    protocol: Arc<dyn Protocol<TrackedPacket>>,
) -> (
    PacketPipeline<TrackedPacket>,
    Arc<ModuleRegistry<TrackedPacket>>,
) {
    let registry: Arc<ModuleRegistry<TrackedPacket>> = Arc::new(ModuleRegistry::new());
    registry.register_protocol(config.protocol_module_name.clone(), protocol);
    registry.register_packet_pool(config.packetpool_module_name.clone(), Arc::clone(pool) as _);
    let pipeline = PacketPipeline::new("test", config, Arc::clone(&registry) as _);
    (pipeline, registry)
}

/// Pipeline wired to `pool` and the given protocol.
pub fn tracked_pipeline(
    config: PipelineConfig,
    pool: &Arc<TrackedPool>,
    protocol: Arc<dyn Protocol<TrackedPacket>>,
) -> PacketPipeline<TrackedPacket> {
    tracked_pipeline_with_registry(config, pool, protocol).0
}

/// Pipeline with a passthrough protocol.
pub fn passthrough_pipeline(
    config: PipelineConfig,
    pool: &Arc<TrackedPool>,
) -> PacketPipeline<TrackedPacket> {
    tracked_pipeline(config, pool, Arc::new(Passthrough))
}

/// Send `payloads` to `target` from a fresh socket.
pub fn send_datagrams(target: SocketAddr, payloads: &[&[u8]]) -> SocketAddr {
    let peer = UdpSocket::bind("127.0.0.1:0").expect("bind peer");
    for payload in payloads {
        peer.send_to(payload, target).expect("send datagram");
    }
    peer.local_addr().expect("peer addr")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
