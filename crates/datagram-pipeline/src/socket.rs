// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP endpoint owned by a started pipeline.
//!
//! Receives are performed exclusively by the pump; sends may come from any
//! number of threads and are serialized by the kernel.

use crate::error::PipelineError;
use crate::packet::{Envelope, PooledPacket};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{Shutdown, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bound UDP socket with a receive timeout and an explicit closed state.
#[derive(Debug)]
pub struct SocketResource {
    socket: UdpSocket,
    local_addr: SocketAddr,
    timeout: Duration,
    closed: AtomicBool,
}

impl SocketResource {
    /// Bind `addr` and apply `timeout` to blocking receives.
    ///
    /// The port is bound exclusively: a port already in use fails with
    /// `AddrInUse`.
    pub fn open(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let socket2 = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket2.bind(&addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(timeout))?;
        let local_addr = socket.local_addr()?;
        log::debug!(
            "[SOCKET] bound addr={} timeout={}ms",
            local_addr,
            timeout.as_millis()
        );

        Ok(Self {
            socket,
            local_addr,
            timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Let `packet` perform one blocking receive.
    ///
    /// Returns [`PipelineError::Closed`] once the socket has been closed, even
    /// when the close interrupted a receive already in flight.
    pub fn receive_into<P: PooledPacket>(&self, packet: &mut P) -> Result<usize, PipelineError> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        let result = packet.receive(&self.socket);
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        result.map_err(PipelineError::Io)
    }

    /// Transmit one datagram.
    pub fn send(&self, envelope: Envelope<'_>) -> Result<usize, PipelineError> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        let sent = self.socket.send_to(envelope.bytes, envelope.destination)?;
        log::trace!("[SOCKET] send dest={} len={}", envelope.destination, sent);
        Ok(sent)
    }

    /// Close the endpoint and wake any receive blocked on it.
    ///
    /// Idempotent. The descriptor itself is released when the last owner drops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Linux wakes blocked readers on shutdown even for unconnected UDP
        // sockets while reporting ENOTCONN; other platforms fall back to the
        // read timeout.
        match SockRef::from(&self.socket).shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => log::debug!("[SOCKET] shutdown addr={} err={}", self.local_addr, e),
        }
        log::debug!("[SOCKET] closed addr={}", self.local_addr);
    }
}

impl Drop for SocketResource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FinalPacket;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct Scratch {
        buf: Vec<u8>,
    }

    impl PooledPacket for Scratch {
        fn receive(&mut self, socket: &UdpSocket) -> io::Result<usize> {
            let mut buf = [0u8; 256];
            let (len, _) = socket.recv_from(&mut buf)?;
            self.buf = buf[..len].to_vec();
            Ok(len)
        }

        fn to_final(&self) -> FinalPacket {
            FinalPacket::new(self.buf.clone(), None)
        }

        fn recycle(self) {}
    }

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[test]
    fn test_receive_times_out() {
        let socket = SocketResource::open(loopback(), Duration::from_millis(30)).expect("bind");
        let mut packet = Scratch::default();

        let start = Instant::now();
        let err = socket.receive_into(&mut packet).expect_err("nothing sent");
        assert!(matches!(err, PipelineError::Io(ref e) if crate::error::is_timeout(e)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_port_in_use_is_rejected() {
        let first = SocketResource::open(loopback(), Duration::from_millis(30)).expect("bind");
        let taken = first.local_addr();

        let err = SocketResource::open(taken, Duration::from_millis(30)).expect_err("port taken");
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[test]
    fn test_send_and_receive() {
        let socket = SocketResource::open(loopback(), Duration::from_millis(500)).expect("bind");
        let envelope = Envelope {
            bytes: b"loop",
            destination: socket.local_addr(),
        };
        assert_eq!(socket.send(envelope).expect("send"), 4);

        let mut packet = Scratch::default();
        assert_eq!(socket.receive_into(&mut packet).expect("receive"), 4);
        assert_eq!(packet.buf, b"loop");
    }

    #[test]
    fn test_closed_socket_refuses_io() {
        let socket = SocketResource::open(loopback(), Duration::from_millis(30)).expect("bind");
        socket.close();
        socket.close();
        assert!(socket.is_closed());

        let mut packet = Scratch::default();
        assert!(matches!(
            socket.receive_into(&mut packet),
            Err(PipelineError::Closed)
        ));
        let envelope = Envelope {
            bytes: b"x",
            destination: socket.local_addr(),
        };
        assert!(matches!(socket.send(envelope), Err(PipelineError::Closed)));
    }

    #[test]
    fn test_close_unblocks_receiver() {
        let socket = Arc::new(
            SocketResource::open(loopback(), Duration::from_millis(800)).expect("bind"),
        );
        let receiver = {
            let socket = Arc::clone(&socket);
            thread::spawn(move || {
                let mut packet = Scratch::default();
                socket.receive_into(&mut packet)
            })
        };

        thread::sleep(Duration::from_millis(50));
        socket.close();

        let result = receiver.join().expect("receiver thread");
        assert!(matches!(result, Err(PipelineError::Closed)));
    }
}
