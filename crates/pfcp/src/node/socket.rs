// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket owned by a local node.
//!
//! The socket is built with `socket2` so the buffer sizes from
//! [`Config`](crate::Config) can be applied before bind, then handed to mio
//! for the Communication stage's poll loop. The local node uniquely owns its
//! socket; the Communication stage only borrows it to register, send, and
//! receive.

use crate::error::{Error, Result};
use mio::net::UdpSocket;
use mio::{Interest, Registry, Token};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

/// Non-blocking UDP socket bound to one local node address.
pub(crate) struct NodeSocket {
    inner: Mutex<UdpSocket>,
    local_addr: SocketAddr,
}

impl NodeSocket {
    /// Create, size, and bind the socket (dual-stack capable: the domain
    /// follows the bind address family).
    pub(crate) fn bind(addr: SocketAddr, buffer_size: usize) -> Result<Self> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::BindFailed(format!("socket({}): {}", addr, e)))?;

        if let Err(e) = socket.set_recv_buffer_size(buffer_size) {
            log::warn!("[COMM] set_recv_buffer_size({}) failed: {}", buffer_size, e);
        }
        if let Err(e) = socket.set_send_buffer_size(buffer_size) {
            log::warn!("[COMM] set_send_buffer_size({}) failed: {}", buffer_size, e);
        }

        socket
            .bind(&addr.into())
            .map_err(|e| Error::BindFailed(format!("bind({}): {}", addr, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::BindFailed(format!("set_nonblocking({}): {}", addr, e)))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let local_addr = std_socket.local_addr().map_err(Error::Io)?;
        log::debug!("[COMM] bound node socket addr={}", local_addr);

        Ok(Self { inner: Mutex::new(UdpSocket::from_std(std_socket)), local_addr })
    }

    /// The address the socket actually bound (port resolved when 0 was asked).
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn register(&self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut *self.inner.lock(), token, Interest::READABLE)
    }

    pub(crate) fn deregister(&self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut *self.inner.lock())
    }

    pub(crate) fn send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.lock().send_to(data, target)
    }

    pub(crate) fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.lock().recv_from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_resolves_ephemeral_port() {
        let socket = NodeSocket::bind("127.0.0.1:0".parse().unwrap(), 64 * 1024)
            .expect("bind should succeed");
        assert_ne!(socket.local_addr().port(), 0);
    }

    #[test]
    fn test_send_and_recv_roundtrip() {
        let a = NodeSocket::bind("127.0.0.1:0".parse().unwrap(), 64 * 1024)
            .expect("bind should succeed");
        let b = std::net::UdpSocket::bind("127.0.0.1:0").expect("peer bind should succeed");

        a.send_to(b"ping", b.local_addr().unwrap()).expect("send should succeed");

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).expect("recv should succeed");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.local_addr());
    }

    #[test]
    fn test_nonblocking_recv_would_block() {
        let socket = NodeSocket::bind("127.0.0.1:0".parse().unwrap(), 64 * 1024)
            .expect("bind should succeed");
        let mut buf = [0u8; 16];
        let err = socket.recv_from(&mut buf).expect_err("empty socket should not block");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
