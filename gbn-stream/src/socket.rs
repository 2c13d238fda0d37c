//! Datagram transport abstraction.
//!
//! The drivers in [`crate::gbn_connection`] only need two things from the
//! network: send one datagram to an address, and wait a bounded time for the
//! next datagram.  [`Transport`] captures exactly that so the same driver
//! runs over a real [`UdpTransport`] or the in-memory
//! [`crate::simulator::SimTransport`].
//!
//! Transports move raw bytes; encoding and decoding [`crate::packet::Segment`]
//! is the driver's job, so a malformed datagram is a protocol event rather
//! than a transport error.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// Maximum UDP payload size.
const MAX_DATAGRAM: usize = 65_535;

/// A connectionless, unreliable datagram pipe.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send `bytes` as one datagram to `peer`.
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// Wait up to `wait` for the next datagram.
    ///
    /// `Ok(None)` means the wait elapsed with nothing to read.  A zero
    /// `wait` returns whatever is already queued without blocking.
    async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>>;

    /// Address this end is reachable at.
    fn local_addr(&self) -> SocketAddr;
}

/// [`Transport`] over a tokio UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    local_addr: SocketAddr,
    inner: UdpSocket,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        log::debug!("bound UDP socket on {local_addr}");
        Ok(Self {
            local_addr,
            inner,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> io::Result<()> {
        self.inner.send_to(bytes, peer).await?;
        Ok(())
    }

    async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        let received = if wait.is_zero() {
            match self.inner.try_recv_from(&mut self.buf) {
                Ok(got) => Some(got),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
                Err(e) => return Err(e),
            }
        } else {
            match tokio::time::timeout(wait, self.inner.recv_from(&mut self.buf)).await {
                Ok(got) => Some(got?),
                Err(_elapsed) => None,
            }
        };
        Ok(received.map(|(n, from)| (self.buf[..n].to_vec(), from)))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
