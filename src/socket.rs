//! Datagram channel abstraction.
//!
//! The protocol only needs two primitives from the network: send a datagram
//! to an address, and receive one datagram with a timeout.  [`Channel`]
//! captures exactly that.  [`UdpChannel`] is the real thing, a thin wrapper
//! around `tokio::net::UdpSocket`; [`MemoryChannel`] is an in-process pair
//! used by tests and simulations.
//!
//! A receive that sees nothing within its timeout returns
//! [`TransportError::Timeout`], never an I/O error.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};

use crate::error::TransportError;
use crate::packet::Segment;

/// Receive buffer size.  Header text plus one MSS of payload fits easily.
pub const RECV_BUFFER: usize = 1024;

/// Unreliable, unordered datagram transport.
pub trait Channel {
    /// Address this endpoint receives on.
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram.  Delivery is not guaranteed.
    fn send_to(
        &self,
        bytes: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive one datagram (at most [`RECV_BUFFER`] bytes), waiting no
    /// longer than `timeout`.
    fn recv_from(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send;
}

/// Encode `segment` and send it to `dest`.
pub async fn send_segment<C: Channel>(
    channel: &C,
    segment: &Segment,
    dest: SocketAddr,
) -> Result<(), TransportError> {
    channel.send_to(&segment.encode(), dest).await
}

/// Receive and decode one segment.
///
/// When `expected_peer` is set, a datagram from any other address yields
/// [`TransportError::AddressMismatch`] without being decoded.  The checksum
/// is left for the caller to check.
pub async fn recv_segment<C: Channel>(
    channel: &C,
    expected_peer: Option<SocketAddr>,
    timeout: Duration,
) -> Result<(Segment, SocketAddr), TransportError> {
    let (bytes, from) = channel.recv_from(timeout).await?;
    if let Some(expected) = expected_peer {
        if from != expected {
            return Err(TransportError::AddressMismatch {
                expected,
                got: from,
            });
        }
    }
    let segment = Segment::decode(&bytes)?;
    Ok((segment, from))
}

// ---------------------------------------------------------------------------
// UDP
// ---------------------------------------------------------------------------

/// A [`Channel`] over a real UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    local_addr: SocketAddr,
    inner: UdpSocket,
}

impl UdpChannel {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Channel for UdpChannel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        match tokio::time::timeout(timeout, self.inner.recv_from(&mut buf)).await {
            Ok(Ok((n, addr))) => {
                buf.truncate(n);
                Ok((buf, addr))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_elapsed) => Err(TransportError::Timeout),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory pair
// ---------------------------------------------------------------------------

type Datagram = (Vec<u8>, SocketAddr);

/// One end of an in-process datagram link.
///
/// Datagrams sent to the other end's address are queued for it; datagrams
/// sent anywhere else vanish, as they would on a network with nobody
/// listening.  Once the other end is dropped, receives simply time out.
#[derive(Debug)]
pub struct MemoryChannel {
    local: SocketAddr,
    remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Datagram>,
    inbox: mpsc::UnboundedSender<Datagram>,
    inbound: Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemoryChannel {
    /// Create two connected endpoints bound to `a` and `b`.
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let end_a = Self {
            local: a,
            remote: b,
            outbound: b_tx.clone(),
            inbox: a_tx.clone(),
            inbound: Mutex::new(a_rx),
        };
        let end_b = Self {
            local: b,
            remote: a,
            outbound: a_tx,
            inbox: b_tx,
            inbound: Mutex::new(b_rx),
        };
        (end_a, end_b)
    }

    /// Queue a datagram on this endpoint as if it came from `from`.
    pub fn deliver(&self, bytes: impl Into<Vec<u8>>, from: SocketAddr) {
        let _ = self.inbox.send((bytes.into(), from));
    }
}

impl Channel for MemoryChannel {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if dest != self.remote {
            log::trace!("[mem] {} -> {dest}: no such endpoint, dropped", self.local);
            return Ok(());
        }
        let mut bytes = bytes.to_vec();
        bytes.truncate(RECV_BUFFER);
        // A vanished peer is not an error on a datagram link.
        let _ = self.outbound.send((bytes, self.local));
        Ok(())
    }

    async fn recv_from(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Ok(Some(datagram)) => Ok(datagram),
            Ok(None) | Err(_) => Err(TransportError::Timeout),
        }
    }
}
