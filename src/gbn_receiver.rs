//! Go-Back-N receive side.
//!
//! [`GbnReceiver`] is the pure decision core: given an inbound segment it
//! says whether to deliver it, drop it, or stop because the peer closed.
//! [`receive`] is the I/O loop around it.  It delivers payloads to a
//! [`DeliveryLog`], sends one ACK per delivered segment and returns when a
//! FIN arrives or the channel stays silent for a whole receive timeout.
//!
//! | Inbound segment                       | Action                        |
//! |---------------------------------------|-------------------------------|
//! | FIN set                               | stop, peer closed             |
//! | `seq != expected`                     | drop silently                 |
//! | `seq == expected`, bad checksum       | drop silently                 |
//! | `seq == expected`, good checksum      | deliver, ACK, `expected += MSS` |
//!
//! Each ACK carries the accepted segment's own sequence number in its ack
//! field, which is what the sender matches against its window base.
//! Dropped segments are never acknowledged; the sender's timer recovers them.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionContext;
use crate::error::TransportError;
use crate::packet::{Segment, flags};
use crate::socket::{Channel, recv_segment, send_segment};

// ---------------------------------------------------------------------------
// Delivery log
// ---------------------------------------------------------------------------

/// Where in-order payloads end up.
pub trait DeliveryLog {
    fn append(&mut self, payload: &[u8]) -> io::Result<()>;
}

/// Collects payloads in memory, one entry per delivered segment.
impl DeliveryLog for Vec<Vec<u8>> {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        self.push(payload.to_vec());
        Ok(())
    }
}

impl<L: DeliveryLog + ?Sized> DeliveryLog for &mut L {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        (**self).append(payload)
    }
}

/// Appends one line per delivered payload to a text file.
///
/// The file is opened in append mode so runs accumulate.  Each line is
/// flushed immediately.
#[derive(Debug)]
pub struct FileLog {
    file: File,
}

impl FileLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl DeliveryLog for FileLog {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        self.file.write_all(payload)?;
        self.file.write_all(b"\n")?;
        self.file.flush()
    }
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// What to do with one inbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Deliver,
    OutOfOrder,
    Corrupt,
    Fin,
}

/// Expected-sequence tracking for one connection.
#[derive(Debug, Clone)]
pub struct GbnReceiver {
    expected: u32,
    stride: u32,
}

impl GbnReceiver {
    /// `expected` is the first data sequence number; `stride` is the peer's
    /// MSS.
    pub fn new(expected: u32, stride: u16) -> Self {
        Self {
            expected,
            stride: u32::from(stride.max(1)),
        }
    }

    /// Next sequence number that will be accepted.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn classify(&self, segment: &Segment) -> Disposition {
        let h = segment.header();
        if h.is_fin() {
            Disposition::Fin
        } else if h.seq != self.expected {
            Disposition::OutOfOrder
        } else if !segment.verify() {
            Disposition::Corrupt
        } else {
            Disposition::Deliver
        }
    }

    /// Move past the segment just delivered.
    pub fn on_delivered(&mut self) {
        self.expected = self.expected.wrapping_add(self.stride);
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Why the receive loop stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A FIN arrived; teardown should follow.
    PeerClosed { fin_seq: u32 },
    /// Nothing arrived for a whole receive timeout.
    #[default]
    Idle,
}

/// Summary of one receive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub outcome: ReceiveOutcome,
    pub delivered: usize,
    pub out_of_order: usize,
    pub corrupt: usize,
    /// Datagrams from an address other than the connected peer.
    pub foreign: usize,
    /// Datagrams that did not parse as segments.
    pub malformed: usize,
}

/// Run the receive loop on an established connection.
///
/// Only channel and log I/O failures are returned as errors; every other
/// problem with inbound traffic is counted and dropped.
pub async fn receive<C: Channel, L: DeliveryLog>(
    channel: &C,
    ctx: &mut ConnectionContext,
    recv_timeout: Duration,
    mut sink: L,
) -> Result<ReceiveReport, TransportError> {
    let mut rx = GbnReceiver::new(ctx.peer_seq, ctx.peer_mss);
    let mut report = ReceiveReport::default();
    log::info!("[gbn:rx] expecting seq={} from {}", rx.expected(), ctx.peer);

    loop {
        let segment = match recv_segment(channel, Some(ctx.peer), recv_timeout).await {
            Ok((segment, _)) => segment,
            Err(TransportError::Timeout) => {
                log::info!("[gbn:rx] nothing received for {recv_timeout:?}; giving up");
                report.outcome = ReceiveOutcome::Idle;
                return Ok(report);
            }
            Err(TransportError::AddressMismatch { got, .. }) => {
                log::debug!("[gbn:rx] ignoring datagram from {got}");
                report.foreign += 1;
                continue;
            }
            Err(TransportError::Framing(e)) => {
                log::debug!("[gbn:rx] malformed datagram: {e}");
                report.malformed += 1;
                continue;
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                log::debug!("[gbn:rx] dropped datagram: {e}");
                continue;
            }
        };

        let h = *segment.header();
        match rx.classify(&segment) {
            Disposition::Fin => {
                log::info!("[gbn:rx] ← FIN seq={}", h.seq);
                ctx.peer_seq = h.seq.wrapping_add(1);
                ctx.local_ack = ctx.peer_seq;
                report.outcome = ReceiveOutcome::PeerClosed { fin_seq: h.seq };
                return Ok(report);
            }
            Disposition::OutOfOrder => {
                log::debug!("[gbn:rx] dropped seq={} (want {})", h.seq, rx.expected());
                report.out_of_order += 1;
            }
            Disposition::Corrupt => {
                if let Err(e) = segment.check() {
                    log::debug!("[gbn:rx] dropped seq={}: {e}", h.seq);
                }
                report.corrupt += 1;
            }
            Disposition::Deliver => {
                sink.append(segment.payload())?;
                ctx.local_ack = h.seq;
                let ack = ctx.segment(flags::ACK, ctx.local_seq, ctx.local_ack, Vec::new());
                send_segment(channel, &ack, ctx.peer).await?;
                log::debug!("[gbn:rx] ← seq={} delivered, → ACK {}", h.seq, h.seq);
                ctx.local_seq = ctx.local_seq.wrapping_add(1);
                rx.on_delivered();
                ctx.peer_seq = rx.expected();
                report.delivered += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
