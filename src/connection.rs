//! Per-connection state record.
//!
//! A [`ConnectionContext`] holds the negotiated parameters and running
//! sequence/ack numbers of one logical connection.  It is owned by exactly one
//! side of that connection and handed by `&mut` from the handshake to the
//! data-transfer stage and then to teardown.  Nothing else shares it.

use std::net::SocketAddr;

use crate::packet::{Header, Segment};
use crate::state::ConnectionState;

/// Negotiated and running state of a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Current FSM state.  The connection is live only in `Established`.
    pub state: ConnectionState,

    /// Remote peer.  For an acceptor this is learned from the first SYN.
    pub peer: SocketAddr,
    /// Port stamped into `source_port` of every outbound segment.
    pub local_port: u16,

    /// Window (segments) we advertise.
    pub local_window: u16,
    /// MSS we advertise; also our own sequence stride when sending data.
    pub local_mss: u16,

    /// Our next sequence number.
    pub local_seq: u32,
    /// Acknowledgement number we put in outbound segments.
    pub local_ack: u32,
    /// Next sequence number we expect from the peer.
    pub peer_seq: u32,
    /// Last acknowledgement number the peer sent us.
    pub peer_ack: u32,

    /// Window the peer advertised.
    pub peer_window: u16,
    /// MSS the peer advertised; the stride of the peer's data segments.
    pub peer_mss: u16,
}

impl ConnectionContext {
    /// Context for a handshake that has not completed yet.
    ///
    /// All sequence fields are zero and the state is `Closed` until
    /// [`crate::handshake`] moves it along.
    pub fn pending(peer: SocketAddr, local_port: u16, local_window: u16, local_mss: u16) -> Self {
        Self {
            state: ConnectionState::Closed,
            peer,
            local_port,
            local_window,
            local_mss,
            local_seq: 0,
            local_ack: 0,
            peer_seq: 0,
            peer_ack: 0,
            peer_window: 0,
            peer_mss: 0,
        }
    }

    /// `true` once the handshake has completed and until teardown starts.
    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Build an outbound segment addressed to the peer with our advertised
    /// window and MSS.
    pub fn segment(&self, flags: u8, seq: u32, ack: u32, payload: impl Into<Vec<u8>>) -> Segment {
        Segment::new(
            Header {
                source_port: self.local_port,
                dest_port: self.peer.port(),
                seq,
                ack,
                window: self.local_window,
                mss: self.local_mss,
                flags,
            },
            payload,
        )
    }

    pub(crate) fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            log::debug!("[conn] {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::flags;

    fn ctx() -> ConnectionContext {
        ConnectionContext::pending("127.0.0.1:8000".parse().unwrap(), 8001, 9, 15)
    }

    #[test]
    fn pending_context_is_not_live() {
        let c = ctx();
        assert_eq!(c.state, ConnectionState::Closed);
        assert!(!c.is_live());
    }

    #[test]
    fn established_context_is_live() {
        let mut c = ctx();
        c.transition(ConnectionState::Established);
        assert!(c.is_live());
        c.transition(ConnectionState::FinWait);
        assert!(!c.is_live());
    }

    #[test]
    fn segment_is_addressed_to_peer() {
        let seg = ctx().segment(flags::ACK, 5, 6, "x");
        let h = seg.header();
        assert_eq!(h.source_port, 8001);
        assert_eq!(h.dest_port, 8000);
        assert_eq!((h.seq, h.ack), (5, 6));
        assert_eq!((h.window, h.mss), (9, 15));
        assert!(h.is_ack());
        assert!(seg.verify());
    }
}
