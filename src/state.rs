//! Connection finite-state machine (FSM) types.
//!
//! Both roles walk a subset of the same diagram:
//!
//! ```text
//!  initiator:  CLOSED ──SYN──▶ SYN_SENT ──SYN-ACK/ACK──▶ ESTABLISHED
//!                                                          │ FIN
//!                                                          ▼
//!                                         CLOSED ◀──── FIN_WAIT
//!
//!  acceptor:   CLOSED ──▶ LISTEN ──SYN/SYN-ACK──▶ SYN_RECEIVED ──ACK──▶ ESTABLISHED
//!                                                                       │ peer FIN
//!                                                                       ▼
//!                                                      CLOSED ◀──── CLOSE_WAIT
//! ```
//!
//! Transitions are driven by [`crate::handshake`] and [`crate::teardown`].

/// All states a [`crate::connection::ConnectionContext`] can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; initial and final state.
    #[default]
    Closed,
    /// Acceptor waiting for a SYN.
    Listen,
    /// Initiator sent SYN, waiting for SYN-ACK.
    SynSent,
    /// Acceptor sent SYN-ACK, waiting for the final ACK.
    SynReceived,
    /// Handshake complete; data may flow.
    Established,
    /// Initiator sent FIN, waiting for FIN-ACK.
    FinWait,
    /// Acceptor saw the peer's FIN and answered with FIN-ACK.
    CloseWait,
}

impl ConnectionState {
    /// Short upper-case name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
    }

    #[test]
    fn display_uses_diagram_names() {
        assert_eq!(ConnectionState::SynReceived.to_string(), "SYN_RECEIVED");
        assert_eq!(ConnectionState::FinWait.to_string(), "FIN_WAIT");
    }
}
