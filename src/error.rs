//! Error taxonomy shared by every protocol component.
//!
//! Only I/O failures and a failed handshake end a session.  The other kinds
//! describe traffic that was dropped or absent; the protocol loops check
//! [`TransportError::is_recoverable`], log them, and keep going.

use std::net::SocketAddr;

use thiserror::Error;

/// Malformed wire bytes.  The datagram is discarded by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// No `|` separates header from payload.
    #[error("missing header delimiter")]
    MissingDelimiter,
    /// Header bytes are not valid UTF-8 text.
    #[error("header is not valid text")]
    NotText,
    /// Header does not split into exactly eight comma-separated fields.
    #[error("expected 8 header fields, found {0}")]
    FieldCount(usize),
    /// A header field is not a decimal integer in range for its width.
    #[error("field `{field}` has invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Everything that can go wrong while moving segments across the channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Received bytes did not parse as a segment.
    #[error("malformed segment: {0}")]
    Framing(#[from] FramingError),

    /// Segment parsed but its checksum does not verify.
    #[error("checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { carried: u16, computed: u16 },

    /// Datagram arrived from someone other than the bound peer.
    #[error("datagram from unexpected peer {got} (expected {expected})")]
    AddressMismatch { expected: SocketAddr, got: SocketAddr },

    /// Nothing arrived within the receive timeout.
    #[error("timed out waiting for a datagram")]
    Timeout,

    /// The three-way handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    /// Channel or file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// `true` for kinds a protocol loop drops and moves past.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::HandshakeFailed(_))
    }
}
