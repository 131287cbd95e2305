//! Runtime configuration.
//!
//! [`Config`] carries every option the protocol recognizes and nothing else.
//! The two constructors give the defaults each role was deployed with; the
//! binary overrides individual fields from the command line.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_HEADER_LEN;
use crate::socket::RECV_BUFFER;

pub const DEFAULT_HOST: [u8; 4] = [127, 0, 0, 1];
pub const DEFAULT_SENDER_PORT: u16 = 8001;
pub const DEFAULT_RECEIVER_PORT: u16 = 8000;

/// Largest payload whose segment still fits one receive buffer.
pub const MAX_MSS: usize = RECV_BUFFER - MAX_HEADER_LEN;

/// Protocol options for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the peer lives.  The acceptor replaces this with whatever
    /// address sent the first SYN.
    pub peer: SocketAddr,
    /// Advertised window, in segments.  Also caps the congestion window at
    /// `window * mss`.
    pub window: u16,
    /// Maximum payload bytes per segment and the sequence-number stride.
    pub mss: u16,
    /// How long a single receive may block.
    pub recv_timeout: Duration,
    /// Age of the oldest unacknowledged segment that triggers Go-Back-N.
    pub rto: Duration,
    /// Chance that a data transmission is lost or corrupted.
    pub loss_probability: f64,
    /// Receive attempts the teardown initiator makes before giving up.
    pub max_teardown_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("mss must be at least 1 byte")]
    ZeroMss,
    #[error("mss {0} does not fit a datagram (max {max})", max = MAX_MSS)]
    MssTooLarge(u16),
    #[error("window must be at least 1 segment")]
    ZeroWindow,
    #[error("loss probability {0} is outside [0, 1]")]
    BadProbability(f64),
    #[error("{0} timeout must be non-zero")]
    ZeroTimeout(&'static str),
}

impl Config {
    /// Initiating side: talks to the receiver on the default port.
    pub fn sender() -> Self {
        Self {
            peer: SocketAddr::from((DEFAULT_HOST, DEFAULT_RECEIVER_PORT)),
            window: 9,
            mss: 15,
            recv_timeout: Duration::from_secs(20),
            rto: Duration::from_secs(60),
            loss_probability: 0.0,
            max_teardown_retries: 5,
        }
    }

    /// Accepting side: expects the sender on the default port.
    pub fn receiver() -> Self {
        Self {
            peer: SocketAddr::from((DEFAULT_HOST, DEFAULT_SENDER_PORT)),
            window: 4,
            mss: 15,
            recv_timeout: Duration::from_secs(180),
            ..Self::sender()
        }
    }

    /// Upper bound on the congestion window, in bytes.
    pub fn cwnd_cap(&self) -> u32 {
        u32::from(self.window) * u32::from(self.mss)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mss == 0 {
            return Err(ConfigError::ZeroMss);
        }
        if usize::from(self.mss) > MAX_MSS {
            return Err(ConfigError::MssTooLarge(self.mss));
        }
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::BadProbability(self.loss_probability));
        }
        if self.recv_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("receive"));
        }
        if self.rto.is_zero() {
            return Err(ConfigError::ZeroTimeout("retransmission"));
        }
        Ok(())
    }
}
