//! `gbn-transport`: a TCP-like reliable byte stream over an unreliable
//! datagram channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────────┐  DATA (fault-injected)   ┌───────────────┐
//!  │ SenderPipeline│─────────────────────────▶│  GbnReceiver  │──▶ DeliveryLog
//!  │ + Congestion  │◀─────────────────────────│               │
//!  └──────┬────────┘          ACKs            └──────┬────────┘
//!         │  handshake / teardown                    │
//!  ┌──────▼──────────────────────────────────────────▼───────┐
//!  │        ConnectionContext (one per side, by &mut)         │
//!  └──────┬──────────────────────────────────────────────────┘
//!         │ text-encoded segments
//!  ┌──────▼──────┐
//!  │   Channel   │  UdpChannel (tokio UdpSocket) or MemoryChannel
//!  └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        wire format and checksum
//! - [`error`]         error taxonomy
//! - [`state`]         connection FSM states
//! - [`connection`]    per-connection context
//! - [`socket`]        datagram channel abstraction
//! - [`simulator`]     loss/corruption injection for outbound data
//! - [`handshake`]     three-way open for both roles
//! - [`congestion`]    slow start / congestion avoidance
//! - [`gbn_sender`]    Go-Back-N send pipeline and sent-packet ledger
//! - [`gbn_receiver`]  in-order receive loop and delivery log
//! - [`teardown`]      FIN exchange for both roles
//! - [`config`]        protocol options and role defaults
//! - [`session`]       handshake + transfer + teardown in one call

pub mod config;
pub mod congestion;
pub mod connection;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod handshake;
pub mod packet;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod teardown;
