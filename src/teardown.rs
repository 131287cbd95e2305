//! Connection close for both roles.
//!
//! ```text
//!  initiator                                   acceptor
//!     │ ── FIN seq=n ──────────────────────────▶ │  (receive loop stops)
//!     │ ◀──────────── FIN|ACK seq=m ack=n+1 ──── │
//!     │ ── ACK seq=n+1 ack=m+1 ───────────────▶ │
//!   Closed                                     Closed
//! ```
//!
//! The initiator re-sends its FIN after every failed attempt and gives up
//! after [`Config::max_teardown_retries`] attempts.  The acceptor answers
//! any repeated FIN with another FIN|ACK and waits at most one receive
//! timeout for the final ACK.  Either way both sides end up `Closed`; a
//! missing final exchange is reported, not treated as an error.

use tokio::time::Instant;

use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::error::TransportError;
use crate::packet::flags;
use crate::socket::{Channel, recv_segment, send_segment};
use crate::state::ConnectionState;

const FIN_PAYLOAD: &[u8] = b"closing";

/// How the initiator's close ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// FIN|ACK received and final ACK sent.
    Acknowledged,
    /// Retries exhausted without a FIN|ACK.
    GaveUp,
}

/// How the acceptor's close ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptCloseOutcome {
    FinalAck,
    NoFinalAck,
}

/// Active close after the send pipeline has finished.
pub async fn close<C: Channel>(
    channel: &C,
    ctx: &mut ConnectionContext,
    config: &Config,
) -> Result<CloseOutcome, TransportError> {
    let fin_seq = ctx.local_seq;
    let fin = ctx.segment(flags::FIN, fin_seq, ctx.local_ack, FIN_PAYLOAD);
    send_segment(channel, &fin, ctx.peer).await?;
    ctx.transition(ConnectionState::FinWait);
    log::info!("[teardown] → FIN seq={fin_seq}");

    let retries = config.max_teardown_retries;
    for attempt in 1..=retries {
        match recv_segment(channel, Some(ctx.peer), config.recv_timeout).await {
            Ok((seg, _)) => {
                let h = *seg.header();
                if seg.verify() && h.is_fin() && h.is_ack() {
                    log::info!("[teardown] ← FIN|ACK seq={} ack={}", h.seq, h.ack);
                    ctx.peer_ack = h.ack;
                    ctx.local_seq = fin_seq.wrapping_add(1);
                    ctx.local_ack = h.seq.wrapping_add(1);
                    let ack = ctx.segment(flags::ACK, ctx.local_seq, ctx.local_ack, Vec::new());
                    send_segment(channel, &ack, ctx.peer).await?;
                    log::info!("[teardown] → ACK; closed");
                    ctx.transition(ConnectionState::Closed);
                    return Ok(CloseOutcome::Acknowledged);
                }
                log::debug!(
                    "[teardown] ignoring flags={:#05b} valid={} while closing",
                    h.flags,
                    seg.verify()
                );
            }
            Err(TransportError::Timeout) => {
                log::info!("[teardown] no FIN|ACK (attempt {attempt}/{retries})");
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => log::debug!("[teardown] dropped while closing: {e}"),
        }
        if attempt < retries {
            send_segment(channel, &fin, ctx.peer).await?;
            log::debug!("[teardown] → FIN seq={fin_seq} (again)");
        }
    }

    log::warn!("[teardown] giving up after {retries} attempt(s)");
    ctx.transition(ConnectionState::Closed);
    Ok(CloseOutcome::GaveUp)
}

/// Passive close after the receive loop saw a FIN.
///
/// Expects `ctx.local_ack` to already acknowledge the FIN.
pub async fn accept_close<C: Channel>(
    channel: &C,
    ctx: &mut ConnectionContext,
    config: &Config,
) -> Result<AcceptCloseOutcome, TransportError> {
    ctx.transition(ConnectionState::CloseWait);
    let fin_ack = ctx.segment(flags::FIN | flags::ACK, ctx.local_seq, ctx.local_ack, Vec::new());
    send_segment(channel, &fin_ack, ctx.peer).await?;
    log::info!(
        "[teardown] → FIN|ACK seq={} ack={}",
        ctx.local_seq,
        ctx.local_ack
    );

    let deadline = Instant::now() + config.recv_timeout;
    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break AcceptCloseOutcome::NoFinalAck;
        }
        match recv_segment(channel, Some(ctx.peer), remaining).await {
            Ok((seg, _)) => {
                let h = *seg.header();
                if h.is_fin() && !h.is_ack() {
                    send_segment(channel, &fin_ack, ctx.peer).await?;
                    log::debug!("[teardown] repeated FIN; → FIN|ACK again");
                } else if h.is_ack() && seg.verify() {
                    log::info!("[teardown] ← ACK; closed");
                    ctx.peer_ack = h.ack;
                    break AcceptCloseOutcome::FinalAck;
                } else {
                    log::debug!("[teardown] ignoring flags={:#05b} while closing", h.flags);
                }
            }
            Err(TransportError::Timeout) => break AcceptCloseOutcome::NoFinalAck,
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => log::debug!("[teardown] dropped while closing: {e}"),
        }
    };

    if outcome == AcceptCloseOutcome::NoFinalAck {
        log::warn!("[teardown] no final ACK; closing anyway");
    }
    ctx.local_seq = ctx.local_seq.wrapping_add(1);
    ctx.transition(ConnectionState::Closed);
    Ok(outcome)
}
