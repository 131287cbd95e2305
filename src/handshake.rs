//! Three-way handshake for both roles.
//!
//! ```text
//!  initiator                                   acceptor
//!     │ ── SYN seq=x ──────────────────────────▶ │  (learns peer address)
//!     │ ◀──────────── SYN|ACK seq=y ack=x+1 ──── │
//!     │ ── ACK seq=x+1 ack=y+1 ───────────────▶ │
//!  data starts at x+2                 expects data at x+2
//! ```
//!
//! Each side makes exactly one attempt.  A missing, malformed, corrupt,
//! misaddressed or otherwise non-matching reply fails the attempt with
//! [`TransportError::HandshakeFailed`]; retrying is the caller's business.
//!
//! Addresses are compared, never authenticated: the acceptor binds to
//! whichever address sent the first valid SYN.

use std::ops::RangeInclusive;

use rand::Rng;

use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::error::TransportError;
use crate::packet::flags;
use crate::socket::{Channel, recv_segment, send_segment};
use crate::state::ConnectionState;

/// Initial sequence numbers are drawn from this range.
pub const ISN_RANGE: RangeInclusive<u32> = 0..=2000;

const SYN_PAYLOAD: &[u8] = b"hello, may I connect?";
const ACK_PAYLOAD: &[u8] = b"connected";

/// Active open with a random initial sequence number.
pub async fn connect<C: Channel>(
    channel: &C,
    config: &Config,
) -> Result<ConnectionContext, TransportError> {
    let isn = rand::rng().random_range(ISN_RANGE);
    connect_with_isn(channel, config, isn).await
}

/// Active open with a caller-chosen initial sequence number.
pub async fn connect_with_isn<C: Channel>(
    channel: &C,
    config: &Config,
    isn: u32,
) -> Result<ConnectionContext, TransportError> {
    let mut ctx = ConnectionContext::pending(
        config.peer,
        channel.local_addr().port(),
        config.window,
        config.mss,
    );

    ctx.local_seq = isn;
    let syn = ctx.segment(flags::SYN, isn, 0, SYN_PAYLOAD);
    send_segment(channel, &syn, ctx.peer).await?;
    ctx.transition(ConnectionState::SynSent);
    log::info!("[handshake] → SYN seq={isn} to {}", ctx.peer);

    let reply = match recv_segment(channel, Some(ctx.peer), config.recv_timeout).await {
        Ok((seg, _)) => seg,
        Err(e) if !e.is_recoverable() => return Err(e),
        Err(e) => {
            log::warn!("[handshake] no usable SYN-ACK: {e}");
            return Err(TransportError::HandshakeFailed("no SYN-ACK from peer"));
        }
    };

    let h = *reply.header();
    if !reply.verify() {
        log::warn!("[handshake] SYN-ACK failed checksum");
        return Err(TransportError::HandshakeFailed("corrupt SYN-ACK"));
    }
    if !(h.is_syn() && h.is_ack() && h.ack == isn.wrapping_add(1)) {
        log::warn!(
            "[handshake] expected SYN|ACK ack={}, got flags={:#05b} ack={}",
            isn.wrapping_add(1),
            h.flags,
            h.ack
        );
        return Err(TransportError::HandshakeFailed("unexpected reply to SYN"));
    }
    log::info!("[handshake] ← SYN|ACK seq={} ack={}", h.seq, h.ack);

    ctx.peer_ack = h.ack;
    ctx.peer_window = h.window;
    ctx.peer_mss = h.mss;
    ctx.local_seq = isn.wrapping_add(1);
    ctx.local_ack = h.seq.wrapping_add(1);
    ctx.peer_seq = h.seq.wrapping_add(1);

    let ack = ctx.segment(flags::ACK, ctx.local_seq, ctx.local_ack, ACK_PAYLOAD);
    send_segment(channel, &ack, ctx.peer).await?;
    log::info!(
        "[handshake] → ACK seq={} ack={}; established",
        ctx.local_seq,
        ctx.local_ack
    );

    // The handshake ACK consumes one sequence number.
    ctx.local_seq = h.ack.wrapping_add(1);
    ctx.transition(ConnectionState::Established);
    Ok(ctx)
}

/// Passive open with a random initial sequence number.
pub async fn accept<C: Channel>(
    channel: &C,
    config: &Config,
) -> Result<ConnectionContext, TransportError> {
    let isn = rand::rng().random_range(ISN_RANGE);
    accept_with_isn(channel, config, isn).await
}

/// Passive open with a caller-chosen initial sequence number.
///
/// Waits up to `config.recv_timeout` per receive for a valid SYN from any
/// address, skipping anything else that arrives in the meantime.
pub async fn accept_with_isn<C: Channel>(
    channel: &C,
    config: &Config,
    isn: u32,
) -> Result<ConnectionContext, TransportError> {
    let mut ctx = ConnectionContext::pending(
        config.peer,
        channel.local_addr().port(),
        config.window,
        config.mss,
    );
    ctx.transition(ConnectionState::Listen);
    log::info!("[handshake] listening on {}", channel.local_addr());

    let (syn, from) = loop {
        match recv_segment(channel, None, config.recv_timeout).await {
            Ok((seg, from)) if seg.header().is_syn() && seg.verify() => break (seg, from),
            Ok((seg, from)) => {
                log::debug!(
                    "[handshake] ignoring non-SYN from {from} (flags={:#05b}, valid={})",
                    seg.header().flags,
                    seg.verify()
                );
            }
            Err(TransportError::Timeout) => {
                log::warn!("[handshake] no SYN before idle timeout");
                return Err(TransportError::HandshakeFailed("no SYN received"));
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => log::debug!("[handshake] dropped datagram while listening: {e}"),
        }
    };

    let h = *syn.header();
    log::info!("[handshake] ← SYN seq={} from {from}", h.seq);
    ctx.peer = from;
    ctx.peer_window = h.window;
    ctx.peer_mss = h.mss;
    ctx.peer_seq = h.seq.wrapping_add(1);
    ctx.local_seq = isn;
    ctx.local_ack = h.seq.wrapping_add(1);

    let syn_ack = ctx.segment(flags::SYN | flags::ACK, isn, ctx.local_ack, Vec::new());
    send_segment(channel, &syn_ack, ctx.peer).await?;
    ctx.transition(ConnectionState::SynReceived);
    log::info!("[handshake] → SYN|ACK seq={isn} ack={}", ctx.local_ack);

    let ack = match recv_segment(channel, Some(ctx.peer), config.recv_timeout).await {
        Ok((seg, _)) => seg,
        Err(e) if !e.is_recoverable() => return Err(e),
        Err(e) => {
            log::warn!("[handshake] no usable final ACK: {e}");
            return Err(TransportError::HandshakeFailed("no final ACK from peer"));
        }
    };

    let h = *ack.header();
    if !(ack.verify() && h.is_ack() && h.ack == isn.wrapping_add(1)) {
        log::warn!(
            "[handshake] expected ACK ack={}, got flags={:#05b} ack={} valid={}",
            isn.wrapping_add(1),
            h.flags,
            h.ack,
            ack.verify()
        );
        return Err(TransportError::HandshakeFailed("unexpected final ACK"));
    }
    log::info!("[handshake] ← ACK seq={} ack={}; established", h.seq, h.ack);

    ctx.peer_ack = h.ack;
    ctx.local_seq = isn.wrapping_add(1);
    // First data segment follows the handshake ACK.
    ctx.peer_seq = h.seq.wrapping_add(1);
    ctx.transition(ConnectionState::Established);
    Ok(ctx)
}
