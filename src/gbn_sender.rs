//! Go-Back-N send pipeline with slow-start congestion control.
//!
//! The application stream is cut into MSS-sized chunks up front.  Chunk `i`
//! carries sequence number `initial + i * MSS` regardless of its real length,
//! so the final, possibly shorter, chunk still occupies a full stride.
//!
//! # Window layout
//!
//! ```text
//!   base                  last                       end
//!    │                     │                          │
//!  ──┼─────────────────────┼───────────┬──────────────┼──▶ seq space
//!    │ <─ in flight / sendable ──────▶ │   not yet    │
//!    oldest unacked        min(base + cwnd, final chunk)
//! ```
//!
//! Each cycle transmits every chunk in `[base, last]` that is not in the
//! [`SentLedger`] yet, then waits for the ACK naming `base`.  A cycle ends
//! when `base` moves past the cycle's `last`, or when the ledger timestamp of
//! `base` is older than the retransmission timeout.  A timeout collapses the
//! congestion window and resends every unacknowledged ledgered chunk in
//! `[base, last]` (the "go back N" step).
//!
//! The retransmission timer is only checked between receives, so a timeout
//! can fire up to one receive timeout late.
//!
//! Sequence numbers are not wrapped: a transfer must fit in the 32-bit space
//! above its initial sequence number.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;
use crate::congestion::{CongestionController, CwndSample};
use crate::connection::ConnectionContext;
use crate::error::TransportError;
use crate::simulator::{Fault, FaultInjector};
use crate::socket::{Channel, recv_segment, send_segment};

// ---------------------------------------------------------------------------
// Sent-packet ledger
// ---------------------------------------------------------------------------

/// One chunk that has entered the window.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Time of the latest transmission, or of the ACK that made this chunk
    /// the window base.
    pub sent_at: Instant,
    /// Connection state at first transmission; retransmissions reuse it.
    pub snapshot: ConnectionContext,
    pub payload: Vec<u8>,
    pub acked: bool,
    /// How many times this chunk was handed to the fault injector.
    pub transmissions: u32,
}

/// Sequence number → in-flight chunk, for one transfer.
#[derive(Debug, Default)]
pub struct SentLedger {
    entries: BTreeMap<u32, LedgerEntry>,
}

impl SentLedger {
    pub fn insert(&mut self, seq: u32, snapshot: ConnectionContext, payload: Vec<u8>) {
        self.entries.insert(
            seq,
            LedgerEntry {
                sent_at: Instant::now(),
                snapshot,
                payload,
                acked: false,
                transmissions: 1,
            },
        );
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn get(&self, seq: u32) -> Option<&LedgerEntry> {
        self.entries.get(&seq)
    }

    /// Restart the timer of `seq` without counting a transmission.
    pub fn refresh(&mut self, seq: u32, now: Instant) {
        if let Some(e) = self.entries.get_mut(&seq) {
            e.sent_at = now;
        }
    }

    fn record_retransmission(&mut self, seq: u32, now: Instant) {
        if let Some(e) = self.entries.get_mut(&seq) {
            e.sent_at = now;
            e.transmissions += 1;
        }
    }

    pub fn mark_acked(&mut self, seq: u32) {
        if let Some(e) = self.entries.get_mut(&seq) {
            e.acked = true;
        }
    }

    /// Time since `seq` was last (re)sent or refreshed.
    pub fn age(&self, seq: u32, now: Instant) -> Option<Duration> {
        self.entries
            .get(&seq)
            .map(|e| now.saturating_duration_since(e.sent_at))
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How a wait cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// `base` moved past the cycle's upper bound (or the transfer finished).
    Cleared,
    /// The base chunk's timer expired; the window was resent.
    TimedOut {
        /// Whether any ACK was accepted during the cycle.
        advanced: bool,
    },
}

/// Summary of one completed transfer.
#[derive(Debug, Clone, Default)]
pub struct SendReport {
    /// Number of chunks the stream was cut into.
    pub chunks: usize,
    /// First transmissions, one per chunk.
    pub transmissions: usize,
    /// Go-Back-N resends.
    pub retransmissions: usize,
    /// Expired retransmission timers.
    pub timeouts: usize,
    pub simulated_losses: usize,
    pub simulated_corruptions: usize,
    /// Sequence numbers in the order the window base moved past them.
    pub acknowledged: Vec<u32>,
    /// Congestion-window series for plotting.
    pub cwnd_history: Vec<CwndSample>,
}

enum AckOutcome {
    Accepted,
    Ignored,
    NothingYet,
}

/// Cut `data` into consecutive chunks of at most `mss` bytes.
pub fn chunk(data: &[u8], mss: u16) -> Vec<Vec<u8>> {
    data.chunks(usize::from(mss.max(1)))
        .map(<[u8]>::to_vec)
        .collect()
}

// ---------------------------------------------------------------------------
// SenderPipeline
// ---------------------------------------------------------------------------

/// Send side of one transfer over an established connection.
pub struct SenderPipeline<'a, C, F> {
    channel: &'a C,
    ctx: &'a mut ConnectionContext,
    faults: F,
    rto: Duration,
    recv_timeout: Duration,
    mss: u32,
    chunks: Vec<Vec<u8>>,
    initial: u32,
    end: u32,
    base: u32,
    last: u32,
    cc: CongestionController,
    ledger: SentLedger,
    report: SendReport,
}

impl<'a, C: Channel, F: FaultInjector> SenderPipeline<'a, C, F> {
    /// Prepare to send `data`, starting at `ctx.local_seq`.
    ///
    /// Fails unless the connection is established.
    pub fn new(
        channel: &'a C,
        ctx: &'a mut ConnectionContext,
        config: &Config,
        faults: F,
        data: &[u8],
    ) -> Result<Self, TransportError> {
        if !ctx.is_live() {
            return Err(TransportError::HandshakeFailed("connection is not established"));
        }

        let mss = u32::from(ctx.local_mss.max(1));
        let chunks = chunk(data, ctx.local_mss);
        let initial = ctx.local_seq;
        let end = initial.saturating_add(mss.saturating_mul(chunks.len() as u32));

        Ok(Self {
            channel,
            faults,
            rto: config.rto,
            recv_timeout: config.recv_timeout,
            mss,
            initial,
            end,
            base: initial,
            last: initial,
            cc: CongestionController::new(ctx.local_mss, config.cwnd_cap()),
            ledger: SentLedger::default(),
            report: SendReport {
                chunks: chunks.len(),
                ..SendReport::default()
            },
            chunks,
            ctx,
        })
    }

    /// Oldest unacknowledged sequence number.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Upper edge of the current window.
    pub fn last(&self) -> u32 {
        self.last
    }

    /// One stride past the final chunk; the transfer is done when `base`
    /// gets here.
    pub fn end_sequence(&self) -> u32 {
        self.end
    }

    pub fn is_complete(&self) -> bool {
        self.base >= self.end
    }

    pub fn congestion(&self) -> &CongestionController {
        &self.cc
    }

    pub fn ledger(&self) -> &SentLedger {
        &self.ledger
    }

    /// Drive the transfer to completion.
    pub async fn run(mut self) -> Result<SendReport, TransportError> {
        log::info!(
            "[gbn] sending {} chunk(s) seq {}..{} to {}",
            self.chunks.len(),
            self.initial,
            self.end,
            self.ctx.peer
        );
        while !self.is_complete() {
            self.fill_window().await?;
            self.await_window().await?;
        }
        self.ctx.local_seq = self.end;
        self.cc.sample();
        log::info!(
            "[gbn] transfer complete: {} retransmission(s), {} timeout(s)",
            self.report.retransmissions,
            self.report.timeouts
        );

        let mut report = self.report;
        report.cwnd_history = self.cc.into_history();
        Ok(report)
    }

    /// Transmit every chunk in `[base, last]` that has not been sent yet.
    /// Returns how many were sent.
    pub async fn fill_window(&mut self) -> Result<usize, TransportError> {
        if self.is_complete() {
            return Ok(0);
        }
        self.last = self.window_end(self.base);
        log::debug!(
            "[gbn] window base={} last={} cwnd={}",
            self.base,
            self.last,
            self.cc.window()
        );

        let mut sent = 0;
        let mut seq = self.base;
        while seq <= self.last {
            if !self.ledger.contains(seq) {
                let payload = self.chunks[self.index_of(seq)].clone();
                self.ctx.local_seq = seq;
                let snapshot = self.ctx.clone();
                self.transmit(&snapshot, &payload, false).await?;
                self.ledger.insert(seq, snapshot, payload);
                self.report.transmissions += 1;
                sent += 1;
            }
            seq += self.mss;
        }
        Ok(sent)
    }

    /// Wait for ACKs until the window clears or the base chunk times out.
    pub async fn await_window(&mut self) -> Result<WindowOutcome, TransportError> {
        let start_base = self.base;
        let bound = self.last;

        loop {
            if self.is_complete() || self.base > bound {
                return Ok(WindowOutcome::Cleared);
            }
            let expired = self
                .ledger
                .age(self.base, Instant::now())
                .is_none_or(|age| age >= self.rto);
            if expired {
                break;
            }
            if let AckOutcome::Accepted = self.await_ack().await? {
                self.advance();
            }
        }

        let advanced = self.base != start_base;
        self.report.timeouts += 1;
        log::info!(
            "[gbn] timeout on seq={} (advanced={advanced}); going back to base",
            self.base
        );
        self.cc.on_timeout();
        if !advanced {
            self.cc.on_stall();
        }
        self.retransmit_window().await?;
        Ok(WindowOutcome::TimedOut { advanced })
    }

    fn window_end(&self, base: u32) -> u32 {
        let final_seq = self.end.saturating_sub(self.mss);
        base.saturating_add(self.cc.window()).min(final_seq)
    }

    fn index_of(&self, seq: u32) -> usize {
        ((seq - self.initial) / self.mss) as usize
    }

    fn advance(&mut self) {
        self.ledger.mark_acked(self.base);
        self.report.acknowledged.push(self.base);
        self.base += self.mss;
        self.ledger.refresh(self.base, Instant::now());
        self.cc.on_success();
        self.last = self.window_end(self.base);
        log::debug!(
            "[gbn] base -> {} cwnd={} ({:?})",
            self.base,
            self.cc.window(),
            self.cc.mode()
        );
    }

    /// One receive attempt for the ACK naming the current base.
    async fn await_ack(&mut self) -> Result<AckOutcome, TransportError> {
        let awaited = self.base;
        let seg = match recv_segment(self.channel, Some(self.ctx.peer), self.recv_timeout).await {
            Ok((seg, _)) => seg,
            Err(TransportError::Timeout) => {
                log::debug!("[gbn] waiting for ACK {awaited}...");
                return Ok(AckOutcome::NothingYet);
            }
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                log::debug!("[gbn] dropped while awaiting ACK {awaited}: {e}");
                return Ok(AckOutcome::Ignored);
            }
        };

        let h = *seg.header();
        if let Err(e) = seg.check() {
            log::debug!("[gbn] ← ACK dropped: {e}");
            return Ok(AckOutcome::Ignored);
        }
        if h.ack != awaited {
            log::debug!("[gbn] ← ACK {} ignored, want {awaited}", h.ack);
            return Ok(AckOutcome::Ignored);
        }

        log::debug!("[gbn] ← ACK {awaited}");
        self.ctx.peer_ack = h.ack;
        self.ctx.peer_seq = h.seq.wrapping_add(1);
        self.ctx.local_ack = self.ctx.peer_seq;
        Ok(AckOutcome::Accepted)
    }

    /// Resend every unacknowledged ledgered chunk in `[base, last]`.
    async fn retransmit_window(&mut self) -> Result<(), TransportError> {
        let mut seq = self.base;
        while seq <= self.last {
            let pending = self
                .ledger
                .get(seq)
                .filter(|e| !e.acked)
                .map(|e| (e.snapshot.clone(), e.payload.clone()));
            if let Some((snapshot, payload)) = pending {
                self.transmit(&snapshot, &payload, true).await?;
                self.ledger.record_retransmission(seq, Instant::now());
                self.report.retransmissions += 1;
            }
            seq += self.mss;
        }
        Ok(())
    }

    async fn transmit(
        &mut self,
        snapshot: &ConnectionContext,
        payload: &[u8],
        retransmission: bool,
    ) -> Result<(), TransportError> {
        let seq = snapshot.local_seq;
        let tag = if retransmission { " (retransmission)" } else { "" };
        let segment = snapshot.segment(0, seq, snapshot.local_ack, payload);

        match self.faults.decide(seq, retransmission) {
            Fault::Deliver => {
                send_segment(self.channel, &segment, snapshot.peer).await?;
                log::debug!("[gbn] → DATA seq={seq} len={}{tag}", payload.len());
            }
            Fault::Drop => {
                self.report.simulated_losses += 1;
                log::debug!("[gbn] simulated loss of seq={seq}{tag}");
            }
            Fault::Corrupt => {
                self.report.simulated_corruptions += 1;
                send_segment(self.channel, &segment.corrupt(), snapshot.peer).await?;
                log::debug!("[gbn] simulated corruption of seq={seq}{tag}");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::packet::{Segment, flags};
    use crate::simulator::NoFaults;
    use crate::socket::MemoryChannel;
    use crate::state::ConnectionState;

    const S: &str = "127.0.0.1:8001";
    const R: &str = "127.0.0.1:8000";

    fn established(seq: u32) -> ConnectionContext {
        let mut ctx = ConnectionContext::pending(R.parse().unwrap(), 8001, 9, 15);
        ctx.local_seq = seq;
        ctx.local_ack = 501;
        ctx.peer_mss = 15;
        ctx.state = ConnectionState::Established;
        ctx
    }

    fn config() -> Config {
        let mut c = Config::sender();
        c.peer = R.parse().unwrap();
        c.rto = Duration::from_secs(5);
        c.recv_timeout = Duration::from_secs(1);
        c
    }

    fn ack_for(seq: u32) -> Vec<u8> {
        let ctx = ConnectionContext::pending(S.parse().unwrap(), 8000, 4, 15);
        ctx.segment(flags::ACK, 600, seq, Vec::new()).encode()
    }

    async fn drain(ch: &MemoryChannel) -> Vec<u32> {
        let mut seqs = Vec::new();
        while let Ok((bytes, _)) = ch.recv_from(Duration::from_millis(1)).await {
            seqs.push(Segment::decode(&bytes).unwrap().header().seq);
        }
        seqs
    }

    #[test]
    fn chunking_is_sequential_and_bounded() {
        let chunks = chunk(b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJK", 15);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= 15));
        assert_eq!(chunks[3], b"FGHIJK");
        assert_eq!(chunks.concat(), b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJK");
        assert!(chunk(b"", 15).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ledger_tracks_age_and_transmissions() {
        let mut ledger = SentLedger::default();
        ledger.insert(100, established(100), b"x".to_vec());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(ledger.age(100, Instant::now()), Some(Duration::from_secs(3)));

        ledger.record_retransmission(100, Instant::now());
        assert_eq!(ledger.age(100, Instant::now()), Some(Duration::ZERO));
        assert_eq!(ledger.get(100).unwrap().transmissions, 2);

        ledger.mark_acked(100);
        assert!(ledger.get(100).unwrap().acked);
        assert_eq!(ledger.age(999, Instant::now()), None);
    }

    #[test]
    fn refuses_connection_that_is_not_live() {
        let (cs, _cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        ctx.state = ConnectionState::SynSent;
        let result = SenderPipeline::new(&cs, &mut ctx, &config(), NoFaults, b"data");
        assert!(matches!(result, Err(TransportError::HandshakeFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn congestion_cap_follows_configured_window() {
        let (cs, _cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let mut cfg = config();
        cfg.window = 3;
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, b"data").unwrap();
        assert_eq!(p.congestion().cap(), cfg.cwnd_cap());
        for _ in 0..5 {
            p.cc.on_success();
        }
        assert_eq!(p.congestion().window(), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_numbers_advance_by_mss_stride() {
        let (cs, cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let mut cfg = config();
        cfg.window = 20;
        let data = vec![b'z'; 15 * 3 + 4];
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, &data).unwrap();
        assert_eq!(p.end_sequence(), 160);

        // Grow the window so everything fits in one cycle.
        for _ in 0..3 {
            p.cc.on_success();
        }
        assert_eq!(p.fill_window().await.unwrap(), 4);
        assert_eq!(p.last(), 145);
        assert_eq!(drain(&cr).await, vec![100, 115, 130, 145]);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_ack_advances_base_and_grows_window() {
        let (cs, cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let cfg = config();
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, &[b'a'; 45]).unwrap();

        assert_eq!(p.fill_window().await.unwrap(), 2);
        cs.deliver(ack_for(100), R.parse().unwrap());
        // Duplicate and stray ACKs are ignored.
        cs.deliver(ack_for(100), R.parse().unwrap());
        cs.deliver(ack_for(777), R.parse().unwrap());
        cs.deliver(ack_for(115), R.parse().unwrap());
        cr.send_to(&ack_for(130), S.parse().unwrap()).await.unwrap();

        // Second window is sent once the first clears.
        assert_eq!(p.await_window().await.unwrap(), WindowOutcome::Cleared);
        assert_eq!(p.base(), 130);
        assert_eq!(p.fill_window().await.unwrap(), 1);
        assert_eq!(p.await_window().await.unwrap(), WindowOutcome::Cleared);
        assert!(p.is_complete());
        assert_eq!(p.congestion().window(), 120);
        assert_eq!(p.report.acknowledged, vec![100, 115, 130]);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_from_wrong_peer_is_ignored() {
        let (cs, _cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let cfg = config();
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, &[b'a'; 15]).unwrap();
        p.fill_window().await.unwrap();

        let stranger: SocketAddr = "127.0.0.1:7777".parse().unwrap();
        cs.deliver(ack_for(100), stranger);
        assert_eq!(
            p.await_window().await.unwrap(),
            WindowOutcome::TimedOut { advanced: false }
        );
        assert_eq!(p.base(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_window_backs_off_and_resends_once() {
        let (cs, cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let cfg = config();
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, &[b'a'; 45]).unwrap();

        p.fill_window().await.unwrap();
        let prior = p.congestion().window();
        let outcome = p.await_window().await.unwrap();

        assert_eq!(outcome, WindowOutcome::TimedOut { advanced: false });
        assert_eq!(p.congestion().ssthresh(), (prior / 2).max(15));
        assert_eq!(p.congestion().window(), 15);
        assert_eq!(p.congestion().mode(), crate::congestion::CongestionMode::SlowStart);
        assert_eq!(drain(&cr).await, vec![100, 115, 100, 115]);
        assert_eq!(p.ledger().get(100).unwrap().transmissions, 2);
        assert_eq!(p.ledger().get(115).unwrap().transmissions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_after_progress_resends_only_the_rest() {
        let (cs, cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let cfg = config();
        let mut p = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, &[b'a'; 45]).unwrap();

        p.fill_window().await.unwrap();
        cs.deliver(ack_for(100), R.parse().unwrap());
        let outcome = p.await_window().await.unwrap();

        assert_eq!(outcome, WindowOutcome::TimedOut { advanced: true });
        assert_eq!(p.base(), 115);
        // Window had doubled to 30 before the loss.
        assert_eq!(p.congestion().ssthresh(), 15);
        assert_eq!(p.congestion().window(), 15);
        // 130 entered `last` after the ACK but was never sent, so only 115 goes again.
        assert_eq!(drain(&cr).await, vec![100, 115, 115]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stream_completes_immediately() {
        let (cs, cr) = MemoryChannel::pair(S.parse().unwrap(), R.parse().unwrap());
        let mut ctx = established(100);
        let cfg = config();
        let report = SenderPipeline::new(&cs, &mut ctx, &cfg, NoFaults, b"")
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(report.transmissions, 0);
        assert!(drain(&cr).await.is_empty());
        assert_eq!(ctx.local_seq, 100);
    }
}
