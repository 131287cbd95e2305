//! Slow-start / congestion-avoidance window control.
//!
//! [`CongestionController`] is owned by one sender pipeline for the life of
//! one transfer.  The window is measured in bytes and always moves in whole
//! MSS units between `MSS` and `window * MSS`.
//!
//! | Event                   | Effect                                                  |
//! |-------------------------|---------------------------------------------------------|
//! | ACK in slow start       | `cwnd = min(2*cwnd, cap)`; enter avoidance at `ssthresh`  |
//! | ACK in avoidance        | `cwnd = min(cwnd + MSS, cap)`                           |
//! | retransmission timeout  | `ssthresh = max(cwnd/2, MSS)`, `cwnd = MSS`, slow start |
//! | window made no progress | `cwnd = max(cwnd/2, MSS)`                               |
//!
//! Every change is recorded as a [`CwndSample`] for plotting.

use serde::Serialize;
use tokio::time::Instant;

/// Growth regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionMode {
    SlowStart,
    CongestionAvoidance,
}

/// One point of the congestion-window time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CwndSample {
    /// Seconds since the controller was created.
    pub elapsed: f64,
    /// Window size in bytes.
    pub cwnd: u32,
}

#[derive(Debug, Clone)]
pub struct CongestionController {
    mss: u32,
    cap: u32,
    cwnd: u32,
    ssthresh: u32,
    mode: CongestionMode,
    started: Instant,
    history: Vec<CwndSample>,
}

impl CongestionController {
    /// Start in slow start with `cwnd = MSS` and `ssthresh = cap / 2`
    /// (never below one MSS).  `cap` is in bytes and is raised to one MSS
    /// if smaller.
    pub fn new(mss: u16, cap: u32) -> Self {
        let mss = u32::from(mss.max(1));
        let cap = cap.max(mss);
        let mut cc = Self {
            mss,
            cap,
            cwnd: mss,
            ssthresh: (cap / 2).max(mss),
            mode: CongestionMode::SlowStart,
            started: Instant::now(),
            history: Vec::new(),
        };
        cc.sample();
        cc
    }

    pub fn window(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn mode(&self) -> CongestionMode {
        self.mode
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Recorded samples, oldest first.
    pub fn history(&self) -> &[CwndSample] {
        &self.history
    }

    /// An in-order ACK was accepted.
    pub fn on_success(&mut self) {
        match self.mode {
            CongestionMode::SlowStart => {
                self.cwnd = self.cwnd.saturating_mul(2).min(self.cap);
                if self.cwnd >= self.ssthresh {
                    log::debug!("[cc] slow start -> congestion avoidance at cwnd={}", self.cwnd);
                    self.mode = CongestionMode::CongestionAvoidance;
                }
            }
            CongestionMode::CongestionAvoidance => {
                self.cwnd = self.cwnd.saturating_add(self.mss).min(self.cap);
            }
        }
        self.sample();
    }

    /// The retransmission timer expired.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(self.mss);
        self.cwnd = self.mss;
        self.mode = CongestionMode::SlowStart;
        log::debug!("[cc] timeout: ssthresh={} cwnd={}", self.ssthresh, self.cwnd);
        self.sample();
    }

    /// A whole window cycle ended without the base moving.
    pub fn on_stall(&mut self) {
        self.cwnd = (self.cwnd / 2).max(self.mss);
        log::debug!("[cc] no progress: cwnd={}", self.cwnd);
        self.sample();
    }

    /// Record the current window without changing it.
    pub fn sample(&mut self) {
        self.history.push(CwndSample {
            elapsed: self.started.elapsed().as_secs_f64(),
            cwnd: self.cwnd,
        });
    }

    /// Consume the controller, returning its sample series.
    pub fn into_history(self) -> Vec<CwndSample> {
        self.history
    }
}
