//! Fault injection for outbound data segments.
//!
//! Real networks drop and damage packets.  To exercise the reliability
//! machinery without depending on actual network conditions, the sender asks a
//! [`FaultInjector`] before every data transmission whether the segment should
//! go out intact, vanish, or go out with a damaged checksum.
//!
//! | Injector          | Behaviour                                             |
//! |-------------------|-------------------------------------------------------|
//! | [`NoFaults`]      | Transparent pass-through.                             |
//! | [`RandomFaults`]  | With probability `p` a fault fires; loss or corruption is then picked 50/50. |
//! | [`ScriptedFaults`]| Applies a fixed list of faults to named sequence numbers, once each. |
//!
//! The sender pipeline never looks inside an injector, so switching faults on
//! or off does not touch protocol logic.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// What happens to one outbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Segment is sent unchanged.
    Deliver,
    /// Segment is silently not sent.
    Drop,
    /// Segment is sent with its checksum bumped by one.
    Corrupt,
}

/// Decides the fate of each outbound data segment.
pub trait FaultInjector {
    /// Called once per transmission, including retransmissions.
    fn decide(&mut self, seq: u32, retransmission: bool) -> Fault;
}

/// Never injects a fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn decide(&mut self, _seq: u32, _retransmission: bool) -> Fault {
        Fault::Deliver
    }
}

/// Probabilistic loss/corruption.
#[derive(Debug, Clone)]
pub struct RandomFaults {
    probability: f64,
    rng: StdRng,
}

impl RandomFaults {
    /// Faults fire with `probability`; the RNG is seeded from the OS.
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible variant for tests and repeatable experiments.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl FaultInjector for RandomFaults {
    fn decide(&mut self, _seq: u32, _retransmission: bool) -> Fault {
        if self.probability == 0.0 || !self.rng.random_bool(self.probability) {
            return Fault::Deliver;
        }
        if self.rng.random_bool(0.5) {
            Fault::Drop
        } else {
            Fault::Corrupt
        }
    }
}

/// Applies a fixed list of `(seq, fault)` entries.
///
/// Each entry fires on the first transmission of its sequence number that
/// happens after all earlier entries for the same number have fired.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaults {
    plan: VecDeque<(u32, Fault)>,
}

impl ScriptedFaults {
    pub fn new(plan: impl IntoIterator<Item = (u32, Fault)>) -> Self {
        Self {
            plan: plan.into_iter().collect(),
        }
    }

    /// Entries that have not fired yet.
    pub fn remaining(&self) -> usize {
        self.plan.len()
    }
}

impl FaultInjector for ScriptedFaults {
    fn decide(&mut self, seq: u32, _retransmission: bool) -> Fault {
        match self.plan.iter().position(|&(s, _)| s == seq) {
            Some(i) => self.plan.remove(i).map_or(Fault::Deliver, |(_, f)| f),
            None => Fault::Deliver,
        }
    }
}

impl<F: FaultInjector + ?Sized> FaultInjector for &mut F {
    fn decide(&mut self, seq: u32, retransmission: bool) -> Fault {
        (**self).decide(seq, retransmission)
    }
}

impl<F: FaultInjector + ?Sized> FaultInjector for Box<F> {
    fn decide(&mut self, seq: u32, retransmission: bool) -> Fault {
        (**self).decide(seq, retransmission)
    }
}
