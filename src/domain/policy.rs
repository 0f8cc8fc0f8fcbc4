//! Pluggable yes/no decisions.
//!
//! Fraud flagging of high-value payments and the simulated outcome of
//! settlement and refund completion are probabilistic gates rather than
//! business rules, so the engines take them as trait objects.

use rand::Rng;
use std::sync::Arc;

pub trait Gate: Send + Sync {
    fn pass(&self) -> bool;
}

pub type GateRef = Arc<dyn Gate>;

/// Passes with the given probability, clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct RandomGate {
    probability: f64,
}

impl RandomGate {
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Gate for RandomGate {
    fn pass(&self) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

/// Always answers the same.
#[derive(Debug, Clone, Copy)]
pub struct FixedGate(pub bool);

impl Gate for FixedGate {
    fn pass(&self) -> bool {
        self.0
    }
}

/// The three decisions the engines delegate.
#[derive(Clone)]
pub struct Policies {
    /// Whether an over-threshold payment is flagged for review.
    pub fraud: GateRef,
    pub settlement: GateRef,
    pub refund: GateRef,
}

impl Policies {
    pub fn random(fraud: f64, settlement: f64, refund: f64) -> Self {
        Self {
            fraud: Arc::new(RandomGate::new(fraud)),
            settlement: Arc::new(RandomGate::new(settlement)),
            refund: Arc::new(RandomGate::new(refund)),
        }
    }

    /// Nothing flagged, everything succeeds.
    pub fn deterministic() -> Self {
        Self {
            fraud: Arc::new(FixedGate(false)),
            settlement: Arc::new(FixedGate(true)),
            refund: Arc::new(FixedGate(true)),
        }
    }
}
