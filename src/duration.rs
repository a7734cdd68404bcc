//! Phase length tracking in sample units.
//!
//! Each regime keeps an exponential moving average of how many samples its
//! phases last. A completed phase is judged against that average when the
//! regime changes, and the running phase is checked on every sample.

use crate::config::Settings;
use crate::regime::{Regime, RegimeMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest expected length seeded from a bootstrap window.
pub const MIN_DURATION_SEED: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationAnomaly {
    TooShort,
    TooLong,
}

impl fmt::Display for DurationAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DurationAnomaly::TooShort => "phase_too_short",
            DurationAnomaly::TooLong => "phase_too_long",
        })
    }
}

/// A phase that ended on the current sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletedPhase {
    pub regime: Regime,
    /// Samples from the phase's first index up to the transition index
    pub length: u64,
    /// Expected length before this phase was folded in
    pub expected: f64,
    /// The phase began before scoring did, so only `TooLong` can apply
    pub partial: bool,
    pub anomaly: Option<DurationAnomaly>,
}

#[derive(Debug, Clone)]
pub(crate) struct PhaseTimer {
    expected: RegimeMap<f64>,
    start: Option<u64>,
    partial: bool,
    short: f64,
    long: f64,
    alpha: f64,
}

impl PhaseTimer {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            expected: settings.duration_seed,
            start: None,
            partial: true,
            short: settings.duration_short,
            long: settings.duration_long,
            alpha: settings.ema_alpha,
        }
    }

    /// Seeds expected lengths from the bootstrap membership: the member count
    /// (at least [`MIN_DURATION_SEED`]) for populated regimes, the configured
    /// seed otherwise.
    pub(crate) fn seed(&mut self, members: &RegimeMap<Vec<f64>>) {
        let fallback = self.expected;
        self.expected = RegimeMap::from_fn(|regime| match members[regime].len() {
            0 => fallback[regime],
            n => (n as f64).max(MIN_DURATION_SEED),
        });
    }

    /// Samples since the running phase began. The first call anchors it.
    pub(crate) fn elapsed(&mut self, index: u64) -> u64 {
        index - *self.start.get_or_insert(index)
    }

    /// Closes the running phase of `regime` at `index` and starts the next.
    pub(crate) fn complete(&mut self, regime: Regime, index: u64) -> CompletedPhase {
        let length = self.elapsed(index);
        let expected = self.expected[regime];
        let partial = self.partial;

        let anomaly = if !partial && (length as f64) < self.short * expected {
            Some(DurationAnomaly::TooShort)
        } else if length as f64 > self.long * expected {
            Some(DurationAnomaly::TooLong)
        } else {
            None
        };

        if !partial {
            self.expected[regime] = self.alpha * length as f64 + (1.0 - self.alpha) * expected;
        }
        self.start = Some(index);
        self.partial = false;

        CompletedPhase {
            regime,
            length,
            expected,
            partial,
            anomaly,
        }
    }

    /// Whether a running phase of `regime` has outlasted the upper bound.
    pub(crate) fn is_overrun(&self, regime: Regime, length: u64) -> bool {
        length as f64 > self.long * self.expected[regime]
    }

    pub(crate) fn expected(&self, regime: Regime) -> f64 {
        self.expected[regime]
    }
}
