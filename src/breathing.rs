//! Breathing brightness envelope
//!
//! `exp(sin(2πt/P))` swings between `e^-1` and `e`, so shifting by `e^-1`
//! and dividing by `e - e^-1` gives a pulse in `[0, 1]` that lingers near
//! the bottom and rises/falls smoothly.

use core::f32::consts::{E, PI};

use micromath::F32;

/// Reference breathing period in milliseconds
pub const DEFAULT_PERIOD_MS: u64 = 2000;

const INV_E: f32 = 1.0 / E;

/// Stateless oscillator: the phase depends only on elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreathingOscillator {
    period_ms: u64,
}

impl BreathingOscillator {
    /// `period_ms` of zero is bumped to one so the phase stays defined
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms: if period_ms == 0 { 1 } else { period_ms },
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Envelope value in `[0, 1]` at `elapsed_ms` since start
    pub fn phase(&self, elapsed_ms: u64) -> f32 {
        // Reduce first so phase(t) == phase(t + P) exactly
        let t = (elapsed_ms % self.period_ms) as f32 / self.period_ms as f32;

        let raw = F32(F32(2.0 * PI * t).sin().0).exp().0 - INV_E;
        (raw / (E - INV_E)).clamp(0.0, 1.0)
    }
}

impl Default for BreathingOscillator {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_MS)
    }
}
