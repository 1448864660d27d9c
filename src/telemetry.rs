//! Latest telemetry value per metric

use crate::metric::{METRIC_COUNT, MetricKind};

/// Holds the most recent sample of each metric. Last write wins; no history
/// is kept.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    samples: [f32; METRIC_COUNT],
    received: [bool; METRIC_COUNT],
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, kind: MetricKind, value: f32) {
        self.samples[kind.index()] = value;
        self.received[kind.index()] = true;
    }

    /// Latest value, `0.0` until the first message arrives
    pub fn get(&self, kind: MetricKind) -> f32 {
        self.samples[kind.index()]
    }

    /// Whether any message has been received for `kind`
    pub fn has_sample(&self, kind: MetricKind) -> bool {
        self.received[kind.index()]
    }
}
