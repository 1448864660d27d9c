//! Per-metric display ranges

use crate::metric::{METRIC_COUNT, MetricKind};

/// Window used to normalise a metric value onto the hue scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRange {
    pub min: f32,
    pub max: f32,
}

/// Why a range update was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// `min >= max`
    Inverted,
    /// A bound is NaN or infinite
    NotFinite,
}

impl DisplayRange {
    /// Create a validated range
    pub fn new(min: f32, max: f32) -> Result<Self, RangeError> {
        let range = Self { min, max };
        range.check()?;
        Ok(range)
    }

    pub fn check(&self) -> Result<(), RangeError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(RangeError::NotFinite);
        }
        if self.min >= self.max {
            return Err(RangeError::Inverted);
        }
        Ok(())
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Same range with a new lower bound (unchecked)
    pub fn with_min(self, min: f32) -> Self {
        Self { min, ..self }
    }

    /// Same range with a new upper bound (unchecked)
    pub fn with_max(self, max: f32) -> Self {
        Self { max, ..self }
    }

    /// Saturate `value` into `[min, max]`
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Display range for every metric kind.
///
/// Every stored range satisfies `min < max`; rejected updates leave the
/// previous range in place.
#[derive(Debug, Clone)]
pub struct RangeTable {
    ranges: [DisplayRange; METRIC_COUNT],
}

impl RangeTable {
    /// Build the table from per-kind defaults (indexed by [`MetricKind::index`])
    pub fn new(defaults: [DisplayRange; METRIC_COUNT]) -> Result<Self, RangeError> {
        for range in &defaults {
            range.check()?;
        }
        Ok(Self { ranges: defaults })
    }

    pub fn get(&self, kind: MetricKind) -> DisplayRange {
        self.ranges[kind.index()]
    }

    pub fn set(&mut self, kind: MetricKind, range: DisplayRange) -> Result<(), RangeError> {
        range.check()?;
        self.ranges[kind.index()] = range;
        Ok(())
    }

    /// Replace the upper bound, keeping the current lower bound
    pub fn set_max(&mut self, kind: MetricKind, max: f32) -> Result<DisplayRange, RangeError> {
        let range = self.get(kind).with_max(max);
        self.set(kind, range)?;
        Ok(range)
    }

    /// Replace the lower bound, keeping the current upper bound
    pub fn set_min(&mut self, kind: MetricKind, min: f32) -> Result<DisplayRange, RangeError> {
        let range = self.get(kind).with_min(min);
        self.set(kind, range)?;
        Ok(range)
    }
}
