//! Dashboard control events and the display mode controller
//!
//! The dashboard addresses the device through named virtual pins. Each pin
//! payload is parsed into a [`ControlEvent`]; values that do not parse stay
//! representable as [`ControlEvent::Unrecognized`] so they can be logged and
//! dropped in one place.

use log::{info, warn};

use crate::metric::{MetricKind, PayloadError, parse_value};
use crate::range_table::{DisplayRange, RangeError, RangeTable};

/// Number of control pins
pub const PIN_COUNT: usize = 4;

/// Named control inputs exposed to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPin {
    /// Global brightness, `0.0..=1.0`
    Brightness,
    /// Active metric ordinal, `1..=5`
    Mode,
    /// Upper bound of the range-controlled metric
    RangeMax,
    /// Lower bound of the range-controlled metric
    RangeMin,
}

impl VirtualPin {
    pub const ALL: [VirtualPin; PIN_COUNT] = [
        VirtualPin::Brightness,
        VirtualPin::Mode,
        VirtualPin::RangeMax,
        VirtualPin::RangeMin,
    ];

    pub fn index(self) -> usize {
        match self {
            VirtualPin::Brightness => 0,
            VirtualPin::Mode => 1,
            VirtualPin::RangeMax => 2,
            VirtualPin::RangeMin => 3,
        }
    }

    /// Topic segment for this pin
    pub fn name(self) -> &'static str {
        match self {
            VirtualPin::Brightness => "brightness",
            VirtualPin::Mode => "mode",
            VirtualPin::RangeMax => "range",
            VirtualPin::RangeMin => "range_min",
        }
    }
}

/// Which end of a range a control edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

/// Why a control payload could not become an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unrecognized {
    /// Payload is not a number
    Payload(VirtualPin, PayloadError),
    /// Mode ordinal outside `1..=5`
    ModeOrdinal(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    SetMode(MetricKind),
    SetBrightness(f32),
    SetRange {
        kind: MetricKind,
        bound: Bound,
        value: f32,
    },
    Unrecognized(Unrecognized),
}

impl ControlEvent {
    /// Parse a pin payload. `range_kind` is the metric the range pins edit.
    pub fn parse(pin: VirtualPin, payload: &[u8], range_kind: MetricKind) -> Self {
        let value = match parse_value(payload) {
            Ok(value) => value,
            Err(e) => return ControlEvent::Unrecognized(Unrecognized::Payload(pin, e)),
        };

        match pin {
            VirtualPin::Brightness => ControlEvent::SetBrightness(value),
            VirtualPin::Mode => {
                let whole = (0.0..=255.0).contains(&value) && (value as u8) as f32 == value;
                let ordinal = if whole {
                    MetricKind::from_ordinal(value as u8)
                } else {
                    None
                };
                match ordinal {
                    Some(kind) => ControlEvent::SetMode(kind),
                    None => ControlEvent::Unrecognized(Unrecognized::ModeOrdinal(value)),
                }
            }
            VirtualPin::RangeMax => ControlEvent::SetRange {
                kind: range_kind,
                bound: Bound::Max,
                value,
            },
            VirtualPin::RangeMin => ControlEvent::SetRange {
                kind: range_kind,
                bound: Bound::Min,
                value,
            },
        }
    }
}

/// Result of applying a control event that did not take effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlError {
    /// Range update refused; the previous range is still active
    RangeRejected {
        kind: MetricKind,
        requested: DisplayRange,
        reason: RangeError,
    },
    Unrecognized(Unrecognized),
}

/// Which metric is shown and how bright
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    pub active_kind: MetricKind,
    /// Always within `[0, 1]`
    pub brightness_scale: f32,
}

impl DisplayState {
    pub fn new(active_kind: MetricKind, brightness_scale: f32) -> Self {
        Self {
            active_kind,
            brightness_scale: clamp_brightness(brightness_scale),
        }
    }
}

/// NaN counts as "off"
fn clamp_brightness(scale: f32) -> f32 {
    if scale.is_nan() {
        0.0
    } else {
        scale.clamp(0.0, 1.0)
    }
}

/// Applies control events to the display state and range table.
///
/// Selection is plain memory: any event may move to any mode, there is no
/// sequencing between states.
#[derive(Debug, Clone, Copy)]
pub struct DisplayModeController {
    range_kind: MetricKind,
}

impl DisplayModeController {
    pub fn new(range_kind: MetricKind) -> Self {
        Self { range_kind }
    }

    /// Metric whose range the range pins edit
    pub fn range_kind(&self) -> MetricKind {
        self.range_kind
    }

    pub fn parse(&self, pin: VirtualPin, payload: &[u8]) -> ControlEvent {
        ControlEvent::parse(pin, payload, self.range_kind)
    }

    pub fn apply(
        &self,
        event: ControlEvent,
        display: &mut DisplayState,
        ranges: &mut RangeTable,
    ) -> Result<(), ControlError> {
        match event {
            ControlEvent::SetMode(kind) => {
                if display.active_kind != kind {
                    info!("[CTRL] Mode {:?} -> {:?}", display.active_kind, kind);
                }
                display.active_kind = kind;
                Ok(())
            }
            ControlEvent::SetBrightness(scale) => {
                display.brightness_scale = clamp_brightness(scale);
                info!("[CTRL] Brightness {}", display.brightness_scale);
                Ok(())
            }
            ControlEvent::SetRange { kind, bound, value } => {
                let current = ranges.get(kind);
                let result = match bound {
                    Bound::Min => ranges.set_min(kind, value),
                    Bound::Max => ranges.set_max(kind, value),
                };

                match result {
                    Ok(applied) => {
                        info!(
                            "[CTRL] {} range {}..{}",
                            kind.name(),
                            applied.min,
                            applied.max
                        );
                        Ok(())
                    }
                    Err(reason) => {
                        let requested = match bound {
                            Bound::Min => current.with_min(value),
                            Bound::Max => current.with_max(value),
                        };
                        warn!(
                            "[CTRL] Rejected {} range {}..{} ({:?}), keeping {}..{}",
                            kind.name(),
                            requested.min,
                            requested.max,
                            reason,
                            current.min,
                            current.max
                        );
                        Err(ControlError::RangeRejected {
                            kind,
                            requested,
                            reason,
                        })
                    }
                }
            }
            ControlEvent::Unrecognized(what) => {
                warn!("[CTRL] Ignoring unrecognized control value: {:?}", what);
                Err(ControlError::Unrecognized(what))
            }
        }
    }
}
