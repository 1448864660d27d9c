//! Indicator rendering: metric value -> hue, breathing -> value channel
//!
//! Low values render cool (blue, hue 160 on the 0-255 wheel) and high values
//! warm (red, hue 0). Every render repaints the whole strip with one color
//! and pushes it in a single write. A status flash temporarily overrides
//! [`STATUS_PIXEL`]: lit for one flash period, then dark for another.

use core::iter;

use smart_leds::RGB8;
use smart_leds::SmartLedsWrite;
use smart_leds::hsv::{Hsv, hsv2rgb};

use crate::breathing::BreathingOscillator;
use crate::metric::MetricKind;
use crate::range_table::DisplayRange;

/// Hue shown at the bottom of the range (blue on the rainbow wheel)
pub const HUE_MAX: u8 = 160;

/// Value channel never drops below this, so the indicator never looks dead
pub const VALUE_FLOOR: u8 = 30;

pub const VALUE_CEIL: u8 = 255;

/// Pixel borrowed by status flashes
pub const STATUS_PIXEL: usize = 0;

/// Flash color for failed connect attempts
pub const STATUS_ERROR_COLOR: RGB8 = RGB8 { r: 255, g: 0, b: 0 };

const STATUS_OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

/// One on/off blink of the status pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlash {
    pub color: RGB8,
    pub started_ms: u64,
    pub duration_ms: u64,
}

impl StatusFlash {
    /// Status pixel color at `now_ms`, `None` once the blink is over
    pub fn color_at(&self, now_ms: u64) -> Option<RGB8> {
        let elapsed = now_ms.checked_sub(self.started_ms)?;
        if elapsed < self.duration_ms {
            Some(self.color)
        } else if elapsed < self.duration_ms.saturating_mul(2) {
            Some(STATUS_OFF)
        } else {
            None
        }
    }
}

/// Color produced by one render, before conversion to the strip format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorColor {
    pub hue: u8,
    pub sat: u8,
    pub val: u8,
}

impl IndicatorColor {
    pub fn to_rgb(self) -> RGB8 {
        hsv2rgb(Hsv {
            hue: self.hue,
            sat: self.sat,
            val: self.val,
        })
    }
}

/// Inputs for one render call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub kind: MetricKind,
    pub value: f32,
    pub range: DisplayRange,
    pub brightness_scale: f32,
    pub now_ms: u64,
}

/// Map a value onto `[0, HUE_MAX]`, inverted: `range.min -> HUE_MAX`,
/// `range.max -> 0`. Values outside the range saturate.
pub fn hue_for(value: f32, range: DisplayRange) -> u8 {
    let span = range.span();
    if !(span > 0.0) || value.is_nan() {
        return HUE_MAX;
    }

    let position = (range.clamp(value) - range.min) / span;
    round_u8(HUE_MAX as f32 * (1.0 - position))
}

/// Map a `[0, 1]` envelope onto `[VALUE_FLOOR, VALUE_CEIL]`
pub fn value_channel(envelope: f32) -> u8 {
    let envelope = if envelope.is_nan() {
        0.0
    } else {
        envelope.clamp(0.0, 1.0)
    };
    let span = (VALUE_CEIL - VALUE_FLOOR) as f32;
    round_u8(VALUE_FLOOR as f32 + envelope * span)
}

fn round_u8(x: f32) -> u8 {
    (x + 0.5).clamp(0.0, 255.0) as u8
}

/// Renders the active metric onto the LED strip
#[derive(Debug, Clone)]
pub struct IndicatorRenderer {
    pixel_count: usize,
    oscillator: BreathingOscillator,
    last_color: Option<IndicatorColor>,
    status: Option<StatusFlash>,
    frames: u32,
}

impl IndicatorRenderer {
    pub fn new(pixel_count: usize, oscillator: BreathingOscillator) -> Self {
        Self {
            pixel_count,
            oscillator,
            last_color: None,
            status: None,
            frames: 0,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Color for `frame` without touching the strip
    pub fn color(&self, frame: &Frame) -> IndicatorColor {
        let scale = if frame.brightness_scale.is_nan() {
            0.0
        } else {
            frame.brightness_scale.clamp(0.0, 1.0)
        };
        let envelope = self.oscillator.phase(frame.now_ms) * scale;

        IndicatorColor {
            hue: hue_for(frame.value, frame.range),
            sat: 255,
            val: value_channel(envelope),
        }
    }

    /// Blink the status pixel starting at `now_ms`, replacing any blink
    /// still in progress
    pub fn flash(&mut self, color: RGB8, now_ms: u64, duration_ms: u64) {
        self.status = Some(StatusFlash {
            color,
            started_ms: now_ms,
            duration_ms,
        });
    }

    pub fn status_flash(&self) -> Option<StatusFlash> {
        self.status
    }

    /// Paint every pixel with the frame color and push the strip once.
    /// A running status flash replaces [`STATUS_PIXEL`].
    ///
    /// Sink failures are returned as-is; nothing is retried here.
    pub fn render<S>(&mut self, sink: &mut S, frame: &Frame) -> Result<IndicatorColor, S::Error>
    where
        S: SmartLedsWrite,
        RGB8: Into<S::Color>,
    {
        let color = self.color(frame);

        if self.last_color.map(|c| c.hue) != Some(color.hue) {
            log::debug!(
                "[LED] {} = {} -> hue {}",
                frame.kind.name(),
                frame.value,
                color.hue
            );
        }

        let status = self.status.and_then(|flash| flash.color_at(frame.now_ms));
        if status.is_none() {
            self.status = None;
        }

        let pixels = iter::repeat(color.to_rgb())
            .take(self.pixel_count)
            .enumerate()
            .map(|(i, rgb)| match status {
                Some(status) if i == STATUS_PIXEL => status,
                _ => rgb,
            });
        sink.write(pixels)?;

        self.last_color = Some(color);
        self.frames = self.frames.wrapping_add(1);
        Ok(color)
    }

    /// Last color successfully pushed
    pub fn last_color(&self) -> Option<IndicatorColor> {
        self.last_color
    }

    /// Number of successful pushes
    pub fn frames(&self) -> u32 {
        self.frames
    }
}
