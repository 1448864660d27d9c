//! ESP32-C3 Environment Display Library
//!
//! Receives named telemetry values (temperature, humidity, CO2, power, gas)
//! over a publish/subscribe feed and renders the selected metric as a
//! breathing color on a small WS2812 strip.
//!
//! Everything in this library is hardware independent and can be tested on
//! the host; the firmware binary (`main.rs`) adds the ESP32-C3 drivers.
//!
//! # Testing
//!
//! ```bash
//! cargo test --lib --tests --target x86_64-unknown-linux-gnu
//! ```

// Use no_std only when NOT testing (tests need std for the test harness)
#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod breathing;
pub mod config;
pub mod control;
pub mod led_control;
pub mod metric;
pub mod range_table;
pub mod state_machine;
pub mod telemetry;
pub mod topics;
pub mod transport;

pub use app::{AppState, Indicator};
pub use metric::MetricKind;

/// Error types for the display board bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// WiFi connection error
    WiFiError,
    /// LED control error
    LedError,
    /// Startup configuration rejected
    ConfigError(config::ConfigError),
}

impl From<config::ConfigError> for BoardError {
    fn from(e: config::ConfigError) -> Self {
        BoardError::ConfigError(e)
    }
}
