//! Default configuration constants and the startup configuration value

use crate::metric::{METRIC_COUNT, MetricKind};
use crate::range_table::DisplayRange;
use crate::topics::make_device_id;

/// Firmware identification printed in the startup banner
pub const FIRMWARE_NAME: &str = "Environment Display";
pub const FIRMWARE_SLUG: &str = "display_env-ESP32C3-rs";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Numeric client identifier, used as the topic prefix
pub const CLIENT_ID: u32 = 30;

/// Device type string, combined with the client id into the device identifier
pub const DEVICE_TYPE: &str = "ESP32";

/// LED data GPIO pin
pub const LED_DATA_PIN: u8 = 18;

/// Number of pixels driven by default
pub const PIXEL_COUNT: usize = 2;

/// Maximum supported pixels
pub const MAX_PIXELS: usize = 16;

/// Render cadence in milliseconds
pub const RENDER_INTERVAL_MS: u64 = 10;

/// Connection supervisor cadence in milliseconds
pub const SUPERVISOR_INTERVAL_MS: u64 = 1000;

/// Status pixel on-time (and off-time) of one flash
pub const STATUS_FLASH_MS: u64 = 50;

/// Upper bound on a single broker connect attempt
pub const CONNECT_TIMEOUT_MS: u64 = 5000;

/// MQTT keep-alive announced in CONNECT
pub const MQTT_KEEP_ALIVE_SECS: u16 = 15;

pub const MQTT_PORT: u16 = 1883;

/// Broker address, read from the environment at compile time
pub const MQTT_BROKER: &str = env!("MQTT_BROKER");

/// Broker used when `MQTT_BROKER` is empty
pub const MQTT_BROKER_FALLBACK: &str = "192.168.1.30";

/// WiFi configuration
/// Read from environment variables at compile time
pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

/// WiFi reconnection interval in milliseconds
pub const WIFI_RECONNECT_INTERVAL_MS: u64 = 5000;

pub const DEFAULT_MODE: MetricKind = MetricKind::Co2;

pub const DEFAULT_BRIGHTNESS: f32 = 1.0;

/// Metric whose bounds the range controls edit
pub const RANGE_CONTROL_KIND: MetricKind = MetricKind::Co2;

/// Default display ranges, indexed by [`MetricKind::index`]
pub const DEFAULT_RANGES: [DisplayRange; METRIC_COUNT] = [
    DisplayRange { min: 15.0, max: 30.0 },   // temperature, °C
    DisplayRange { min: 30.0, max: 70.0 },   // humidity, %
    DisplayRange { min: 440.0, max: 1000.0 }, // co2, ppm
    DisplayRange { min: 0.0, max: 3000.0 },  // power, W
    DisplayRange { min: 0.0, max: 500.0 },   // gas
];

/// Startup configuration validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pixel count is zero or above [`MAX_PIXELS`]
    PixelCount,
    /// A default range has `min >= max`
    Range(MetricKind),
    /// Default brightness outside `[0, 1]`
    Brightness,
    /// Cadences must be non-zero
    Interval,
    /// Device identifier or topic names do not fit their buffers
    Identity,
}

/// Configuration read once at startup and immutable afterwards
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub client_id: u32,
    pub device_type: &'static str,
    pub pixel_count: usize,
    pub ranges: [DisplayRange; METRIC_COUNT],
    pub default_mode: MetricKind,
    pub default_brightness: f32,
    pub range_control_kind: MetricKind,
    pub breathing_period_ms: u64,
    pub render_interval_ms: u64,
    pub supervisor_interval_ms: u64,
    pub status_flash_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID,
            device_type: DEVICE_TYPE,
            pixel_count: PIXEL_COUNT,
            ranges: DEFAULT_RANGES,
            default_mode: DEFAULT_MODE,
            default_brightness: DEFAULT_BRIGHTNESS,
            range_control_kind: RANGE_CONTROL_KIND,
            breathing_period_ms: crate::breathing::DEFAULT_PERIOD_MS,
            render_interval_ms: RENDER_INTERVAL_MS,
            supervisor_interval_ms: SUPERVISOR_INTERVAL_MS,
            status_flash_ms: STATUS_FLASH_MS,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pixel_count == 0 || self.pixel_count > MAX_PIXELS {
            return Err(ConfigError::PixelCount);
        }

        for kind in MetricKind::ALL {
            if self.ranges[kind.index()].check().is_err() {
                return Err(ConfigError::Range(kind));
            }
        }

        if !(0.0..=1.0).contains(&self.default_brightness) {
            return Err(ConfigError::Brightness);
        }

        if self.render_interval_ms == 0 || self.supervisor_interval_ms == 0 {
            return Err(ConfigError::Interval);
        }

        if make_device_id(self.device_type, self.client_id).is_err() {
            return Err(ConfigError::Identity);
        }

        Ok(())
    }

    /// Broker address string, falling back when the build left it empty
    pub fn broker(&self) -> &'static str {
        if MQTT_BROKER.is_empty() {
            MQTT_BROKER_FALLBACK
        } else {
            MQTT_BROKER
        }
    }
}
