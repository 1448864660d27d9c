//! WiFi station management for the ESP32-C3 board
//!
//! Handles association using esp-wifi 0.14.1 with embassy-net DHCP

use embassy_net::Stack;
use embassy_time::Timer;
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, Configuration, WifiController};
use log::{info, warn};

use envdisplay_rs::BoardError;

/// Polls while waiting for association
const CONNECT_POLL_ATTEMPTS: u32 = 50;
const CONNECT_POLL_INTERVAL_MS: u64 = 100;

/// WiFi manager for the station interface
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    is_connected: bool,
}

impl<'a> WiFiManager<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self {
            controller,
            stack,
            is_connected: false,
        }
    }

    /// Connect to the configured network
    pub async fn connect(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        info!("[WIFI] Connecting to WiFi network: {}", ssid);

        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
            password: password.try_into().map_err(|_| BoardError::WiFiError)?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiError)?;

        if !self.controller.is_started().unwrap_or(false) {
            self.controller.start().map_err(|_| BoardError::WiFiError)?;
        }
        self.controller.connect().map_err(|_| BoardError::WiFiError)?;

        let mut attempts = 0;
        while !self.controller.is_connected().unwrap_or(false) && attempts < CONNECT_POLL_ATTEMPTS {
            attempts += 1;
            Timer::after_millis(CONNECT_POLL_INTERVAL_MS).await;
        }

        if self.controller.is_connected().unwrap_or(false) {
            self.is_connected = true;
            info!("[WIFI] Associated with {}", ssid);
            Ok(())
        } else {
            warn!("[WIFI] Failed to connect after {} attempts", attempts);
            Err(BoardError::WiFiError)
        }
    }

    /// Wait for DHCP and log the assigned address
    pub async fn wait_for_address(&self) -> Option<[u8; 4]> {
        self.stack.wait_config_up().await;
        self.get_ip_address()
    }

    pub fn get_ip_address(&self) -> Option<[u8; 4]> {
        let config = self.stack.config_v4()?;
        let octets = config.address.address().octets();
        info!(
            "[WIFI] DHCP address: {}.{}.{}.{}",
            octets[0], octets[1], octets[2], octets[3]
        );
        Some(octets)
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected && self.controller.is_connected().unwrap_or(false)
    }

    /// Track association changes; returns true when the link is up
    pub fn monitor_connection(&mut self) -> bool {
        let current_status = self.controller.is_connected().unwrap_or(false);

        if self.is_connected && !current_status {
            warn!("[WIFI] WiFi connection lost!");
            self.is_connected = false;
        } else if !self.is_connected && current_status {
            info!("[WIFI] WiFi connection restored!");
            self.is_connected = true;
        }

        self.is_connected
    }
}
