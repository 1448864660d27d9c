//! Broker session over an embassy-net TCP socket
//!
//! Implements the library's `MessagingClient` with `rust-mqtt` (MQTT v5,
//! QoS 0). The client lives for the whole program and talks through a
//! shared handle on one socket; a new connect aborts whatever the previous
//! session left behind and reopens the same socket.

use core::cell::RefCell;

use embassy_net::IpEndpoint;
use embassy_net::tcp::{Error as TcpError, State, TcpSocket};
use embassy_time::{Duration, Instant, with_timeout};
use embedded_io_async::{ErrorType, Read, Write};
use log::{debug, info, warn};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

use envdisplay_rs::config::{CONNECT_TIMEOUT_MS, MQTT_KEEP_ALIVE_SECS};
use envdisplay_rs::transport::{ConnectError, InboundMessage, MessagingClient, TransportError};

/// MQTT v5 properties kept per packet
const MAX_PROPERTIES: usize = 5;

/// Largest packet either side may send
pub const MQTT_PACKET_SIZE: usize = 256;

/// Time allowed for an already-arriving PUBLISH to finish reading
const RECEIVE_TIMEOUT_MS: u64 = 200;

/// Shared handle on the broker socket, used as the MQTT network driver
pub struct SocketLink<'a> {
    socket: &'a RefCell<TcpSocket<'a>>,
}

impl ErrorType for SocketLink<'_> {
    type Error = TcpError;
}

impl Read for SocketLink<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket.borrow_mut().read(buf).await
    }
}

impl Write for SocketLink<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket.borrow_mut().write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket.borrow_mut().flush().await
    }
}

pub struct BrokerClient<'a> {
    client: MqttClient<'a, SocketLink<'a>, MAX_PROPERTIES, CountingRng>,
    socket: &'a RefCell<TcpSocket<'a>>,
    broker: IpEndpoint,
    client_id: &'a str,
    connected: bool,
    last_activity: Instant,
}

impl<'a> BrokerClient<'a> {
    /// `client_id` is fixed for the lifetime of the MQTT client
    pub fn new(
        socket: &'a RefCell<TcpSocket<'a>>,
        broker: IpEndpoint,
        client_id: &'a str,
        write_buffer: &'a mut [u8],
        recv_buffer: &'a mut [u8],
    ) -> Self {
        socket
            .borrow_mut()
            .set_timeout(Some(Duration::from_secs(MQTT_KEEP_ALIVE_SECS as u64 * 2)));

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        config.add_max_subscribe_qos(QualityOfService::QoS0);
        config.add_client_id(client_id);
        config.keep_alive = MQTT_KEEP_ALIVE_SECS;
        config.max_packet_size = MQTT_PACKET_SIZE as u32;

        let write_len = write_buffer.len();
        let recv_len = recv_buffer.len();
        let client = MqttClient::<_, MAX_PROPERTIES, _>::new(
            SocketLink { socket },
            write_buffer,
            write_len,
            recv_buffer,
            recv_len,
            config,
        );

        Self {
            client,
            socket,
            broker,
            client_id,
            connected: false,
            last_activity: Instant::now(),
        }
    }

    fn keep_alive(&self) -> Duration {
        Duration::from_secs(MQTT_KEEP_ALIVE_SECS as u64)
    }

    fn drop_link(&mut self, reason: &str) {
        if self.connected {
            warn!("[MQTT] Link lost: {}", reason);
        }
        self.connected = false;
    }

    /// Only transport failures end the session; other reason codes are
    /// per-request refusals
    fn check(&mut self, what: &str, code: ReasonCode) -> TransportError {
        if code == ReasonCode::NetworkError {
            self.drop_link(what);
            TransportError::WriteFailed
        } else {
            warn!("[MQTT] {} refused: {:?}", what, code);
            TransportError::Rejected
        }
    }

    /// Abort any previous session so the socket can connect again
    async fn reset(&mut self) {
        self.connected = false;
        if self.socket.borrow().state() != State::Closed {
            self.socket.borrow_mut().abort();
            let _ = with_timeout(
                Duration::from_millis(500),
                self.socket.borrow_mut().flush(),
            )
            .await;
        }
    }

    async fn open(&mut self) -> Result<(), ConnectError> {
        if let Err(e) = self.socket.borrow_mut().connect(self.broker).await {
            warn!("[MQTT] TCP connect to {} failed: {:?}", self.broker, e);
            return Err(ConnectError::Network);
        }

        self.client.connect_to_broker().await.map_err(|code| match code {
            ReasonCode::NetworkError => ConnectError::Network,
            refused => ConnectError::Refused(refused.into()),
        })
    }

    /// Ping when idle; a failed ping ends the session
    async fn service_keep_alive(&mut self) {
        if self.last_activity.elapsed() < self.keep_alive() / 2 {
            return;
        }

        match self.client.send_ping().await {
            Ok(()) => {
                debug!("[MQTT] Ping acknowledged");
                self.last_activity = Instant::now();
            }
            Err(code) => {
                self.check("ping", code);
            }
        }
    }
}

impl MessagingClient for BrokerClient<'_> {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, client_id: &str) -> Result<(), ConnectError> {
        if client_id != self.client_id {
            warn!(
                "[MQTT] Client id {} differs from configured {}, using the configured one",
                client_id, self.client_id
            );
        }

        self.reset().await;
        info!("[MQTT] Connecting to {} as {}", self.broker, self.client_id);

        let result = with_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS), self.open())
            .await
            .unwrap_or(Err(ConnectError::Timeout));

        if result.is_ok() {
            self.connected = true;
            self.last_activity = Instant::now();
        }
        result
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match self
            .client
            .send_message(topic, payload, QualityOfService::QoS0, false)
            .await
        {
            Ok(()) => {
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(code) => Err(self.check("publish", code)),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match self.client.subscribe_to_topic(topic).await {
            Ok(()) => {
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(code) => Err(self.check("subscribe", code)),
        }
    }

    async fn poll(&mut self) -> Option<InboundMessage> {
        if !self.connected {
            return None;
        }

        self.service_keep_alive().await;
        if !self.connected {
            return None;
        }

        let (can_recv, established) = {
            let socket = self.socket.borrow();
            (socket.can_recv(), matches!(socket.state(), State::Established))
        };
        if !can_recv {
            if !established {
                self.drop_link("socket closed");
            }
            return None;
        }

        let received = with_timeout(
            Duration::from_millis(RECEIVE_TIMEOUT_MS),
            self.client.receive_message(),
        )
        .await;

        match received {
            Ok(Ok((topic, payload))) => {
                let message = InboundMessage::new(topic, payload);
                if message.is_none() {
                    warn!("[MQTT] Dropping oversized message on {}", topic);
                }
                self.last_activity = Instant::now();
                message
            }
            Ok(Err(ReasonCode::NetworkError)) => {
                self.drop_link("read failed");
                None
            }
            Ok(Err(code)) => {
                debug!("[MQTT] Receive skipped: {:?}", code);
                None
            }
            Err(_) => {
                // A half-read packet leaves the stream out of sync
                self.drop_link("receive timed out");
                None
            }
        }
    }
}
