//! Messaging client seam between the indicator core and the broker link

use heapless::{String, Vec};

use crate::topics::MAX_TOPIC_LEN;

/// Largest inbound payload kept; telemetry values are short decimal strings
pub const MAX_PAYLOAD_LEN: usize = 32;

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl InboundMessage {
    /// `None` when the topic or payload exceeds the inbound buffers
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        Some(Self {
            topic: String::try_from(topic).ok()?,
            payload: Vec::from_slice(payload).ok()?,
        })
    }
}

/// Connect attempt failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// No CONNACK within the connect timeout
    Timeout,
    /// TCP connect or write failed
    Network,
    /// Broker answered CONNACK with a non-success reason code
    Refused(u8),
}

impl ConnectError {
    /// Signed reason code: negative for link failures, the CONNACK reason
    /// code for broker refusals.
    pub fn code(&self) -> i16 {
        match self {
            ConnectError::Timeout => -4,
            ConnectError::Network => -2,
            ConnectError::Refused(rc) => *rc as i16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConnected,
    /// Socket write failed; the link is considered lost
    WriteFailed,
    /// Packet did not fit the transmit buffer
    Overflow,
    /// Broker answered the request with a failure reason code
    Rejected,
}

/// Publish/subscribe client used by the connection supervisor and the
/// message drain.
///
/// Calls run on the single indicator task; `connect` may stall it up to
/// the transport's own timeout, everything else returns promptly.
#[allow(async_fn_in_trait)]
pub trait MessagingClient {
    /// Liveness as last observed by the transport
    fn is_connected(&self) -> bool;

    /// Open a session with `client_id` as the client handle
    async fn connect(&mut self, client_id: &str) -> Result<(), ConnectError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Subscribing to an already subscribed topic is harmless
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Service keep-alive and return the next pending inbound message, if any
    async fn poll(&mut self) -> Option<InboundMessage>;
}
