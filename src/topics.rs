//! Topic naming and the topic → route binding
//!
//! Layout for client `30`:
//! - `30/data/<metric>`   inbound telemetry, one per metric
//! - `30/control/<pin>`   inbound dashboard control pins
//! - `30/info/status`     outbound status announcements

use core::fmt::Write;

use heapless::String;

use crate::control::{PIN_COUNT, VirtualPin};
use crate::metric::{METRIC_COUNT, MetricKind};

/// Longest topic name the binding can hold
pub const MAX_TOPIC_LEN: usize = 48;

pub type Topic = String<MAX_TOPIC_LEN>;

/// Device identifier (`<device_type>-<client_id>`)
pub type DeviceId = String<32>;

/// Payload published to the status topic on every (re)connect
pub const ONLINE_PAYLOAD: &[u8] = b"ONLINE";

/// Topic could not be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicTooLong;

/// Where an inbound topic is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Data(MetricKind),
    Control(VirtualPin),
}

/// Build the stable device identifier used as the broker client handle
pub fn make_device_id(device_type: &str, client_id: u32) -> Result<DeviceId, TopicTooLong> {
    let mut id = DeviceId::new();
    write!(id, "{}-{}", device_type, client_id).map_err(|_| TopicTooLong)?;
    Ok(id)
}

/// Fixed bijection between metric kinds (and control pins) and topic names,
/// built once at startup.
#[derive(Debug, Clone)]
pub struct TopicMap {
    data: [Topic; METRIC_COUNT],
    control: [Topic; PIN_COUNT],
    status: Topic,
}

impl TopicMap {
    pub fn new(client_id: u32) -> Result<Self, TopicTooLong> {
        let data = build(MetricKind::ALL, |topic, kind| {
            write!(topic, "{}/data/{}", client_id, kind.name())
        })?;
        let control = build(VirtualPin::ALL, |topic, pin| {
            write!(topic, "{}/control/{}", client_id, pin.name())
        })?;

        let mut status = Topic::new();
        write!(status, "{}/info/status", client_id).map_err(|_| TopicTooLong)?;

        Ok(Self {
            data,
            control,
            status,
        })
    }

    /// Inbound data topic for `kind`
    pub fn data_topic(&self, kind: MetricKind) -> &str {
        &self.data[kind.index()]
    }

    pub fn control_topic(&self, pin: VirtualPin) -> &str {
        &self.control[pin.index()]
    }

    pub fn status_topic(&self) -> &str {
        &self.status
    }

    /// Every topic the device subscribes to
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .chain(self.control.iter())
            .map(|topic| topic.as_str())
    }

    /// Resolve an inbound topic. The status topic and foreign topics have no route.
    pub fn route(&self, topic: &str) -> Option<Route> {
        if let Some(kind) = MetricKind::ALL
            .into_iter()
            .find(|kind| self.data_topic(*kind) == topic)
        {
            return Some(Route::Data(kind));
        }

        VirtualPin::ALL
            .into_iter()
            .find(|pin| self.control_topic(*pin) == topic)
            .map(Route::Control)
    }
}

fn build<T: Copy, const N: usize>(
    items: [T; N],
    mut format: impl FnMut(&mut Topic, T) -> core::fmt::Result,
) -> Result<[Topic; N], TopicTooLong> {
    let mut topics: [Topic; N] = core::array::from_fn(|_| Topic::new());
    for (topic, item) in topics.iter_mut().zip(items) {
        format(topic, item).map_err(|_| TopicTooLong)?;
    }
    Ok(topics)
}
