//! End-to-end scenarios for the indicator loop with a scripted broker and
//! a recording LED strip.
//!
//! Run on the host: `cargo test --tests --target x86_64-unknown-linux-gnu`

use std::collections::{BTreeSet, VecDeque};

use embassy_futures::block_on;
use smart_leds::{RGB8, SmartLedsWrite};

use envdisplay_rs::app::{Delivery, Indicator, MAX_DRAIN_PER_STEP};
use envdisplay_rs::config::IndicatorConfig;
use envdisplay_rs::control::{ControlError, ControlEvent, VirtualPin};
use envdisplay_rs::led_control::{HUE_MAX, STATUS_ERROR_COLOR, STATUS_PIXEL, VALUE_FLOOR};
use envdisplay_rs::metric::MetricKind;
use envdisplay_rs::range_table::{DisplayRange, RangeError};
use envdisplay_rs::state_machine::{ConnectionSupervisor, LinkState};
use envdisplay_rs::topics::TopicMap;
use envdisplay_rs::transport::{ConnectError, InboundMessage, MessagingClient, TransportError};

/// Broker double: records publishes and subscriptions, replays scripted
/// connect outcomes and inbound messages.
#[derive(Default)]
struct MockClient {
    connected: bool,
    connect_results: VecDeque<Result<(), ConnectError>>,
    connect_calls: usize,
    client_ids: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    subscribe_calls: Vec<String>,
    subscriptions: BTreeSet<String>,
    inbound: VecDeque<InboundMessage>,
}

impl MessagingClient for MockClient {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, client_id: &str) -> Result<(), ConnectError> {
        self.connect_calls += 1;
        self.client_ids.push(client_id.to_string());

        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        self.connected = result.is_ok();
        if self.connected {
            // Clean session: the broker forgets earlier subscriptions
            self.subscriptions.clear();
        }
        result
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.subscribe_calls.push(topic.to_string());
        self.subscriptions.insert(topic.to_string());
        Ok(())
    }

    async fn poll(&mut self) -> Option<InboundMessage> {
        if !self.connected {
            return None;
        }
        self.inbound.pop_front()
    }
}

impl MockClient {
    fn online_count(&self) -> usize {
        self.published
            .iter()
            .filter(|(topic, payload)| topic == "30/info/status" && payload == b"ONLINE")
            .count()
    }
}

#[derive(Default)]
struct MockStrip {
    frames: Vec<Vec<RGB8>>,
    fail: bool,
}

impl SmartLedsWrite for MockStrip {
    type Error = &'static str;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        if self.fail {
            return Err("strip offline");
        }
        self.frames.push(iterator.into_iter().map(Into::into).collect());
        Ok(())
    }
}

type TestIndicator = Indicator<MockClient, MockStrip>;

fn indicator() -> TestIndicator {
    Indicator::new(
        &IndicatorConfig::default(),
        MockClient::default(),
        MockStrip::default(),
    )
    .unwrap()
}

fn deliver(indicator: &mut TestIndicator, topic: &str, payload: &str) {
    let message = InboundMessage::new(topic, payload.as_bytes()).unwrap();
    indicator.client_mut().inbound.push_back(message);
}

fn data_topic(kind: MetricKind) -> String {
    format!("30/data/{}", kind.name())
}

#[test]
fn first_step_connects_and_announces() {
    let mut ind = indicator();

    let report = block_on(ind.step(0)).unwrap();
    assert_eq!(report.link, Some(LinkState::Connected));
    assert!(report.rendered.is_some());

    let client = ind.client();
    assert_eq!(client.client_ids, vec!["ESP32-30".to_string()]);
    assert_eq!(client.online_count(), 1);
    assert_eq!(client.subscriptions.len(), 9);
    for kind in MetricKind::ALL {
        assert!(client.subscriptions.contains(&data_topic(kind)));
    }
    for pin in ["brightness", "mode", "range", "range_min"] {
        assert!(client.subscriptions.contains(&format!("30/control/{}", pin)));
    }
    assert_eq!(ind.supervisor().get_session_count(), 1);
}

#[test]
fn co2_sample_renders_midrange_hue() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    deliver(&mut ind, "30/data/co2", "750");
    let report = block_on(ind.step(10)).unwrap();

    assert_eq!(report.drained, 1);
    let color = report.rendered.unwrap();
    assert_eq!(color.hue, 71);
    assert_eq!(ind.state().telemetry.get(MetricKind::Co2), 750.0);

    // Every pixel carries the same color
    let frame = ind.sink().frames.last().unwrap();
    assert_eq!(frame.len(), 2);
    assert!(frame.iter().all(|px| *px == color.to_rgb()));
}

#[test]
fn mode_switch_is_visible_in_same_step() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    deliver(&mut ind, "30/data/temperature", "22.5");
    deliver(&mut ind, "30/data/humidity", "50");
    deliver(&mut ind, "30/control/mode", "2");
    let report = block_on(ind.step(10)).unwrap();

    assert_eq!(report.drained, 3);
    assert_eq!(ind.state().display.active_kind, MetricKind::Humidity);
    // 50 in 30..70 sits halfway down the wheel
    assert_eq!(report.rendered.unwrap().hue, 80);

    // Values for other metrics keep updating while hidden
    deliver(&mut ind, "30/data/co2", "1000");
    block_on(ind.step(20)).unwrap();
    assert_eq!(ind.state().telemetry.get(MetricKind::Co2), 1000.0);
    assert_eq!(ind.renderer().last_color().unwrap().hue, 80);
}

#[test]
fn out_of_range_mode_is_ignored() {
    let mut ind = indicator();

    for payload in ["0", "6", "2.5", "co2"] {
        deliver(&mut ind, "30/control/mode", payload);
    }
    // Messages only flow once connected
    block_on(ind.step(0)).unwrap();
    block_on(ind.step(10)).unwrap();

    assert_eq!(ind.state().display.active_kind, MetricKind::Co2);
}

#[test]
fn reconnect_announces_and_resubscribes_once() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();
    let first_session_calls = ind.client().subscribe_calls.len();

    // Broker drops the session
    ind.client_mut().connected = false;

    // Not due yet: the loss goes unnoticed until the next supervisor tick
    let report = block_on(ind.step(500)).unwrap();
    assert_eq!(report.link, None);
    assert!(ind.supervisor().is_connected());

    let report = block_on(ind.step(1000)).unwrap();
    assert_eq!(report.link, Some(LinkState::Connected));

    let client = ind.client();
    assert_eq!(client.connect_calls, 2);
    assert_eq!(client.online_count(), 2);

    let second_session = &client.subscribe_calls[first_session_calls..];
    for kind in MetricKind::ALL {
        let topic = data_topic(kind);
        assert_eq!(second_session.iter().filter(|t| **t == topic).count(), 1);
    }
    assert_eq!(client.subscriptions.len(), 9);
    assert_eq!(ind.supervisor().get_session_count(), 2);
}

#[test]
fn failed_connects_retry_every_tick() {
    let mut ind = indicator();
    ind.client_mut()
        .connect_results
        .extend([Err(ConnectError::Refused(5)), Err(ConnectError::Timeout)]);

    let report = block_on(ind.step(0)).unwrap();
    assert_eq!(report.link, Some(LinkState::Disconnected));
    assert_eq!(ind.supervisor().get_retry_count(), 1);
    assert_eq!(ind.supervisor().get_last_error(), Some(ConnectError::Refused(5)));

    // Rendering carries on while the link is down
    let report = block_on(ind.step(500)).unwrap();
    assert!(report.rendered.is_some());
    assert_eq!(report.link, None);

    let report = block_on(ind.step(1000)).unwrap();
    assert_eq!(report.link, Some(LinkState::Disconnected));
    assert_eq!(ind.supervisor().get_retry_count(), 2);

    let report = block_on(ind.step(2000)).unwrap();
    assert_eq!(report.link, Some(LinkState::Connected));
    assert_eq!(ind.supervisor().get_retry_count(), 0);
    assert_eq!(ind.client().connect_calls, 3);
    assert_eq!(ind.client().online_count(), 1);
}

#[test]
fn malformed_payload_keeps_previous_value() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    deliver(&mut ind, "30/data/co2", "750");
    block_on(ind.step(10)).unwrap();

    let message = InboundMessage::new("30/data/co2", b"abc").unwrap();
    assert_eq!(ind.handle_message(&message), Delivery::Malformed(MetricKind::Co2));
    assert_eq!(ind.state().telemetry.get(MetricKind::Co2), 750.0);

    deliver(&mut ind, "30/data/temperature", "21.5");
    deliver(&mut ind, "30/data/temperature", "abc");
    let report = block_on(ind.step(20)).unwrap();
    assert_eq!(report.drained, 2);
    assert_eq!(report.rendered.unwrap().hue, 71);
    assert_eq!(ind.state().telemetry.get(MetricKind::Temperature), 21.5);
}

#[test]
fn unknown_topics_are_ignored() {
    let mut ind = indicator();

    for topic in ["31/data/co2", "30/data/pressure", "30/info/status"] {
        let message = InboundMessage::new(topic, b"1").unwrap();
        assert_eq!(ind.handle_message(&message), Delivery::Ignored);
    }
    for kind in MetricKind::ALL {
        assert!(!ind.state().telemetry.has_sample(kind));
    }
}

#[test]
fn repeated_announce_does_not_grow_subscriptions() {
    let topics = TopicMap::new(30).unwrap();
    let mut client = MockClient::default();
    block_on(client.connect("ESP32-30")).unwrap();

    assert_eq!(block_on(ConnectionSupervisor::announce(&mut client, &topics)), Ok(9));
    assert_eq!(block_on(ConnectionSupervisor::announce(&mut client, &topics)), Ok(9));

    assert_eq!(client.subscriptions.len(), 9);
    assert_eq!(client.online_count(), 2);
}

#[test]
fn announce_requires_a_session() {
    let topics = TopicMap::new(30).unwrap();
    let mut client = MockClient::default();

    assert_eq!(
        block_on(ConnectionSupervisor::announce(&mut client, &topics)),
        Err(TransportError::NotConnected)
    );
    assert!(client.subscriptions.is_empty());
}

#[test]
fn range_controls_edit_co2_bounds() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    deliver(&mut ind, "30/control/range", "800");
    deliver(&mut ind, "30/data/co2", "800");
    let report = block_on(ind.step(10)).unwrap();

    assert_eq!(
        ind.state().ranges.get(MetricKind::Co2),
        DisplayRange { min: 440.0, max: 800.0 }
    );
    assert_eq!(report.rendered.unwrap().hue, 0);

    deliver(&mut ind, "30/control/range_min", "600");
    block_on(ind.step(20)).unwrap();
    assert_eq!(
        ind.state().ranges.get(MetricKind::Co2),
        DisplayRange { min: 600.0, max: 800.0 }
    );
}

#[test]
fn inverted_range_is_rejected() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    let message = InboundMessage::new("30/control/range_min", b"2000").unwrap();
    assert_eq!(
        ind.handle_message(&message),
        Delivery::ControlRejected(ControlError::RangeRejected {
            kind: MetricKind::Co2,
            requested: DisplayRange { min: 2000.0, max: 1000.0 },
            reason: RangeError::Inverted,
        })
    );
    assert_eq!(
        ind.state().ranges.get(MetricKind::Co2),
        DisplayRange { min: 440.0, max: 1000.0 }
    );

    // Collapsed range is rejected too
    let message = InboundMessage::new("30/control/range", b"440").unwrap();
    assert!(matches!(
        ind.handle_message(&message),
        Delivery::ControlRejected(ControlError::RangeRejected { .. })
    ));
    assert!(ind.state().ranges.get(MetricKind::Co2).check().is_ok());
}

#[test]
fn brightness_scales_value_channel() {
    let mut ind = indicator();

    let off = ind.apply_control(ControlEvent::SetBrightness(0.0));
    assert_eq!(off, Delivery::Control(ControlEvent::SetBrightness(0.0)));
    let color = block_on(ind.step(500)).unwrap().rendered.unwrap();
    assert_eq!(color.val, VALUE_FLOOR);

    // Out-of-range requests clamp
    ind.apply_control(ControlEvent::SetBrightness(4.0));
    assert_eq!(ind.state().display.brightness_scale, 1.0);

    deliver(&mut ind, "30/control/brightness", "0.25");
    block_on(ind.step(1000)).unwrap();
    assert_eq!(ind.state().display.brightness_scale, 0.25);
}

#[test]
fn no_sample_shows_bottom_of_range() {
    let mut ind = indicator();
    let color = block_on(ind.step(0)).unwrap().rendered.unwrap();

    // 0 ppm is below the CO2 range, so it saturates to the cool end
    assert_eq!(color.hue, HUE_MAX);
}

#[test]
fn drain_is_bounded_per_step() {
    let mut ind = indicator();
    block_on(ind.step(0)).unwrap();

    for i in 0..(MAX_DRAIN_PER_STEP + 4) {
        deliver(&mut ind, "30/data/power", &format!("{}", i * 10));
    }

    let report = block_on(ind.step(10)).unwrap();
    assert_eq!(report.drained, MAX_DRAIN_PER_STEP);

    let report = block_on(ind.step(20)).unwrap();
    assert_eq!(report.drained, 4);
    assert_eq!(
        ind.state().telemetry.get(MetricKind::Power),
        ((MAX_DRAIN_PER_STEP + 3) * 10) as f32
    );
}

#[test]
fn render_cadence_skips_early_steps() {
    let mut ind = indicator();

    assert!(block_on(ind.step(0)).unwrap().rendered.is_some());
    assert!(block_on(ind.step(5)).unwrap().rendered.is_none());
    assert!(block_on(ind.step(10)).unwrap().rendered.is_some());
    assert_eq!(ind.sink().frames.len(), 2);
    assert_eq!(ind.renderer().frames(), 2);
}

#[test]
fn sink_failure_is_reported_and_recovers() {
    let mut ind = indicator();
    ind.sink_mut().fail = true;

    assert_eq!(block_on(ind.step(0)).err(), Some("strip offline"));
    assert_eq!(ind.renderer().last_color(), None);
    // The supervisor still ran in the failing iteration
    assert!(ind.supervisor().is_connected());

    ind.sink_mut().fail = false;
    let report = block_on(ind.step(10)).unwrap();
    assert!(report.rendered.is_some());
    assert_eq!(report.link, None);
}

#[test]
fn supervisor_runs_while_strip_keeps_failing() {
    let mut ind = indicator();
    ind.sink_mut().fail = true;

    for now_ms in (0..=5000).step_by(10) {
        if now_ms == 500 {
            deliver(&mut ind, "30/data/co2", "900");
        }
        if now_ms == 2500 {
            ind.client_mut().connected = false;
        }
        assert_eq!(block_on(ind.step(now_ms)).err(), Some("strip offline"));
    }

    assert!(ind.sink().frames.is_empty());
    assert_eq!(ind.renderer().frames(), 0);
    assert_eq!(ind.state().telemetry.get(MetricKind::Co2), 900.0);

    let client = ind.client();
    assert_eq!(client.connect_calls, 2);
    assert_eq!(client.online_count(), 2);
    assert_eq!(client.subscriptions.len(), 9);
    assert!(ind.supervisor().is_connected());
    assert_eq!(ind.supervisor().get_session_count(), 2);
}

#[test]
fn failed_connect_flashes_status_pixel() {
    let mut ind = indicator();
    ind.client_mut().connect_results.push_back(Err(ConnectError::Timeout));

    let report = block_on(ind.step(0)).unwrap();
    assert_eq!(report.link, Some(LinkState::Disconnected));
    assert!(ind.renderer().status_flash().is_some());

    let color = block_on(ind.step(10)).unwrap().rendered.unwrap();
    let frame = ind.sink().frames.last().unwrap();
    assert_eq!(frame[STATUS_PIXEL], STATUS_ERROR_COLOR);
    assert_eq!(frame[1], color.to_rgb());

    block_on(ind.step(60)).unwrap();
    assert_eq!(ind.sink().frames.last().unwrap()[STATUS_PIXEL], RGB8::default());

    let color = block_on(ind.step(110)).unwrap().rendered.unwrap();
    assert!(ind.sink().frames.last().unwrap().iter().all(|px| *px == color.to_rgb()));

    // A successful attempt does not flash
    let report = block_on(ind.step(1000)).unwrap();
    assert_eq!(report.link, Some(LinkState::Connected));
    assert_eq!(ind.renderer().status_flash(), None);
}

#[test]
fn control_topic_routes_match_pins() {
    let topics = TopicMap::new(30).unwrap();
    assert_eq!(topics.control_topic(VirtualPin::RangeMax), "30/control/range");
    assert_eq!(topics.control_topic(VirtualPin::RangeMin), "30/control/range_min");
}
