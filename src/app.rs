//! Indicator application: owned state plus the cooperative loop step
//!
//! One [`Indicator::step`] is one loop iteration: drain inbound messages,
//! then render and supervise when their cadences are due. Inputs applied
//! by the drain are always visible to the render in the same iteration.
//! A sink failure never holds back the supervisor, and a failed connect
//! attempt blinks the status pixel.

use log::{debug, info, warn};
use smart_leds::{RGB8, SmartLedsWrite};

use crate::breathing::BreathingOscillator;
use crate::config::{ConfigError, IndicatorConfig};
use crate::control::{ControlError, ControlEvent, DisplayModeController, DisplayState};
use crate::led_control::{Frame, IndicatorColor, IndicatorRenderer, STATUS_ERROR_COLOR};
use crate::metric::{MetricKind, parse_value};
use crate::range_table::RangeTable;
use crate::state_machine::{ConnectionSupervisor, LinkState};
use crate::telemetry::TelemetryStore;
use crate::topics::{Route, TopicMap, make_device_id};
use crate::transport::{InboundMessage, MessagingClient};

/// Upper bound on messages handled per loop iteration
pub const MAX_DRAIN_PER_STEP: usize = 16;

/// Everything the control path writes and the renderer reads
#[derive(Debug, Clone)]
pub struct AppState {
    pub ranges: RangeTable,
    pub telemetry: TelemetryStore,
    pub display: DisplayState,
}

impl AppState {
    pub fn from_config(config: &IndicatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let ranges = RangeTable::new(config.ranges).map_err(|_| ConfigError::Range(config.default_mode))?;
        Ok(Self {
            ranges,
            telemetry: TelemetryStore::new(),
            display: DisplayState::new(config.default_mode, config.default_brightness),
        })
    }

    /// Render inputs for the active metric
    pub fn frame(&self, now_ms: u64) -> Frame {
        let kind = self.display.active_kind;
        Frame {
            kind,
            value: self.telemetry.get(kind),
            range: self.ranges.get(kind),
            brightness_scale: self.display.brightness_scale,
            now_ms,
        }
    }
}

/// Fixed-cadence task bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    interval_ms: u64,
    last_run_ms: Option<u64>,
}

impl Periodic {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_run_ms: None,
        }
    }

    /// True (and marks the run) when the interval has elapsed. The first
    /// call is always due.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let due = match self.last_run_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        };
        if due {
            self.last_run_ms = Some(now_ms);
        }
        due
    }
}

/// What happened with one inbound message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    Telemetry(MetricKind, f32),
    Control(ControlEvent),
    /// Payload did not parse; the stored sample is unchanged
    Malformed(MetricKind),
    /// Control event was refused or unrecognized
    ControlRejected(ControlError),
    /// No route for this topic
    Ignored,
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub drained: usize,
    pub rendered: Option<IndicatorColor>,
    pub link: Option<LinkState>,
}

/// The indicator core wired to its collaborators
pub struct Indicator<C, S> {
    state: AppState,
    topics: TopicMap,
    controller: DisplayModeController,
    renderer: IndicatorRenderer,
    supervisor: ConnectionSupervisor,
    render_timer: Periodic,
    supervisor_timer: Periodic,
    status_flash_ms: u64,
    client: C,
    sink: S,
}

impl<C, S> Indicator<C, S>
where
    C: MessagingClient,
    S: SmartLedsWrite,
    RGB8: Into<S::Color>,
    S::Error: core::fmt::Debug,
{
    pub fn new(config: &IndicatorConfig, client: C, sink: S) -> Result<Self, ConfigError> {
        let state = AppState::from_config(config)?;
        let topics = TopicMap::new(config.client_id).map_err(|_| ConfigError::Identity)?;
        let device_id =
            make_device_id(config.device_type, config.client_id).map_err(|_| ConfigError::Identity)?;

        info!(
            "[STATE] Indicator ready: device {}, mode {:?}, {} pixels",
            device_id, state.display.active_kind, config.pixel_count
        );

        Ok(Self {
            state,
            topics,
            controller: DisplayModeController::new(config.range_control_kind),
            renderer: IndicatorRenderer::new(
                config.pixel_count,
                BreathingOscillator::new(config.breathing_period_ms),
            ),
            supervisor: ConnectionSupervisor::new(device_id),
            render_timer: Periodic::new(config.render_interval_ms),
            supervisor_timer: Periodic::new(config.supervisor_interval_ms),
            status_flash_ms: config.status_flash_ms,
            client,
            sink,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn renderer(&self) -> &IndicatorRenderer {
        &self.renderer
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Route one inbound message to the telemetry store or the controller
    pub fn handle_message(&mut self, message: &InboundMessage) -> Delivery {
        match self.topics.route(&message.topic) {
            Some(Route::Data(kind)) => match parse_value(&message.payload) {
                Ok(value) => {
                    self.state.telemetry.update(kind, value);
                    let precision = if kind.is_integral() { 0 } else { 1 };
                    debug!(
                        "[DATA] {} = {:.*} {}",
                        kind.name(),
                        precision,
                        value,
                        kind.unit()
                    );
                    Delivery::Telemetry(kind, value)
                }
                Err(e) => {
                    warn!(
                        "[DATA] Malformed {} payload {:?} on {} ({:?}), keeping {}",
                        kind.name(),
                        core::str::from_utf8(&message.payload).unwrap_or("<binary>"),
                        message.topic,
                        e,
                        self.state.telemetry.get(kind)
                    );
                    Delivery::Malformed(kind)
                }
            },
            Some(Route::Control(pin)) => {
                let event = self.controller.parse(pin, &message.payload);
                self.apply_control(event)
            }
            None => {
                debug!("[MQTT] No route for {}", message.topic);
                Delivery::Ignored
            }
        }
    }

    /// Apply a control event directly (dashboard bridge or local input)
    pub fn apply_control(&mut self, event: ControlEvent) -> Delivery {
        match self
            .controller
            .apply(event, &mut self.state.display, &mut self.state.ranges)
        {
            Ok(()) => Delivery::Control(event),
            Err(e) => Delivery::ControlRejected(e),
        }
    }

    /// Drain up to [`MAX_DRAIN_PER_STEP`] pending messages
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_DRAIN_PER_STEP {
            let Some(message) = self.client.poll().await else {
                break;
            };
            self.handle_message(&message);
            handled += 1;
        }
        handled
    }

    /// Repaint the strip from the current state
    pub fn render(&mut self, now_ms: u64) -> Result<IndicatorColor, S::Error> {
        let frame = self.state.frame(now_ms);
        self.renderer.render(&mut self.sink, &frame)
    }

    /// Run one supervisor tick regardless of cadence
    pub async fn supervise(&mut self) -> LinkState {
        self.supervisor.tick(&mut self.client, &self.topics).await
    }

    /// One cooperative loop iteration at `now_ms`.
    ///
    /// The supervisor tick runs even when the sink fails; the sink error is
    /// returned afterwards and the caller decides whether to skip the frame.
    pub async fn step(&mut self, now_ms: u64) -> Result<StepReport, S::Error> {
        let drained = self.drain().await;

        let rendered = if self.render_timer.poll(now_ms) {
            Some(self.render(now_ms))
        } else {
            None
        };

        let link = if self.supervisor_timer.poll(now_ms) {
            let link = self.supervise().await;
            if link == LinkState::Disconnected {
                self.renderer
                    .flash(STATUS_ERROR_COLOR, now_ms, self.status_flash_ms);
            }
            Some(link)
        } else {
            None
        };

        Ok(StepReport {
            drained,
            rendered: rendered.transpose()?,
            link,
        })
    }
}
