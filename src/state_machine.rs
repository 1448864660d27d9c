//! Broker connection supervisor
//!
//! Polled on a fixed cadence (the transport has no connect notification).
//! Each tick checks liveness and, when disconnected, makes one connect
//! attempt; a successful attempt announces `ONLINE` and re-subscribes to
//! every topic before the tick returns.

use log::{debug, info, warn};

use crate::topics::{DeviceId, ONLINE_PAYLOAD, TopicMap};
use crate::transport::{ConnectError, MessagingClient, TransportError};

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inputs to the link state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Supervisor tick while not connected
    Tick,
    /// Connect and announcement both succeeded
    ConnectSucceeded,
    ConnectFailed(ConnectError),
    /// Announcement after connect failed half way
    AnnounceFailed(TransportError),
    /// Liveness check reported not-connected
    LinkLost,
}

/// State transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(LinkState),
    /// Move to a new state and reset the retry counter
    TransitionWithReset(LinkState),
}

/// Keeps the broker session alive
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    current_state: LinkState,
    previous_state: Option<LinkState>,
    client_id: DeviceId,
    retry_count: u32,
    last_error: Option<ConnectError>,
    sessions: u32,
}

impl ConnectionSupervisor {
    /// `client_id` is the stable device identifier used as the client handle
    pub fn new(client_id: DeviceId) -> Self {
        Self {
            current_state: LinkState::Disconnected,
            previous_state: None,
            client_id,
            retry_count: 0,
            last_error: None,
            sessions: 0,
        }
    }

    pub fn get_current_state(&self) -> LinkState {
        self.current_state
    }

    pub fn get_previous_state(&self) -> Option<LinkState> {
        self.previous_state
    }

    /// Failed attempts since the last successful connect
    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn get_last_error(&self) -> Option<ConnectError> {
        self.last_error
    }

    /// Number of sessions established so far
    pub fn get_session_count(&self) -> u32 {
        self.sessions
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.current_state == LinkState::Connected
    }

    /// Apply an event to the state machine
    pub fn handle_event(&mut self, event: LinkEvent) -> StateTransition {
        let transition = Self::get_state_transition(self.current_state, event);

        match transition {
            StateTransition::Transition(new_state) => {
                self.transition_to_state(new_state);
            }
            StateTransition::TransitionWithReset(new_state) => {
                self.retry_count = 0;
                self.last_error = None;
                self.transition_to_state(new_state);
            }
            StateTransition::Stay => {}
        }

        match event {
            LinkEvent::ConnectFailed(e) => {
                self.retry_count += 1;
                self.last_error = Some(e);
            }
            LinkEvent::AnnounceFailed(_) => self.retry_count += 1,
            _ => {}
        }

        transition
    }

    fn transition_to_state(&mut self, new_state: LinkState) {
        if new_state != self.current_state {
            debug!("[STATE] Link {:?} -> {:?}", self.current_state, new_state);
            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    fn get_state_transition(current_state: LinkState, event: LinkEvent) -> StateTransition {
        match (current_state, event) {
            (LinkState::Disconnected, LinkEvent::Tick) => {
                StateTransition::Transition(LinkState::Connecting)
            }

            (LinkState::Connecting, LinkEvent::ConnectSucceeded) => {
                StateTransition::TransitionWithReset(LinkState::Connected)
            }
            (LinkState::Connecting, LinkEvent::ConnectFailed(_))
            | (LinkState::Connecting, LinkEvent::AnnounceFailed(_)) => {
                StateTransition::Transition(LinkState::Disconnected)
            }

            (LinkState::Connected, LinkEvent::LinkLost) => {
                StateTransition::Transition(LinkState::Disconnected)
            }

            _ => StateTransition::Stay,
        }
    }

    /// One supervisor tick.
    ///
    /// Loss is only detected here, lazily; there is no heartbeat beyond the
    /// transport's own keep-alive. A failed attempt is retried on the next
    /// tick, giving a fixed retry cadence.
    pub async fn tick<C: MessagingClient>(&mut self, client: &mut C, topics: &TopicMap) -> LinkState {
        if self.current_state == LinkState::Connected {
            if client.is_connected() {
                return self.current_state;
            }
            warn!("[MQTT] Connection lost");
            self.handle_event(LinkEvent::LinkLost);
        }

        self.handle_event(LinkEvent::Tick);
        info!(
            "[MQTT] Attempting connection as {} (attempt {})",
            self.client_id,
            self.retry_count + 1
        );

        if let Err(e) = client.connect(&self.client_id).await {
            warn!(
                "[MQTT] Connect failed, rc={} ({:?}), retrying next tick",
                e.code(),
                e
            );
            self.handle_event(LinkEvent::ConnectFailed(e));
            return self.current_state;
        }

        match Self::announce(client, topics).await {
            Ok(count) => {
                self.handle_event(LinkEvent::ConnectSucceeded);
                self.sessions += 1;
                info!("[MQTT] Connected, ONLINE published, {} topics subscribed", count);
            }
            Err(e) => {
                // Nothing partial is kept: the next attempt redoes the whole announcement
                warn!("[MQTT] Announcement failed: {:?}", e);
                self.handle_event(LinkEvent::AnnounceFailed(e));
            }
        }

        self.current_state
    }

    /// Publish `ONLINE` to the status topic and subscribe to every topic.
    ///
    /// Safe to repeat on a live session: the broker treats a repeated
    /// subscription as a replacement.
    pub async fn announce<C: MessagingClient>(
        client: &mut C,
        topics: &TopicMap,
    ) -> Result<usize, TransportError> {
        client.publish(topics.status_topic(), ONLINE_PAYLOAD).await?;

        let mut count = 0;
        for topic in topics.subscriptions() {
            client.subscribe(topic).await?;
            count += 1;
        }
        debug!("[MQTT] Subscribed to {} topics", count);

        Ok(count)
    }
}
