/// Connection state machine for the push channel
///
/// Pure and socket-free: every input is a [`ConnectionEvent`], every side
/// effect is a [`ConnectionAction`] for the driver to carry out. The driver
/// in `manager.rs` feeds the machine one event at a time.
use crate::credential::CredentialSource;
use crate::push::protocol::{AuthFrame, LiveNotification, PushEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No channel and nothing scheduled
    Closed,
    /// Channel is being opened
    Connecting,
    /// Channel is open and the AUTH frame was sent
    Open,
    /// Channel is gone, a reconnection timer is pending
    Reconnecting,
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connect,
    ChannelOpened,
    FrameReceived(Vec<u8>),
    Closed,
    ErrorOccurred(String),
    ReconnectTimerFired,
    Shutdown,
}

/// Side effects requested by the machine
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    OpenChannel { url: String },
    SendFrame(String),
    Deliver(LiveNotification),
    ScheduleReconnect(Duration),
    CancelReconnect,
    CloseChannel,
}

/// Counters kept across the lifetime of one machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub open_attempts: u64,
    pub reconnects_scheduled: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub credential_misses: u64,
    pub auth_acks: u64,
}

pub struct ConnectionMachine {
    user_id: String,
    url: String,
    reconnect_delay: Duration,
    credentials: Arc<dyn CredentialSource>,
    state: ConnectionState,
    pending_token: Option<String>,
    reconnect_pending: bool,
    shut_down: bool,
    authenticated: bool,
    next_seq: u64,
    stats: ConnectionStats,
}

impl ConnectionMachine {
    pub fn new(
        user_id: impl Into<String>,
        url: impl Into<String>,
        reconnect_delay: Duration,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            url: url.into(),
            reconnect_delay,
            credentials,
            state: ConnectionState::Closed,
            pending_token: None,
            reconnect_pending: false,
            shut_down: false,
            authenticated: false,
            next_seq: 0,
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Single dispatch path for every event
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<ConnectionAction> {
        // After an explicit shutdown nothing may reopen the channel.
        if self.shut_down {
            debug!(user = %self.user_id, ?event, "Ignoring event after shutdown");
            return Vec::new();
        }

        match event {
            ConnectionEvent::Connect => self.on_connect(),
            ConnectionEvent::ChannelOpened => self.on_channel_opened(),
            ConnectionEvent::FrameReceived(data) => self.on_frame(&data),
            ConnectionEvent::Closed => self.on_closed(),
            ConnectionEvent::ErrorOccurred(reason) => self.on_error(&reason),
            ConnectionEvent::ReconnectTimerFired => {
                self.reconnect_pending = false;
                self.state = ConnectionState::Closed;
                self.on_connect()
            }
            ConnectionEvent::Shutdown => self.on_shutdown(),
        }
    }

    fn on_connect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!(user = %self.user_id, state = ?self.state, "Connect ignored, channel already active");
                return actions;
            }
            ConnectionState::Reconnecting => {
                self.reconnect_pending = false;
                actions.push(ConnectionAction::CancelReconnect);
            }
            ConnectionState::Closed => {}
        }

        let Some(token) = self.credentials.credential() else {
            self.stats.credential_misses += 1;
            self.state = ConnectionState::Closed;
            warn!(user = %self.user_id, "Push authentication failed: no session token found");
            return actions;
        };

        self.stats.open_attempts += 1;
        self.state = ConnectionState::Connecting;
        self.pending_token = Some(token);
        debug!(user = %self.user_id, attempt = self.stats.open_attempts, "Opening push channel");
        actions.push(ConnectionAction::OpenChannel {
            url: self.url.clone(),
        });
        actions
    }

    fn on_channel_opened(&mut self) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            debug!(user = %self.user_id, state = ?self.state, "Unexpected channel-open");
            return Vec::new();
        }

        let Some(token) = self.pending_token.take() else {
            return self.on_error("channel opened without a pending credential");
        };

        match AuthFrame::new(token).to_text() {
            Ok(text) => {
                self.state = ConnectionState::Open;
                self.authenticated = false;
                info!(user = %self.user_id, "Push channel open, AUTH sent");
                vec![ConnectionAction::SendFrame(text)]
            }
            Err(e) => self.on_error(&format!("failed to serialize AUTH frame: {}", e)),
        }
    }

    fn on_frame(&mut self, data: &[u8]) -> Vec<ConnectionAction> {
        // Acks are recorded and still delivered like any decoded frame
        match PushEvent::from_bytes(data) {
            Ok(event) => {
                let payload = match event {
                    PushEvent::AuthAck(payload) => {
                        self.authenticated = true;
                        self.stats.auth_acks += 1;
                        debug!(user = %self.user_id, "Push channel authenticated");
                        payload
                    }
                    PushEvent::Payload(payload) => payload,
                };
                self.next_seq += 1;
                self.stats.frames_delivered += 1;
                vec![ConnectionAction::Deliver(LiveNotification::new(
                    self.next_seq,
                    payload,
                ))]
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                warn!(user = %self.user_id, "Dropping undecodable push frame: {}", e);
                Vec::new()
            }
        }
    }

    fn on_closed(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Closed {
            debug!(user = %self.user_id, "Close event without an active channel");
            return Vec::new();
        }
        if self.reconnect_pending {
            debug!(user = %self.user_id, "Reconnect already scheduled");
            return Vec::new();
        }

        self.state = ConnectionState::Reconnecting;
        self.reconnect_pending = true;
        self.authenticated = false;
        self.pending_token = None;
        self.stats.reconnects_scheduled += 1;
        info!(
            user = %self.user_id,
            "Push channel closed, reconnecting in {:?}", self.reconnect_delay
        );
        vec![ConnectionAction::ScheduleReconnect(self.reconnect_delay)]
    }

    fn on_error(&mut self, reason: &str) -> Vec<ConnectionAction> {
        warn!(user = %self.user_id, "Push channel error: {}", reason);
        let mut actions = vec![ConnectionAction::CloseChannel];
        actions.extend(self.on_closed());
        actions
    }

    fn on_shutdown(&mut self) -> Vec<ConnectionAction> {
        // Order matters: stop reacting to close events, drop the timer, then close.
        self.shut_down = true;
        self.reconnect_pending = false;
        self.pending_token = None;
        self.state = ConnectionState::Closed;
        info!(user = %self.user_id, "Push channel shut down");
        vec![ConnectionAction::CancelReconnect, ConnectionAction::CloseChannel]
    }
}
