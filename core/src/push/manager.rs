/// Connection manager: runs the state machine against a real transport
use crate::config::Config;
use crate::credential::CredentialSource;
use crate::push::machine::{
    ConnectionAction, ConnectionEvent, ConnectionMachine, ConnectionState, ConnectionStats,
};
use crate::push::protocol::LiveNotification;
use crate::push::transport::{PushChannel, PushTransport};
use crate::error::Result;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Owns exactly one push channel for one user identity.
///
/// Dropping the manager without calling [`ConnectionManager::close`] also
/// shuts the channel down, but without waiting for it.
pub struct ConnectionManager {
    id: Uuid,
    user_id: String,
    commands: mpsc::UnboundedSender<()>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<ConnectionStats>,
}

impl ConnectionManager {
    /// Start a connection for `user_id`; `None` when there is no identity
    pub fn open(
        user_id: Option<&str>,
        config: &Config,
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialSource>,
        deliver: mpsc::UnboundedSender<LiveNotification>,
    ) -> Option<Self> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            debug!("No user identity, push channel not opened");
            return None;
        };

        let id = Uuid::new_v4();
        let machine = ConnectionMachine::new(
            user_id,
            config.push_url(user_id),
            config.reconnect_delay,
            credentials,
        );
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Closed);

        let driver = Driver {
            machine,
            transport,
            channel: None,
            reconnect: None,
            commands: command_rx,
            deliver,
            state: state_tx,
        };
        let span = info_span!("push", conn = %id, user = %user_id);
        let task = tokio::spawn(driver.run().instrument(span));

        info!("Created push connection {} for user {}", id, user_id);

        Some(Self {
            id,
            user_id: user_id.to_string(),
            commands,
            state,
            task,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Explicit teardown; waits for the driver and returns its counters
    pub async fn close(self) -> ConnectionStats {
        // A send error means the driver already stopped on its own.
        let _ = self.commands.send(());
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Push connection {} task failed: {}", self.id, e);
                ConnectionStats::default()
            }
        }
    }
}

/// What woke the driver loop
enum Wake {
    Command,
    Frame(Option<Result<Vec<u8>>>),
    Timer,
}

struct Driver {
    machine: ConnectionMachine,
    transport: Arc<dyn PushTransport>,
    channel: Option<Box<dyn PushChannel>>,
    reconnect: Option<Pin<Box<Sleep>>>,
    commands: mpsc::UnboundedReceiver<()>,
    deliver: mpsc::UnboundedSender<LiveNotification>,
    state: watch::Sender<ConnectionState>,
}

impl Driver {
    async fn run(mut self) -> ConnectionStats {
        self.dispatch(ConnectionEvent::Connect).await;

        while !self.machine.is_shut_down() {
            let wake = tokio::select! {
                biased;
                _ = self.commands.recv() => Wake::Command,
                frame = next_frame(&mut self.channel) => Wake::Frame(frame),
                () = wait_reconnect(&mut self.reconnect) => Wake::Timer,
            };

            let event = match wake {
                Wake::Command => ConnectionEvent::Shutdown,
                Wake::Frame(Some(Ok(data))) => ConnectionEvent::FrameReceived(data),
                Wake::Frame(Some(Err(e))) => ConnectionEvent::ErrorOccurred(e.to_string()),
                Wake::Frame(None) => {
                    self.channel = None;
                    ConnectionEvent::Closed
                }
                Wake::Timer => {
                    self.reconnect = None;
                    ConnectionEvent::ReconnectTimerFired
                }
            };

            self.dispatch(event).await;
        }

        let stats = self.machine.stats();
        debug!(?stats, "Push driver stopped");
        stats
    }

    async fn dispatch(&mut self, event: ConnectionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for action in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(action).await {
                    queue.push_back(follow_up);
                }
            }
            self.state.send_replace(self.machine.state());
        }
    }

    async fn execute(&mut self, action: ConnectionAction) -> Option<ConnectionEvent> {
        match action {
            ConnectionAction::OpenChannel { url } => {
                // A close request must not wait for a slow handshake.
                let attempt = tokio::select! {
                    biased;
                    _ = self.commands.recv() => None,
                    result = self.transport.connect(&url) => Some(result),
                };
                match attempt {
                    None => Some(ConnectionEvent::Shutdown),
                    Some(Ok(channel)) => {
                        self.channel = Some(channel);
                        Some(ConnectionEvent::ChannelOpened)
                    }
                    Some(Err(e)) => Some(ConnectionEvent::ErrorOccurred(format!(
                        "failed to open {}: {}",
                        url, e
                    ))),
                }
            }
            ConnectionAction::SendFrame(text) => match self.channel.as_mut() {
                Some(channel) => channel
                    .send_text(text)
                    .await
                    .err()
                    .map(|e| ConnectionEvent::ErrorOccurred(e.to_string())),
                None => {
                    debug!("No channel to send on");
                    None
                }
            },
            ConnectionAction::Deliver(live) => {
                if self.deliver.send(live).is_err() {
                    debug!("Live feed is gone, dropping push payload");
                }
                None
            }
            ConnectionAction::ScheduleReconnect(delay) => {
                self.reconnect = Some(Box::pin(sleep(delay)));
                None
            }
            ConnectionAction::CancelReconnect => {
                self.reconnect = None;
                None
            }
            ConnectionAction::CloseChannel => {
                if let Some(mut channel) = self.channel.take() {
                    channel.close().await;
                }
                None
            }
        }
    }
}

async fn next_frame(channel: &mut Option<Box<dyn PushChannel>>) -> Option<Result<Vec<u8>>> {
    match channel {
        Some(channel) => channel.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn wait_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}
