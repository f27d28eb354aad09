/// Live notification feed: the append-only store of push payloads
use crate::config::Config;
use crate::credential::CredentialSource;
use crate::push::{ConnectionManager, ConnectionState, ConnectionStats, LiveNotification, PushTransport};
use futures_util::stream::{unfold, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fan-out buffer per live subscriber; the store itself is unbounded
const LIVE_CAPACITY: usize = 256;

/// Ordered stream of live payloads for one subscription
pub type LiveStream = BoxStream<'static, LiveNotification>;

struct Subscription {
    connection: ConnectionManager,
    pump: JoinHandle<()>,
}

pub struct LiveFeed {
    config: Config,
    transport: Arc<dyn PushTransport>,
    credentials: Arc<dyn CredentialSource>,
    items: Arc<RwLock<Vec<LiveNotification>>>,
    events: broadcast::Sender<LiveNotification>,
    user_id: Option<String>,
    subscription: Option<Subscription>,
}

impl LiveFeed {
    pub fn new(
        config: Config,
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            config,
            transport,
            credentials,
            items: Arc::new(RwLock::new(Vec::new())),
            events,
            user_id: None,
            subscription: None,
        }
    }

    /// (Re)subscribe for `user_id`.
    ///
    /// The previous connection is closed and its pending payloads drained
    /// before the new one opens. Streams handed out earlier end. Switching to
    /// a different identity clears the accumulated sequence.
    pub async fn subscribe(&mut self, user_id: Option<&str>) -> LiveStream {
        if let Some(stats) = self.teardown().await {
            debug!(?stats, "Previous live subscription closed");
        }

        if self.user_id.as_deref() != user_id {
            self.items.write().await.clear();
        }
        self.user_id = user_id.map(str::to_string);

        let (events, _) = broadcast::channel(LIVE_CAPACITY);
        self.events = events;
        let stream = self.stream();

        let (deliver, inbound) = mpsc::unbounded_channel();
        if let Some(connection) = ConnectionManager::open(
            user_id,
            &self.config,
            self.transport.clone(),
            self.credentials.clone(),
            deliver,
        ) {
            let pump = tokio::spawn(pump(inbound, self.items.clone(), self.events.clone()));
            self.subscription = Some(Subscription { connection, pump });
        }

        stream
    }

    /// Another stream over the current subscription
    pub fn stream(&self) -> LiveStream {
        live_stream(self.events.subscribe())
    }

    /// Everything received so far, in arrival order
    pub async fn items(&self) -> Vec<LiveNotification> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.subscription.as_ref().map(|s| s.connection.state())
    }

    /// Close the current subscription, keeping what was accumulated.
    /// Streams handed out so far end.
    pub async fn close(&mut self) -> Option<ConnectionStats> {
        let stats = self.teardown().await;
        let (events, _) = broadcast::channel(LIVE_CAPACITY);
        self.events = events;
        if stats.is_some() {
            info!("Live feed closed");
        }
        stats
    }

    async fn teardown(&mut self) -> Option<ConnectionStats> {
        let subscription = self.subscription.take()?;
        let stats = subscription.connection.close().await;
        // The driver dropped its sender, so the pump finishes once drained.
        if let Err(e) = subscription.pump.await {
            error!("Live feed pump failed: {}", e);
        }
        Some(stats)
    }
}

async fn pump(
    mut inbound: mpsc::UnboundedReceiver<LiveNotification>,
    items: Arc<RwLock<Vec<LiveNotification>>>,
    events: broadcast::Sender<LiveNotification>,
) {
    while let Some(live) = inbound.recv().await {
        items.write().await.push(live.clone());
        // No live subscribers is fine, the sequence still grows
        let _ = events.send(live);
    }
}

fn live_stream(rx: broadcast::Receiver<LiveNotification>) -> LiveStream {
    unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(live) => return Some((live, rx)),
                Err(RecvError::Lagged(n)) => {
                    // Subscriber is too slow, skip ahead
                    warn!("Live subscriber lagged {} notifications", n);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
