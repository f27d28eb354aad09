/// Notification session: the one scheduler behind every surface
///
/// A single actor task owns the poll timer, the live feed subscription and
/// the snapshot client. Commands, poll ticks and live payloads are applied to
/// one `Inbox` in the order the actor sees them, and every change is
/// published as an `InboxView`.
use crate::config::Config;
use crate::credential::CredentialSource;
use crate::error::{NotifyError, Result};
use crate::feed::{LiveFeed, LiveStream};
use crate::identity::Identity;
use crate::inbox::{Inbox, InboxView};
use crate::notification::{Notification, NotificationId};
use crate::push::{ConnectionStats, LiveNotification, PushTransport};
use crate::snapshot::SnapshotApi;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

const COMMAND_QUEUE: usize = 64;

/// Collaborators a session is built from
#[derive(Clone)]
pub struct SessionDeps {
    pub snapshot: Arc<dyn SnapshotApi>,
    pub transport: Arc<dyn PushTransport>,
    pub credentials: Arc<dyn CredentialSource>,
}

enum SessionCommand {
    SubscribeLive(oneshot::Sender<LiveStream>),
    FetchSnapshot(oneshot::Sender<Result<Vec<Notification>>>),
    UnreadCount(oneshot::Sender<Result<usize>>),
    MarkRead(NotificationId, oneshot::Sender<Result<()>>),
    MarkAllRead(oneshot::Sender<Result<()>>),
    DrawerClosed,
    Shutdown(oneshot::Sender<Option<ConnectionStats>>),
}

/// Cloneable handle for talking to a running session
#[derive(Clone)]
pub struct SessionHandle {
    identity: Identity,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<InboxView>,
}

impl SessionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Latest published view
    pub fn view(&self) -> InboxView {
        self.view.borrow().clone()
    }

    /// Receiver that wakes on every published view
    pub fn watch(&self) -> watch::Receiver<InboxView> {
        self.view.clone()
    }

    /// Another live stream over the session's push subscription
    pub async fn subscribe_live(&self) -> Result<LiveStream> {
        self.call(SessionCommand::SubscribeLive).await
    }

    /// Refetch the listing; the inbox is replaced on success
    pub async fn fetch_snapshot(&self) -> Result<Vec<Notification>> {
        self.call(SessionCommand::FetchSnapshot).await?
    }

    /// Refetch and count unread entries
    pub async fn unread_count(&self) -> Result<usize> {
        self.call(SessionCommand::UnreadCount).await?
    }

    pub async fn mark_read(&self, id: NotificationId) -> Result<()> {
        self.call(|reply| SessionCommand::MarkRead(id, reply)).await?
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.call(SessionCommand::MarkAllRead).await?
    }

    pub async fn drawer_opened(&self) -> Result<Vec<Notification>> {
        self.fetch_snapshot().await
    }

    /// Drawer went from open to closed; the badge refreshes
    pub async fn drawer_closed(&self) -> Result<()> {
        self.commands
            .send(SessionCommand::DrawerClosed)
            .await
            .map_err(|_| NotifyError::SessionClosed)
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NotifyError::SessionClosed)?;
        response.await.map_err(|_| NotifyError::SessionClosed)
    }
}

/// Owns the actor for one identity; call [`NotificationSession::shutdown`]
/// before starting a session for another identity.
pub struct NotificationSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl NotificationSession {
    pub async fn start(identity: Identity, config: &Config, deps: SessionDeps) -> Self {
        let mut feed = LiveFeed::new(config.clone(), deps.transport, deps.credentials);
        let live = feed.subscribe(Some(&identity.user_id)).await;

        let mut poll = interval(config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (view_tx, view) = watch::channel(InboxView::default());

        let actor = SessionActor {
            poll_notifications: !identity.is_admin(),
            snapshot: deps.snapshot,
            feed,
            live,
            live_open: true,
            poll: Some(poll),
            inbox: Inbox::new(),
            commands: command_rx,
            view: view_tx,
        };
        let span = info_span!("session", user = %identity.user_id, role = %identity.role);
        let task = tokio::spawn(actor.run().instrument(span));

        info!("Notification session started for {} ({})", identity.user_id, identity.role);

        Self {
            handle: SessionHandle {
                identity,
                commands,
                view,
            },
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.handle.identity
    }

    /// Stop polling, close the push connection and wait for the actor
    pub async fn shutdown(self) -> Option<ConnectionStats> {
        let stats = match self.handle.call(SessionCommand::Shutdown).await {
            Ok(stats) => stats,
            Err(_) => {
                debug!("Session already stopped");
                None
            }
        };
        if let Err(e) = self.task.await {
            error!("Session task failed: {}", e);
        }
        info!("Notification session for {} closed", self.handle.identity.user_id);
        stats
    }

    /// Tear this session down, then start one for `identity`
    pub async fn switch_identity(self, identity: Identity, config: &Config, deps: SessionDeps) -> Self {
        self.shutdown().await;
        Self::start(identity, config, deps).await
    }
}

struct SessionActor {
    poll_notifications: bool,
    snapshot: Arc<dyn SnapshotApi>,
    feed: LiveFeed,
    live: LiveStream,
    live_open: bool,
    poll: Option<Interval>,
    inbox: Inbox,
    commands: mpsc::Receiver<SessionCommand>,
    view: watch::Sender<InboxView>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            return;
                        }
                    }
                    None => {
                        // Every handle is gone
                        self.stop().await;
                        return;
                    }
                },
                _ = tick(&mut self.poll) => self.poll_once().await,
                live = self.live.next(), if self.live_open => match live {
                    Some(live) => self.merge_live(live),
                    None => {
                        debug!("Live stream ended");
                        self.live_open = false;
                    }
                },
            }
            self.publish();
        }
    }

    /// Apply one command; `false` once the session has stopped
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::SubscribeLive(reply) => {
                self.reply(reply, self.feed.stream());
            }
            SessionCommand::FetchSnapshot(reply) => {
                let result = self.refresh().await;
                self.reply(reply, result);
            }
            SessionCommand::UnreadCount(reply) => {
                let result = self.refresh().await.map(|_| self.inbox.unread());
                self.reply(reply, result);
            }
            SessionCommand::MarkRead(id, reply) => {
                let result = match self.snapshot.mark_read(&id).await {
                    Ok(()) => {
                        self.inbox.apply_mark_read(&id);
                        self.inbox.set_notice(None);
                        Ok(())
                    }
                    Err(e) => Err(self.failed(e)),
                };
                self.reply(reply, result);
            }
            SessionCommand::MarkAllRead(reply) => {
                let result = match self.snapshot.mark_all_read().await {
                    Ok(()) => {
                        self.inbox.apply_mark_all_read();
                        self.inbox.set_notice(None);
                        Ok(())
                    }
                    Err(e) => Err(self.failed(e)),
                };
                self.reply(reply, result);
            }
            SessionCommand::DrawerClosed => {
                if self.poll_notifications {
                    let _ = self.refresh().await;
                }
            }
            SessionCommand::Shutdown(reply) => {
                let stats = self.stop().await;
                self.reply(reply, stats);
                return false;
            }
        }
        true
    }

    async fn poll_once(&mut self) {
        if self.poll_notifications {
            let _ = self.refresh().await;
        }
        match self.snapshot.conversation_unread().await {
            Ok(counts) => self.inbox.set_conversations(counts),
            Err(e) => warn!("Failed to load conversation counters: {}", e),
        }
    }

    async fn refresh(&mut self) -> Result<Vec<Notification>> {
        match self.snapshot.fetch_all().await {
            Ok(listing) => {
                self.inbox.replace(listing);
                debug!(unread = self.inbox.unread(), "Snapshot applied");
                Ok(self.inbox.notifications().to_vec())
            }
            Err(e) => Err(self.failed(e)),
        }
    }

    fn merge_live(&mut self, live: LiveNotification) {
        if self.inbox.merge_live(&live) {
            debug!(seq = live.seq, unread = self.inbox.unread(), "Live notification merged");
        }
    }

    fn failed(&mut self, e: NotifyError) -> NotifyError {
        warn!("{}: {}", e.notice(), e);
        self.inbox.set_notice(Some(e.notice().to_string()));
        e
    }

    /// Publish first so the caller sees the state its reply reflects
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn publish(&self) {
        let next = self.inbox.view();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn stop(&mut self) -> Option<ConnectionStats> {
        // Timer first so no poll races the connection teardown
        self.poll = None;
        self.live_open = false;
        self.feed.close().await
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}
