#![allow(dead_code)]
// In-memory fakes shared by the integration tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_core::error::{NotifyError, Result};
use notify_core::notification::{Notification, NotificationId, NotificationKind, OpaqueId};
use notify_core::push::{PushChannel, PushTransport};
use notify_core::snapshot::SnapshotApi;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

// ─── Push transport ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Wire {
    urls: Vec<String>,
    sent: Vec<Vec<String>>,
    servers: Vec<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: Vec<bool>,
    refuse: bool,
}

/// Scripted push transport; every `connect` is recorded as one attempt
#[derive(Clone)]
pub struct FakeTransport {
    wire: Arc<Mutex<Wire>>,
    attempts: Arc<watch::Sender<usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (attempts, _) = watch::channel(0);
        Self {
            wire: Arc::new(Mutex::new(Wire::default())),
            attempts: Arc::new(attempts),
        }
    }

    /// Make subsequent connects fail
    pub fn refuse(&self, refuse: bool) {
        self.wire.lock().unwrap().refuse = refuse;
    }

    pub fn connects(&self) -> usize {
        *self.attempts.borrow()
    }

    /// Wait until at least `n` connects happened
    pub async fn wait_connects(&self, n: usize) {
        let mut rx = self.attempts.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }

    pub fn url(&self, conn: usize) -> String {
        self.wire.lock().unwrap().urls[conn].clone()
    }

    pub fn sent(&self, conn: usize) -> Vec<String> {
        self.wire.lock().unwrap().sent[conn].clone()
    }

    /// Server sends one frame on connection `conn`
    pub fn push(&self, conn: usize, frame: &str) {
        let wire = self.wire.lock().unwrap();
        if let Some(server) = wire.servers[conn].as_ref() {
            let _ = server.send(frame.as_bytes().to_vec());
        }
    }

    /// Server closes connection `conn`
    pub fn drop_server(&self, conn: usize) {
        self.wire.lock().unwrap().servers[conn] = None;
    }

    /// Whether the client closed connection `conn`
    pub fn client_closed(&self, conn: usize) -> bool {
        self.wire.lock().unwrap().closed[conn]
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushChannel>> {
        let result = {
            let mut wire = self.wire.lock().unwrap();
            let index = wire.urls.len();
            wire.urls.push(url.to_string());
            wire.sent.push(Vec::new());
            wire.closed.push(false);
            if wire.refuse {
                wire.servers.push(None);
                Err(NotifyError::Connection("connection refused".to_string()))
            } else {
                let (server, frames) = mpsc::unbounded_channel();
                wire.servers.push(Some(server));
                Ok(Box::new(FakeChannel {
                    index,
                    frames,
                    wire: self.wire.clone(),
                }) as Box<dyn PushChannel>)
            }
        };
        self.attempts.send_modify(|count| *count += 1);
        result
    }
}

struct FakeChannel {
    index: usize,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    wire: Arc<Mutex<Wire>>,
}

#[async_trait]
impl PushChannel for FakeChannel {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.wire.lock().unwrap().sent[self.index].push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.wire.lock().unwrap().closed[self.index] = true;
    }
}

// ─── Snapshot backend ────────────────────────────────────────────────────────

#[derive(Default)]
struct Backend {
    notifications: Vec<Notification>,
    conversations: BTreeMap<String, u64>,
    fail_fetch: bool,
    fail_mutation: bool,
    fetches: usize,
    mark_reads: Vec<String>,
    mark_alls: usize,
}

/// Snapshot API backed by a vector
#[derive(Default)]
pub struct FakeSnapshot {
    backend: Mutex<Backend>,
}

impl FakeSnapshot {
    pub fn with(notifications: Vec<Notification>) -> Arc<Self> {
        let snapshot = Self::default();
        snapshot.backend.lock().unwrap().notifications = notifications;
        Arc::new(snapshot)
    }

    pub fn set_notifications(&self, notifications: Vec<Notification>) {
        self.backend.lock().unwrap().notifications = notifications;
    }

    pub fn set_conversations(&self, counts: BTreeMap<String, u64>) {
        self.backend.lock().unwrap().conversations = counts;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.backend.lock().unwrap().fail_fetch = fail;
    }

    pub fn fail_mutation(&self, fail: bool) {
        self.backend.lock().unwrap().fail_mutation = fail;
    }

    pub fn fetches(&self) -> usize {
        self.backend.lock().unwrap().fetches
    }

    pub fn mark_reads(&self) -> Vec<String> {
        self.backend.lock().unwrap().mark_reads.clone()
    }

    pub fn mark_alls(&self) -> usize {
        self.backend.lock().unwrap().mark_alls
    }
}

#[async_trait]
impl SnapshotApi for FakeSnapshot {
    async fn fetch_all(&self) -> Result<Vec<Notification>> {
        let mut backend = self.backend.lock().unwrap();
        backend.fetches += 1;
        if backend.fail_fetch {
            return Err(NotifyError::SnapshotFetch("backend down".to_string()));
        }
        Ok(backend.notifications.clone())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let mut backend = self.backend.lock().unwrap();
        if backend.fail_mutation {
            return Err(NotifyError::Mutation(format!("mark {} read: backend down", id)));
        }
        backend.mark_reads.push(id.as_str().to_string());
        if let Some(n) = backend.notifications.iter_mut().find(|n| &n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let mut backend = self.backend.lock().unwrap();
        if backend.fail_mutation {
            return Err(NotifyError::Mutation("mark all read: backend down".to_string()));
        }
        backend.mark_alls += 1;
        for n in &mut backend.notifications {
            n.is_read = true;
        }
        Ok(())
    }

    async fn conversation_unread(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.backend.lock().unwrap().conversations.clone())
    }
}

// ─── Data ────────────────────────────────────────────────────────────────────

pub fn notification(id: u64, is_read: bool) -> Notification {
    Notification {
        id: OpaqueId::from(id),
        title: format!("Notification {}", id),
        message: "Your appointment is confirmed".to_string(),
        kind: NotificationKind::Appointment,
        sub_type: Some("booked".to_string()),
        related_id: Some(OpaqueId::from(100 + id)),
        is_read,
        timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
        metadata: None,
    }
}

/// Five notifications, three of them unread
pub fn five_with_three_unread() -> Vec<Notification> {
    vec![
        notification(1, false),
        notification(2, true),
        notification(3, false),
        notification(4, true),
        notification(5, false),
    ]
}
