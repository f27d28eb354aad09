/// Unified notification state shared by badge, drawer and sidebar
use crate::notification::{Notification, NotificationId};
use crate::push::LiveNotification;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Unread counter that never goes below zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCounter(usize);

impl UnreadCounter {
    pub fn get(self) -> usize {
        self.0
    }

    pub fn set(&mut self, count: usize) {
        self.0 = count;
    }

    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    pub fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Read-only picture of the inbox handed to surfaces
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InboxView {
    pub notifications: Vec<Notification>,
    pub unread: usize,
    pub conversations: BTreeMap<String, u64>,
    /// Transient error text from the last failed operation
    pub notice: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl InboxView {
    /// Sum of per-conversation unread counters
    pub fn conversation_total(&self) -> u64 {
        self.conversations.values().sum()
    }
}

/// The single owner of notification read-state.
///
/// A snapshot replaces the list and recomputes the counter. Mutations that the
/// backend confirmed adjust both locally without refetching.
#[derive(Debug, Default)]
pub struct Inbox {
    notifications: Vec<Notification>,
    unread: UnreadCounter,
    conversations: BTreeMap<String, u64>,
    notice: Option<String>,
    last_synced: Option<DateTime<Utc>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace local state with a fresh listing; duplicate ids keep the first.
    /// Entries without an id are all kept.
    pub fn replace(&mut self, snapshot: Vec<Notification>) {
        let mut seen = HashSet::new();
        self.notifications = snapshot
            .into_iter()
            .filter(|n| n.id.is_empty() || seen.insert(n.id.clone()))
            .collect();
        self.recount();
        self.notice = None;
        self.last_synced = Some(Utc::now());
    }

    /// Apply a confirmed mark-as-read.
    ///
    /// Returns whether anything changed. An id unknown locally still
    /// decrements (floored at zero) since the server counted it as unread.
    pub fn apply_mark_read(&mut self, id: &NotificationId) -> bool {
        match self.notifications.iter_mut().find(|n| &n.id == id) {
            Some(n) if n.is_read => false,
            Some(n) => {
                n.is_read = true;
                self.unread.decrement();
                true
            }
            None => {
                debug!("Marked unknown notification {} as read", id);
                let before = self.unread;
                self.unread.decrement();
                before != self.unread
            }
        }
    }

    /// Apply a confirmed mark-all-as-read
    pub fn apply_mark_all_read(&mut self) {
        for n in &mut self.notifications {
            n.is_read = true;
        }
        self.unread.reset();
    }

    /// Fold a live payload into the list; returns whether it was new
    pub fn merge_live(&mut self, live: &LiveNotification) -> bool {
        let Some(notification) = live.to_notification() else {
            debug!(seq = live.seq, "Live payload is not a notification, kept in feed only");
            return false;
        };
        if self.notifications.iter().any(|n| n.id == notification.id) {
            return false;
        }
        if !notification.is_read {
            self.unread.increment();
        }
        self.notifications.insert(0, notification);
        true
    }

    pub fn set_conversations(&mut self, counts: BTreeMap<String, u64>) {
        self.conversations = counts;
    }

    pub fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread(&self) -> usize {
        self.unread.get()
    }

    pub fn view(&self) -> InboxView {
        InboxView {
            notifications: self.notifications.clone(),
            unread: self.unread.get(),
            conversations: self.conversations.clone(),
            notice: self.notice.clone(),
            last_synced: self.last_synced,
        }
    }

    fn recount(&mut self) {
        let unread = self.notifications.iter().filter(|n| !n.is_read).count();
        self.unread.set(unread);
    }
}
