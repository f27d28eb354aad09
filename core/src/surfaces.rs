/// Badge, drawer and sidebar: thin readers over the session view
use crate::error::{NotifyError, Result};
use crate::inbox::InboxView;
use crate::notification::{NavigationTarget, Notification, NotificationId};
use crate::session::SessionHandle;
use chrono::{DateTime, TimeZone};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Largest count shown as a number on the badge
const BADGE_MAX: usize = 9;

/// Badge text for an unread count; nothing is shown at zero
pub fn badge_label(count: usize) -> Option<String> {
    match count {
        0 => None,
        n if n > BADGE_MAX => Some(format!("{}+", BADGE_MAX)),
        n => Some(n.to_string()),
    }
}

/// Human timestamp for a notification row.
///
/// Same calendar day as `now` gives relative text ("5 minutes ago"),
/// anything else the full date ("Jan 1, 2024 • 3:04 PM").
pub fn format_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    if ts.date_naive() != now.date_naive() {
        return ts.format("%b %-d, %Y • %-I:%M %p").to_string();
    }

    let secs = now.clone().signed_duration_since(ts.clone()).num_seconds();
    let distance = distance_words(secs.unsigned_abs());
    if secs < 0 {
        format!("in {}", distance)
    } else {
        format!("{} ago", distance)
    }
}

fn distance_words(secs: u64) -> String {
    let minutes = (secs + 30) / 60;
    match minutes {
        0 => "less than a minute".to_string(),
        1 => "1 minute".to_string(),
        2..=44 => format!("{} minutes", minutes),
        45..=89 => "about 1 hour".to_string(),
        _ => format!("about {} hours", (minutes + 30) / 60),
    }
}

/// Unread badge in the header
pub struct Badge {
    view: watch::Receiver<InboxView>,
    visible: bool,
}

impl Badge {
    /// Administrative identities get no badge
    pub fn new(session: &SessionHandle) -> Self {
        Self {
            view: session.watch(),
            visible: !session.identity().is_admin(),
        }
    }

    pub fn count(&self) -> usize {
        self.view.borrow().unread
    }

    pub fn label(&self) -> Option<String> {
        if !self.visible {
            return None;
        }
        badge_label(self.count())
    }

    /// Wait for the next published view and return the new label
    pub async fn changed(&mut self) -> Result<Option<String>> {
        self.view
            .changed()
            .await
            .map_err(|_| NotifyError::SessionClosed)?;
        Ok(self.label())
    }
}

/// Notification drawer
pub struct Drawer {
    session: SessionHandle,
    open: bool,
}

impl Drawer {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open and load the full listing
    pub async fn open(&mut self) -> Result<Vec<Notification>> {
        self.open = true;
        self.session.drawer_opened().await
    }

    /// Close; only an open-to-closed transition refreshes the badge
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.session.drawer_closed().await
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.session.view().notifications
    }

    pub fn unread(&self) -> usize {
        self.session.view().unread
    }

    /// Transient error text to show, if any
    pub fn notice(&self) -> Option<String> {
        self.session.view().notice
    }

    pub async fn mark_read(&self, id: NotificationId) -> Result<()> {
        self.session.mark_read(id).await
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.session.mark_all_read().await
    }

    /// Row click: mark the entry read and resolve where it leads.
    ///
    /// Navigation does not depend on the mark succeeding.
    pub async fn select(&self, id: &NotificationId) -> Option<NavigationTarget> {
        let notification = self
            .session
            .view()
            .notifications
            .into_iter()
            .find(|n| &n.id == id)?;

        if let Err(e) = self.session.mark_read(id.clone()).await {
            warn!("Failed to mark notification {} as read: {}", id, e);
        }

        let target = NavigationTarget::for_notification(&notification);
        debug!("Notification {} leads to {:?}", id, target);
        target
    }
}

/// Per-conversation unread counters
pub struct Sidebar {
    view: watch::Receiver<InboxView>,
}

impl Sidebar {
    pub fn new(session: &SessionHandle) -> Self {
        Self {
            view: session.watch(),
        }
    }

    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.view.borrow().conversations.clone()
    }

    pub fn unread_for(&self, conversation: &str) -> u64 {
        self.view
            .borrow()
            .conversations
            .get(conversation)
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.view.borrow().conversation_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_badge_label() {
        assert_eq!(badge_label(0), None);
        assert_eq!(badge_label(1).as_deref(), Some("1"));
        assert_eq!(badge_label(9).as_deref(), Some("9"));
        assert_eq!(badge_label(10).as_deref(), Some("9+"));
        assert_eq!(badge_label(250).as_deref(), Some("9+"));
    }

    #[test]
    fn test_relative_same_day() {
        let now = at("2024-01-01T12:00:00Z");
        assert_eq!(format_timestamp(&at("2024-01-01T11:59:45Z"), &now), "less than a minute ago");
        assert_eq!(format_timestamp(&at("2024-01-01T11:59:00Z"), &now), "1 minute ago");
        assert_eq!(format_timestamp(&at("2024-01-01T11:55:00Z"), &now), "5 minutes ago");
        assert_eq!(format_timestamp(&at("2024-01-01T11:00:00Z"), &now), "about 1 hour ago");
        assert_eq!(format_timestamp(&at("2024-01-01T09:40:00Z"), &now), "about 2 hours ago");
        assert_eq!(format_timestamp(&at("2024-01-01T12:10:00Z"), &now), "in 10 minutes");
    }

    #[test]
    fn test_absolute_other_day() {
        let now = at("2024-01-01T12:00:00Z");
        assert_eq!(
            format_timestamp(&at("2023-12-31T15:04:00Z"), &now),
            "Dec 31, 2023 • 3:04 PM"
        );
        assert_eq!(
            format_timestamp(&at("2023-06-05T09:07:00Z"), &now),
            "Jun 5, 2023 • 9:07 AM"
        );
    }
}
