/// Notify Core - real-time notification delivery and read-state sync
///
/// Push channel with an explicit connection state machine, an append-only live
/// feed, a snapshot REST client and one session that reconciles both into the
/// view every surface reads.

pub mod error;
pub mod config;
pub mod identity;
pub mod credential;
pub mod notification;
pub mod push;
pub mod feed;
pub mod snapshot;
pub mod inbox;
pub mod session;
pub mod surfaces;
pub mod cli_app;

pub use error::{NotifyError, Result};
pub use config::Config;
pub use identity::{Identity, Role};
pub use credential::{CookieJar, CredentialSource, StaticCredential};
pub use notification::{NavigationTarget, Notification, NotificationId, NotificationKind};
pub use feed::{LiveFeed, LiveStream};
pub use snapshot::{HttpSnapshotClient, SnapshotApi};
pub use inbox::{Inbox, InboxView};
pub use session::{NotificationSession, SessionDeps, SessionHandle};
pub use surfaces::{badge_label, format_timestamp, Badge, Drawer, Sidebar};
