/// Error types for the notification core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No session credential available")]
    CredentialMissing,

    #[error("Snapshot fetch failed: {0}")]
    SnapshotFetch(String),

    #[error("Read-state update failed: {0}")]
    Mutation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Notification session is closed")]
    SessionClosed,
}

impl NotifyError {
    /// Short text suitable for a transient, non-fatal notice.
    pub fn notice(&self) -> &'static str {
        match self {
            NotifyError::SnapshotFetch(_) => "Failed to load notifications",
            NotifyError::Mutation(_) => "Failed to update notifications",
            NotifyError::CredentialMissing => "You are signed out",
            NotifyError::SessionClosed => "Notifications are unavailable",
            _ => "Something went wrong with notifications",
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_for_snapshot_and_mutation() {
        let fetch = NotifyError::SnapshotFetch("boom".to_string());
        let mutate = NotifyError::Mutation("boom".to_string());
        assert_eq!(fetch.notice(), "Failed to load notifications");
        assert_eq!(mutate.notice(), "Failed to update notifications");
    }

    #[test]
    fn test_status_display() {
        let err = NotifyError::Status {
            status: 404,
            body: "{\"error\":\"Notification not found\"}".to_string(),
        };
        assert!(err.to_string().starts_with("Server returned 404"));
    }
}
