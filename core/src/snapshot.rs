/// Snapshot REST service: full listings and read-state mutations
use crate::config::Config;
use crate::credential::{CredentialSource, SESSION_COOKIE};
use crate::error::{NotifyError, Result};
use crate::notification::{Notification, NotificationId, WireNotification};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use http::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use http::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Backend operations the notification surfaces rely on
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// Every notification for the signed-in identity, in server order
    async fn fetch_all(&self) -> Result<Vec<Notification>>;

    /// Unread count, derived from a full listing
    async fn unread_count(&self) -> Result<usize> {
        let all = self.fetch_all().await?;
        Ok(all.iter().filter(|n| !n.is_read).count())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()>;

    async fn mark_all_read(&self) -> Result<()>;

    /// Unread messages per conversation
    async fn conversation_unread(&self) -> Result<BTreeMap<String, u64>>;
}

#[derive(Debug, Default, Deserialize)]
struct ConversationCounts {
    #[serde(default)]
    counts: BTreeMap<String, u64>,
}

/// HTTP implementation over the hyper client
pub struct HttpSnapshotClient {
    base_url: String,
    timeout: Duration,
    credentials: Arc<dyn CredentialSource>,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpSnapshotClient {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            credentials,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<Bytes> {
        let uri: Uri = format!("{}{}", self.base_url, path)
            .parse()
            .map_err(|e| NotifyError::Http(format!("Invalid URI for {}: {}", path, e)))?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        match self.credentials.credential() {
            Some(token) => {
                builder = builder.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
            }
            // The backend decides; it normally answers 401
            None => debug!("No session credential for {} {}", method, path),
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| NotifyError::Http(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map(|c| c.to_bytes())
                .map_err(|e| NotifyError::Http(e.to_string()))?;
            Ok::<_, NotifyError>((status, body))
        };

        let (status, body) = timeout(self.timeout, exchange).await.map_err(|_| {
            NotifyError::Timeout(format!("{} {} after {:?}", method, path, self.timeout))
        })??;

        debug!("{} {} -> {}", method, path, status);
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl SnapshotApi for HttpSnapshotClient {
    async fn fetch_all(&self) -> Result<Vec<Notification>> {
        let body = self
            .request(Method::GET, "/notifications")
            .await
            .map_err(|e| NotifyError::SnapshotFetch(e.to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| NotifyError::SnapshotFetch(format!("invalid listing: {}", e)))?;
        Ok(normalize_listing(value))
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let path = format!("/notifications/{}/read", urlencoding::encode(id.as_str()));
        self.request(Method::PUT, &path)
            .await
            .map_err(|e| NotifyError::Mutation(format!("mark {} read: {}", id, e)))?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.request(Method::PUT, "/notifications/read-all")
            .await
            .map_err(|e| NotifyError::Mutation(format!("mark all read: {}", e)))?;
        Ok(())
    }

    async fn conversation_unread(&self) -> Result<BTreeMap<String, u64>> {
        let body = self
            .request(Method::GET, "/chat/unread")
            .await
            .map_err(|e| NotifyError::SnapshotFetch(e.to_string()))?;
        let counts: ConversationCounts = serde_json::from_slice(&body)
            .map_err(|e| NotifyError::SnapshotFetch(format!("invalid unread counts: {}", e)))?;
        Ok(counts.counts)
    }
}

/// Normalize a listing body.
///
/// A body that is not an array reads as empty. Entries that cannot be
/// normalized are skipped with a warning instead of failing the listing.
pub fn normalize_listing(value: serde_json::Value) -> Vec<Notification> {
    let serde_json::Value::Array(entries) = value else {
        warn!("Notification listing is not an array, treating as empty");
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let normalized = serde_json::from_value::<WireNotification>(entry)
                .map_err(NotifyError::from)
                .and_then(WireNotification::normalize);
            match normalized {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Skipping notification entry: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_not_array_is_empty() {
        assert!(normalize_listing(json!({"detail": "nope"})).is_empty());
        assert!(normalize_listing(json!(null)).is_empty());
    }

    #[test]
    fn test_listing_skips_broken_entries() {
        let listing = normalize_listing(json!([
            {"id": 1, "title": "a", "message": "m", "type": "chat", "is_read": false,
             "created_at": "2024-01-01T00:00:00Z"},
            {"title": "no id", "created_at": "2024-01-01T00:00:00Z"},
            "not an object",
            {"id": 3, "title": "no date"},
            {"id": 4, "title": "b", "message": "m", "type": "payment", "is_read": true,
             "created_at": "2024-01-02 09:30:00"}
        ]));

        let ids: Vec<_> = listing.iter().map(|n| n.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["1", "", "4"]);
    }

    #[test]
    fn test_listing_minimal_entry() {
        let listing = normalize_listing(json!([
            {"is_read": false, "created_at": "2024-01-01T00:00:00Z", "metadata": "{\"a\":1}"}
        ]));
        assert_eq!(listing.len(), 1);

        let out = serde_json::to_value(&listing[0]).unwrap();
        assert_eq!(out["isRead"], json!(false));
        assert_eq!(out["timestamp"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(out["metadata"], json!({"a": 1}));
    }

    #[test]
    fn test_conversation_counts_default_empty() {
        let counts: ConversationCounts = serde_json::from_str("{}").unwrap();
        assert!(counts.counts.is_empty());

        let counts: ConversationCounts =
            serde_json::from_str(r#"{"counts": {"room-1": 2, "room-2": 0}}"#).unwrap();
        assert_eq!(counts.counts.get("room-1"), Some(&2));
    }
}
