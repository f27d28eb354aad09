/// Configuration management
use crate::error::{NotifyError, Result};
use crate::identity::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the REST backend
    pub api_base_url: String,

    /// Base URL of the push endpoint (`/ws/{user_id}` is appended)
    pub ws_base_url: String,

    /// Fixed delay before a reconnection attempt
    pub reconnect_delay: Duration,

    /// Snapshot poll interval
    pub poll_interval: Duration,

    /// Per-request timeout for snapshot calls
    pub request_timeout: Duration,

    /// Raw cookie string holding `session_token`
    pub cookie: Option<String>,

    /// Identity to watch (watcher binary only)
    pub user_id: Option<String>,

    /// Role of the identity
    pub role: Role,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_base_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
            cookie: None,
            user_id: None,
            role: Role::default(),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(NotifyError::Config(format!(
                "Usage: {} <user_id> [--api-url <url>] [--ws-url <url>] [--cookie <cookie>] [--role <patient|doctor|admin>] [--poll-secs <n>] [--reconnect-secs <n>] [--timeout-secs <n>]",
                args.first().map(String::as_str).unwrap_or("core")
            )));
        }

        let mut config = Self::default();
        config.user_id = Some(args[1].clone());
        config.parse_flags(&args[2..])?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Create config from the environment only
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn parse_flags(&mut self, flags: &[String]) -> Result<()> {
        let mut i = 0;
        while i < flags.len() {
            let flag = flags[i].as_str();
            let value = flags.get(i + 1).ok_or_else(|| {
                NotifyError::Config(format!("{} requires an argument", flag))
            })?;
            match flag {
                "--api-url" => self.api_base_url = value.clone(),
                "--ws-url" => self.ws_base_url = value.clone(),
                "--cookie" => self.cookie = Some(value.clone()),
                "--role" => self.role = value.parse()?,
                "--poll-secs" => self.poll_interval = parse_secs(flag, value)?,
                "--reconnect-secs" => self.reconnect_delay = parse_secs(flag, value)?,
                "--timeout-secs" => self.request_timeout = parse_secs(flag, value)?,
                other => {
                    return Err(NotifyError::Config(format!("Unknown flag: {}", other)));
                }
            }
            i += 2;
        }
        Ok(())
    }

    // Env overrides (nice for scripts)
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("NOTIFY_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var("NOTIFY_WS_URL") {
            self.ws_base_url = url;
        }
        if let Ok(cookie) = std::env::var("NOTIFY_COOKIE") {
            self.cookie = Some(cookie);
        }
        if let Ok(secs) = std::env::var("NOTIFY_POLL_SECS") {
            self.poll_interval = parse_secs("NOTIFY_POLL_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("NOTIFY_RECONNECT_SECS") {
            self.reconnect_delay = parse_secs("NOTIFY_RECONNECT_SECS", &secs)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") {
            return Err(NotifyError::Config(format!(
                "API URL must start with http:// (got {})",
                self.api_base_url
            )));
        }
        if !(self.ws_base_url.starts_with("ws://") || self.ws_base_url.starts_with("wss://")) {
            return Err(NotifyError::Config(format!(
                "Push URL must start with ws:// or wss:// (got {})",
                self.ws_base_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(NotifyError::Config("Poll interval must be positive".to_string()));
        }
        if self.reconnect_delay.is_zero() {
            return Err(NotifyError::Config("Reconnect delay must be positive".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(NotifyError::Config("Request timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Push endpoint for one user
    pub fn push_url(&self, user_id: &str) -> String {
        format!(
            "{}/ws/{}",
            self.ws_base_url.trim_end_matches('/'),
            urlencoding::encode(user_id)
        )
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| NotifyError::Config(format!("{} must be a whole number of seconds", name)))
}
