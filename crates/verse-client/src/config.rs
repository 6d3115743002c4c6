//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so a local development backend works with
//! zero configuration.

use verse_shared::constants::{
    DEFAULT_CORRELATION_WINDOW_MS, DEFAULT_RELOAD_ATTEMPTS, DEFAULT_RELOAD_BACKOFF_MS,
    DEFAULT_ROOM_TTL_HOURS, MAX_ATTACHMENT_SIZE, SUMMARY_PATH,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the hosted database (REST, storage and realtime).
    /// Env: `VERSE_URL`
    /// Default: `http://localhost:54321`
    pub backend_url: String,

    /// Public (anonymous) API key sent with every backend request.
    /// Env: `VERSE_ANON_KEY`
    /// Default: none.
    pub anon_key: Option<String>,

    /// Base URL of the web app hosting the summary job.
    /// Env: `VERSE_APP_URL`
    /// Default: `http://localhost:3000`
    pub app_url: String,

    /// Window for pairing an optimistic message with its server echo.
    /// Env: `VERSE_CORRELATION_WINDOW_MS`
    /// Default: 30 000 ms.
    pub correlation_window: chrono::Duration,

    /// Largest attachment accepted for upload, in bytes.
    /// Env: `VERSE_MAX_ATTACHMENT_BYTES`
    /// Default: 10 MiB.
    pub max_attachment_size: usize,

    /// Reload attempts after the change feed drops.
    /// Env: `VERSE_RELOAD_ATTEMPTS`
    /// Default: `5`
    pub reload_attempts: u32,

    /// Base delay between reload attempts; attempt `n` waits `n` times this.
    /// Env: `VERSE_RELOAD_BACKOFF_MS`
    /// Default: 500 ms.
    pub reload_backoff: std::time::Duration,

    /// Lifetime of rooms created from the chat view.
    /// Env: `VERSE_ROOM_TTL_HOURS`
    /// Default: `24`
    pub room_ttl_hours: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: None,
            app_url: "http://localhost:3000".to_string(),
            correlation_window: chrono::Duration::milliseconds(DEFAULT_CORRELATION_WINDOW_MS),
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            reload_attempts: DEFAULT_RELOAD_ATTEMPTS,
            reload_backoff: std::time::Duration::from_millis(DEFAULT_RELOAD_BACKOFF_MS),
            room_ttl_hours: DEFAULT_ROOM_TTL_HOURS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("VERSE_URL") {
            config.backend_url = url.trim_end_matches('/').to_string();
        }

        if let Some(key) = lookup("VERSE_ANON_KEY") {
            if !key.is_empty() {
                config.anon_key = Some(key);
            }
        }

        if let Some(url) = lookup("VERSE_APP_URL") {
            config.app_url = url.trim_end_matches('/').to_string();
        }

        if let Some(ms) = parse_var::<i64>(&lookup, "VERSE_CORRELATION_WINDOW_MS") {
            config.correlation_window = chrono::Duration::milliseconds(ms);
        }

        if let Some(bytes) = parse_var(&lookup, "VERSE_MAX_ATTACHMENT_BYTES") {
            config.max_attachment_size = bytes;
        }

        if let Some(n) = parse_var(&lookup, "VERSE_RELOAD_ATTEMPTS") {
            config.reload_attempts = n;
        }

        if let Some(ms) = parse_var(&lookup, "VERSE_RELOAD_BACKOFF_MS") {
            config.reload_backoff = std::time::Duration::from_millis(ms);
        }

        if let Some(hours) = parse_var(&lookup, "VERSE_ROOM_TTL_HOURS") {
            config.room_ttl_hours = hours;
        }

        // RUST_LOG is read directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Endpoint of the summarisation job.
    pub fn summary_url(&self) -> String {
        format!("{}{}", self.app_url, SUMMARY_PATH)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Invalid value, using default");
            None
        }
    }
}
