/// Application name
pub const APP_NAME: &str = "verse";

/// Prefix carried by every client-minted message id.
/// A server id is a UUID and can never start with this.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Table names
pub const MESSAGES_TABLE: &str = "messages";
pub const CHANNELS_TABLE: &str = "channels";

/// Storage bucket for message attachments
pub const ATTACHMENTS_BUCKET: &str = "attachments";

/// How far apart (in milliseconds) an optimistic message and its server
/// echo may be timestamped and still be paired
pub const DEFAULT_CORRELATION_WINDOW_MS: i64 = 30_000;

/// Maximum attachment size in bytes (10 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

/// Lifetime of a freshly created room channel
pub const DEFAULT_ROOM_TTL_HOURS: u32 = 24;

/// Reload attempts after the feed connection drops
pub const DEFAULT_RELOAD_ATTEMPTS: u32 = 5;

/// Base delay between reload attempts (multiplied by the attempt number)
pub const DEFAULT_RELOAD_BACKOFF_MS: u64 = 500;

/// Path of the summarisation job endpoint
pub const SUMMARY_PATH: &str = "/api/summary";
