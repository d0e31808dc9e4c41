/// Offerings per listing page
pub const OFFERING_PAGE_SIZE: u32 = 10;

/// Messages per conversation page
pub const MESSAGE_PAGE_SIZE: u32 = 20;

/// Notifications per inbox page
pub const NOTIFICATION_PAGE_SIZE: u32 = 20;

/// Lifetime of a cached offering page in seconds (5 minutes)
pub const OFFERING_CACHE_TTL_SECS: u64 = 300;

/// Prefix shared by every cached offering-list key
pub const OFFERING_CACHE_PREFIX: &str = "offerings:page:";

/// Default platform commission, in percent of the offering budget
pub const DEFAULT_FEE_PERCENT: u32 = 10;

/// Maximum chat message length in characters
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum offering title length in characters
pub const MAX_TITLE_CHARS: usize = 255;

/// Maximum size of a single uploaded file in bytes (10 MiB)
pub const MAX_ATTACHMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
