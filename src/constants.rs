//! Application constants

/// Primary cron lookback window: posts due within the last 5 minutes.
pub const PRIMARY_WINDOW_MINUTES: i64 = 5;

/// Backup cron sweeps posts overdue by between 5 and 60 minutes.
pub const BACKUP_WINDOW_MINUTES: i64 = 60;

/// Default publish retry cap for the primary cron path.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// A post still `processing` after this long was stranded by a crash between
/// claim and settle; both sweep windows have long passed by then.
pub const STALE_CLAIM_MINUTES: i64 = 120;

/// Maximum images attached to a single LinkedIn post.
pub const MAX_POST_IMAGES: usize = 9;

/// Maximum post body length accepted by the scheduling API.
pub const MAX_POST_CONTENT_CHARS: usize = 3000;

/// Default page size for paginated list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for paginated list endpoints
pub const MAX_PAGE_SIZE: i64 = 100;
