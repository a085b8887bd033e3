//! Protocol sizing limits and timing defaults.

use std::time::Duration;

/// Largest payload a reader accepts for a single definite-length value.
pub const MAX_PAYLOAD_SIZE_ALLOWED: i64 = 128 * 1024 * 1024;

/// Length of the reusable per-session receive buffer.
pub const RECEIVE_BUFFER_LENGTH: usize = 128 * 1024;

/// Default deadline for an outbound connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// TCP keep-alive idle time.
pub const KEEP_ALIVE_TIME: Duration = Duration::from_secs(14 * 60);

/// TCP keep-alive probe interval.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(7 * 60);

/// Granularity of the session loop's cancellable readiness poll.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
