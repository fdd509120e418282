//! Settlement constants.

use std::time::Duration;

/// Delay before a paused or failed worker looks at its queue again.
pub const DEFAULT_PAUSE_INTERVAL: Duration = Duration::from_millis(3_000);

/// Maximum number of items merged into a single settlement batch.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Number of times a partial batch waits for more items before it is sent anyway.
pub const DEFAULT_WAIT_COUNTDOWN: usize = 3;

/// Delay between two waits of a partial batch.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(1_000);

/// The working nonce is compared against the on-chain nonce once every this many nonces.
pub const DEFAULT_NONCE_CHECK_INTERVAL: u64 = 100;

/// Maximum distance between the working nonce and the on-chain nonce before submission is
/// throttled.
pub const DEFAULT_NONCE_TOO_FUTURE_THRESHOLD: u64 = 500;

/// Delay before resending a transaction rejected as underpriced.
pub const DEFAULT_UNDERPRICED_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Delay before retrying a send that failed with a transport error.
pub const DEFAULT_IO_RETRY_INTERVAL: Duration = Duration::from_millis(1_000);

/// Number of blocks after which a sent but not executed transaction is resent.
pub const DEFAULT_LONG_UNEXECUTED_BLOCKS: u64 = 200;

/// Interval between two confirmation monitor cycles.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(3_000);

/// Number of blocks on top of a block before it is considered confirmed.
pub const DEFAULT_CONFIRMATIONS: u64 = 12;

/// Consecutive non-RPC errors after which a relay endpoint is skipped.
pub const DEFAULT_RELAY_ERRORS_TO_SKIP: u64 = 10;

/// How long a failing relay endpoint is skipped.
pub const DEFAULT_RELAY_SKIP_TIMEOUT: Duration = Duration::from_secs(300);

/// Request timeout of relay endpoints.
pub const DEFAULT_RELAY_REQUEST_TIMEOUT: Duration = Duration::from_millis(3_000);

/// Interval between two heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1_000);
