//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Ledger Pool Defaults
// ============================================================================

/// Default maximum pooled database connections.
pub const DEFAULT_LEDGER_MAX_CONNECTIONS: u32 = 10;
/// Default minimum pooled database connections.
pub const DEFAULT_LEDGER_MIN_CONNECTIONS: u32 = 1;
/// Default pool acquire timeout in seconds.
pub const DEFAULT_LEDGER_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Default maximum connection lifetime in seconds.
pub const DEFAULT_LEDGER_MAX_LIFETIME_SECS: u64 = 1800;
/// Default idle connection timeout in seconds.
pub const DEFAULT_LEDGER_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Node API Defaults
// ============================================================================

/// Default URL scheme used to reach node agents.
pub const DEFAULT_NODE_SCHEME: &str = "https";
/// Default per-request timeout for node RPCs in seconds.
pub const DEFAULT_NODE_REQUEST_TIMEOUT_SECS: u64 = 20;

// ============================================================================
// Queue Defaults
// ============================================================================

/// Concurrent add/remove-user jobs.
pub const DEFAULT_USER_QUEUE_CONCURRENCY: usize = 50;
/// Concurrent remote calls when querying every node at once.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 20;
/// Concurrent node start/restart jobs.
pub const DEFAULT_CONTROL_QUEUE_CONCURRENCY: usize = 20;
/// Concurrent notification deliveries.
pub const DEFAULT_NOTIFY_CONCURRENCY: usize = 2;
/// Maximum notification deliveries per window.
pub const DEFAULT_NOTIFY_MAX_PER_WINDOW: u32 = 30;
/// Notification rate window in seconds.
pub const DEFAULT_NOTIFY_WINDOW_SECS: u64 = 1;
/// Delay before retrying a profile restart rejected as a duplicate.
pub const DEFAULT_PROFILE_RESTART_RETRY_SECS: u64 = 10;

// ============================================================================
// Schedule Defaults
// ============================================================================

/// Node health check interval in seconds.
pub const DEFAULT_HEALTH_CHECK_SECS: u64 = 10;
/// Usage recording sweep interval in seconds.
pub const DEFAULT_USAGE_RECORD_SECS: u64 = 30;
/// Threshold evaluation interval in seconds.
pub const DEFAULT_THRESHOLD_SECS: u64 = 60;
/// Expiry scan interval in seconds.
pub const DEFAULT_EXPIRY_SCAN_SECS: u64 = 60;
/// Reset-boundary check interval in seconds.
pub const DEFAULT_RESET_CHECK_SECS: u64 = 60;
/// Stale history cleanup interval in seconds.
pub const DEFAULT_HISTORY_CLEANUP_SECS: u64 = 3600;
/// Usage history retention in days.
pub const DEFAULT_HISTORY_RETENTION_DAYS: u32 = 30;
/// Restart every enabled node once at startup.
pub const DEFAULT_COLD_START_RESTART: bool = true;

// ============================================================================
// Threshold Defaults
// ============================================================================

/// Percent-of-limit notification watermarks.
pub const DEFAULT_THRESHOLD_PERCENTAGES: [u8; 3] = [50, 80, 95];
/// Maximum rows claimed by one threshold evaluation.
pub const DEFAULT_THRESHOLD_BATCH_LIMIT: u32 = 5000;

// ============================================================================
// Ingestion Constants
// ============================================================================

/// Samples bound into a single usage statement.
///
/// Three parameters per sample keeps a chunk under the SQLite and
/// PostgreSQL bind-parameter ceilings.
pub const USAGE_BATCH_CHUNK: usize = 5000;
