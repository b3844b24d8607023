//! Default value functions for serde deserialization.
//!
//! These functions forward to constants defined in `fleet_core::defaults`.

use fleet_core::defaults;

/// Generate default value functions that forward to fleet_core::defaults constants.
macro_rules! default_fns {
    // For Copy types (integers, bool, etc.)
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

/// Generate default value functions that return String from &str constants.
macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                defaults::$const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_max_connections        => DEFAULT_LEDGER_MAX_CONNECTIONS: u32,
    default_min_connections        => DEFAULT_LEDGER_MIN_CONNECTIONS: u32,
    default_connect_timeout_secs   => DEFAULT_LEDGER_CONNECT_TIMEOUT_SECS: u64,
    default_max_lifetime_secs      => DEFAULT_LEDGER_MAX_LIFETIME_SECS: u64,
    default_idle_timeout_secs      => DEFAULT_LEDGER_IDLE_TIMEOUT_SECS: u64,
    default_request_timeout_secs   => DEFAULT_NODE_REQUEST_TIMEOUT_SECS: u64,
    default_user_concurrency       => DEFAULT_USER_QUEUE_CONCURRENCY: usize,
    default_fanout_concurrency     => DEFAULT_FANOUT_CONCURRENCY: usize,
    default_control_concurrency    => DEFAULT_CONTROL_QUEUE_CONCURRENCY: usize,
    default_notify_concurrency     => DEFAULT_NOTIFY_CONCURRENCY: usize,
    default_notify_max_per_window  => DEFAULT_NOTIFY_MAX_PER_WINDOW: u32,
    default_notify_window_secs     => DEFAULT_NOTIFY_WINDOW_SECS: u64,
    default_profile_restart_retry_secs => DEFAULT_PROFILE_RESTART_RETRY_SECS: u64,
    default_health_check_secs      => DEFAULT_HEALTH_CHECK_SECS: u64,
    default_usage_record_secs      => DEFAULT_USAGE_RECORD_SECS: u64,
    default_threshold_secs         => DEFAULT_THRESHOLD_SECS: u64,
    default_expiry_scan_secs       => DEFAULT_EXPIRY_SCAN_SECS: u64,
    default_reset_check_secs       => DEFAULT_RESET_CHECK_SECS: u64,
    default_history_cleanup_secs   => DEFAULT_HISTORY_CLEANUP_SECS: u64,
    default_history_retention_days => DEFAULT_HISTORY_RETENTION_DAYS: u32,
    default_cold_start_restart     => DEFAULT_COLD_START_RESTART: bool,
    default_threshold_batch_limit  => DEFAULT_THRESHOLD_BATCH_LIMIT: u32,
}

default_string_fns! {
    default_node_scheme => DEFAULT_NODE_SCHEME,
}

pub(crate) fn default_threshold_percentages() -> Vec<u8> {
    defaults::DEFAULT_THRESHOLD_PERCENTAGES.to_vec()
}
