//! Error kind labels for metrics and logging.
//!
//! These constants provide consistent failure classification across all crates.

/// Remote node could not be reached (connect error, timeout).
pub const ERROR_UNREACHABLE: &str = "unreachable";
/// Remote node answered with a non-success status.
pub const ERROR_REMOTE_STATUS: &str = "remote_status";
/// Response body could not be decoded.
pub const ERROR_DECODE: &str = "decode";
/// Inbound type with no provisioning mapping.
pub const ERROR_UNSUPPORTED_PROTOCOL: &str = "unsupported_protocol";
/// Ledger statement failed.
pub const ERROR_LEDGER: &str = "ledger";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
