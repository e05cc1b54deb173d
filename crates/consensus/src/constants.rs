//! Consensus-wide constants shared across validation.

/// The minimum allowed block version (network rule).
pub const MIN_HEADER_VERSION: i32 = 1;
/// The minimum allowed transaction version (network rule).
pub const MIN_TX_VERSION: i32 = 1;
/// Number of recent headers contributing to median-time-past.
pub const MEDIAN_TIME_PAST_WINDOW: usize = 11;
/// The maximum allowed size for a serialized transaction, in bytes (network rule).
pub const MAX_TX_SIZE: usize = 100_000;
/// The maximum allowed size for a script, in bytes (network rule).
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Locktime values at or above this threshold are unix timestamps, not heights.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// The serialized size of a block header, in bytes.
pub const HEADER_SIZE: usize = 80;
