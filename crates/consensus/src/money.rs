//! Monetary bounds (network rules).

/// Satoshis per coin.
pub const COIN: i64 = 100_000_000;
/// The maximum supply, in satoshis.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// True if the amount is a representable satoshi value.
pub fn money_range(value: i64) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
