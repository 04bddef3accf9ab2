//! Shared primitive types used across the dispenser.

/// Stable identifier of a symbol, as written in the configuration.
pub type SymbolId = String;

/// Stable identifier of a prize definition.
pub type PrizeId = String;

/// A stop position on a single reel (index into the reel's symbol sequence).
pub type StopIndex = usize;

/// Monotonic spin counter. Spin N draws from its own RNG stream.
pub type SpinNumber = u64;
