//! Sentinel size encoding.
//!
//! Result size slots are `u64`. The top of the range is reserved so that a
//! slot can report a non-numeric outcome: a missing key, a destination too
//! small for the element, or an exhausted iterator. Every real length fits
//! below the reserved band.

/// The key at this position was not found.
pub const KEY_NOT_FOUND: u64 = u64::MAX;

/// The destination slot (or the remaining packed buffer) cannot hold the
/// element; no bytes were written for it.
pub const SIZE_TOO_SMALL: u64 = u64::MAX - 1;

/// The iterator exhausted its source before filling this position.
pub const NO_MORE_KEYS: u64 = u64::MAX - 2;

/// True when `size` is one of the reserved sentinels rather than a length.
pub fn is_reserved(size: u64) -> bool {
    size >= NO_MORE_KEYS
}
