//! Operation mode flags.
//!
//! Every verb receives a 32-bit mode that alters its semantics. The bit
//! positions are stable over the wire; see [`Mode`] for the meaning of each
//! flag. A backend advertises the subset it honors through
//! `Database::supports_mode`, and the provider rejects requests whose bits
//! are not covered by that mask.

bitflags::bitflags! {
    /// Bitwise operation modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mode: u32 {
        /// Range listing starts at a key equal to `from_key` instead of the
        /// first key strictly greater.
        const INCLUSIVE = 1 << 0;
        /// `put` concatenates the supplied value to the existing value.
        const APPEND = 1 << 1;
        /// `get`/`exists`/`length` delete the matched keys after reading.
        const CONSUME = 1 << 2;
        /// A read verb blocks on a missing key until it is notified.
        const WAIT = 1 << 3;
        /// `put` wakes waiters registered for each stored key.
        const NOTIFY = 1 << 4;
        /// Single-key `put` fails with `KeyExists` if the key is present.
        const NEW_ONLY = 1 << 5;
        /// Single-key `put` fails with `KeyNotFound` unless the key exists.
        const EXIST_ONLY = 1 << 6;
        /// Listing strips the matched prefix (or suffix) from returned keys.
        const NO_PREFIX = 1 << 7;
        /// Listing writes 0-length placeholders instead of key bytes.
        const IGNORE_KEYS = 1 << 8;
        /// Overrides `IGNORE_KEYS` for the final returned element so the
        /// caller can resume from it.
        const KEEP_LAST = 1 << 9;
        /// The filter byte string matches a suffix instead of a prefix.
        const SUFFIX = 1 << 10;
        /// Listing applies the filter to value bytes as well.
        const FILTER_VALUE = 1 << 11;
        /// The filter is a named predicate resolved from the filter registry.
        const LIB_FILTER = 1 << 12;
        /// Transport hint; the core ignores it.
        const NO_RDMA = 1 << 13;
        /// Document-store hint; the core ignores it.
        const IGNORE_DOCS = 1 << 14;
    }
}

impl Mode {
    /// Decodes wire bits without dropping unknown ones, so that a mask check
    /// against `supports_mode` still sees them and rejects the request.
    pub fn from_wire(bits: u32) -> Self {
        Mode::from_bits_retain(bits)
    }

    /// True when every set bit of `self` is covered by `mask`.
    pub fn subset_of(self, mask: Mode) -> bool {
        self.bits() & !mask.bits() == 0
    }
}
