//! Listing filters and the key-copy policy.
//!
//! A filter is a predicate over `(key, value)` pairs, parameterized by the
//! operation mode and a filter byte string. The built-in [`BytesFilter`]
//! matches a key prefix by default, a suffix under [`Mode::SUFFIX`], and
//! accepts everything when the filter bytes are empty. Named predicates can
//! be plugged in through [`register_filter`] and selected with
//! [`Mode::LIB_FILTER`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use bytes::Bytes;

use crate::{Error, Mode, Result};

/// Predicate applied to each pair during a listing.
pub trait KeyValueFilter: Send + Sync {
    /// True when the pair passes the filter.
    fn check(&self, key: &[u8], value: &[u8]) -> bool;

    /// True when an ordered iteration that just rejected this pair can
    /// terminate early because no later key can match.
    fn should_stop(&self, key: &[u8], value: &[u8]) -> bool;

    /// Number of bytes stripped from emitted keys under [`Mode::NO_PREFIX`].
    fn strip_len(&self) -> usize;
}

/// Prefix/suffix filter over the raw filter byte string.
pub struct BytesFilter {
    mode: Mode,
    filter: Bytes,
}

impl BytesFilter {
    pub fn new(mode: Mode, filter: Bytes) -> Self {
        Self { mode, filter }
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        if self.filter.len() > bytes.len() {
            return false;
        }
        if self.mode.contains(Mode::SUFFIX) {
            bytes.ends_with(&self.filter)
        } else {
            bytes.starts_with(&self.filter)
        }
    }
}

impl KeyValueFilter for BytesFilter {
    fn check(&self, key: &[u8], value: &[u8]) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        if !self.matches(key) {
            return false;
        }
        if self.mode.contains(Mode::FILTER_VALUE) {
            return self.matches(value);
        }
        true
    }

    fn should_stop(&self, key: &[u8], _value: &[u8]) -> bool {
        // Prefix matches form a contiguous range under lexicographic order,
        // so a rejected key past the prefix ends the scan. Suffix matches
        // are scattered and never allow early termination.
        if self.filter.is_empty() || self.mode.contains(Mode::SUFFIX) {
            return false;
        }
        !key.starts_with(&self.filter) && key > self.filter.as_ref()
    }

    fn strip_len(&self) -> usize {
        self.filter.len()
    }
}

/// Selects the slice of `key` to emit for a listing result.
///
/// Policy, in order:
/// 1. `IGNORE_KEYS` (unless this is the last element and `KEEP_LAST` is
///    set): emit nothing.
/// 2. `NO_PREFIX`: strip the filter length from the start, or from the end
///    under `SUFFIX`.
/// 3. Otherwise emit the whole key.
pub fn key_slice<'k>(
    mode: Mode,
    filter: &dyn KeyValueFilter,
    key: &'k [u8],
    is_last: bool,
) -> &'k [u8] {
    if mode.contains(Mode::IGNORE_KEYS) && !(is_last && mode.contains(Mode::KEEP_LAST)) {
        return &[];
    }
    if mode.contains(Mode::NO_PREFIX) {
        let strip = filter.strip_len().min(key.len());
        if mode.contains(Mode::SUFFIX) {
            return &key[..key.len() - strip];
        }
        return &key[strip..];
    }
    key
}

/// Selects the slice of `value` to emit. Kept for symmetry with
/// [`key_slice`]; no mode currently alters value bytes.
pub fn value_slice<'v>(_mode: Mode, value: &'v [u8]) -> &'v [u8] {
    value
}

/// Constructor for a named filter: receives the mode and the argument bytes
/// that followed the filter name.
pub type FilterFactory = fn(Mode, Bytes) -> Result<Arc<dyn KeyValueFilter>>;

fn registry() -> &'static RwLock<HashMap<String, FilterFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, FilterFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a named filter factory. Replaces any previous registration
/// under the same name.
pub fn register_filter(name: &str, factory: FilterFactory) {
    registry()
        .write()
        .expect("filter registry poisoned")
        .insert(name.to_string(), factory);
}

/// Builds the filter for a listing request.
///
/// Without [`Mode::LIB_FILTER`] the bytes parameterize a [`BytesFilter`].
/// With it, the bytes are `name` or `name:args`, and `name` must have been
/// registered with [`register_filter`].
pub fn new_filter(mode: Mode, filter: Bytes) -> Result<Arc<dyn KeyValueFilter>> {
    if !mode.contains(Mode::LIB_FILTER) {
        return Ok(Arc::new(BytesFilter::new(mode, filter)));
    }
    let split = filter
        .iter()
        .position(|&b| b == b':')
        .unwrap_or(filter.len());
    let name = std::str::from_utf8(&filter[..split])
        .map_err(|_| Error::invalid_args("filter name is not valid utf-8"))?
        .to_string();
    let args = if split < filter.len() {
        filter.slice(split + 1..)
    } else {
        Bytes::new()
    };
    let factory = registry()
        .read()
        .expect("filter registry poisoned")
        .get(&name)
        .copied()
        .ok_or_else(|| Error::invalid_args(format!("unknown filter: {}", name)))?;
    factory(mode, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_filter(mode: Mode, filter: &'static [u8]) -> BytesFilter {
        BytesFilter::new(mode, Bytes::from_static(filter))
    }

    #[test]
    fn should_accept_everything_when_filter_is_empty() {
        let filter = bytes_filter(Mode::empty(), b"");

        assert!(filter.check(b"anything", b""));
        assert!(filter.check(b"", b""));
        assert!(!filter.should_stop(b"anything", b""));
    }

    #[test]
    fn should_match_prefix_by_default() {
        let filter = bytes_filter(Mode::empty(), b"ap");

        assert!(filter.check(b"apple", b""));
        assert!(filter.check(b"ap", b""));
        assert!(!filter.check(b"banana", b""));
        assert!(!filter.check(b"a", b""));
    }

    #[test]
    fn should_match_suffix_under_suffix_mode() {
        let filter = bytes_filter(Mode::SUFFIX, b"ot");

        assert!(filter.check(b"apricot", b""));
        assert!(!filter.check(b"apple", b""));
        // suffix matches are scattered; never stop early
        assert!(!filter.should_stop(b"zzz", b""));
    }

    #[test]
    fn should_stop_once_past_the_prefix_range() {
        let filter = bytes_filter(Mode::empty(), b"ap");

        // before the range: keep scanning
        assert!(!filter.should_stop(b"aardvark", b""));
        // past the range: no later key can match
        assert!(filter.should_stop(b"banana", b""));
        // inside the range the pair passed check, so should_stop is moot
        assert!(!filter.should_stop(b"ap", b""));
    }

    #[test]
    fn should_apply_filter_to_values_when_requested() {
        let filter = bytes_filter(Mode::FILTER_VALUE, b"v");

        assert!(filter.check(b"victor", b"value"));
        assert!(!filter.check(b"victor", b"other"));
    }

    #[test]
    fn should_copy_whole_key_by_default() {
        let filter = bytes_filter(Mode::empty(), b"ap");
        assert_eq!(key_slice(Mode::empty(), &filter, b"apple", false), b"apple");
    }

    #[test]
    fn should_strip_prefix_under_no_prefix() {
        let mode = Mode::NO_PREFIX;
        let filter = bytes_filter(mode, b"ap");
        assert_eq!(key_slice(mode, &filter, b"apple", false), b"ple");
    }

    #[test]
    fn should_strip_suffix_under_no_prefix_suffix() {
        let mode = Mode::NO_PREFIX | Mode::SUFFIX;
        let filter = bytes_filter(mode, b"ot");
        assert_eq!(key_slice(mode, &filter, b"apricot", false), b"apric");
    }

    #[test]
    fn should_ignore_keys_except_kept_last() {
        let mode = Mode::IGNORE_KEYS | Mode::KEEP_LAST;
        let filter = bytes_filter(mode, b"");

        assert_eq!(key_slice(mode, &filter, b"apple", false), b"");
        assert_eq!(key_slice(mode, &filter, b"apple", true), b"apple");

        // without KEEP_LAST even the final element is suppressed
        let mode = Mode::IGNORE_KEYS;
        assert_eq!(key_slice(mode, &filter, b"apple", true), b"");
    }

    struct EvenLengthFilter;

    impl KeyValueFilter for EvenLengthFilter {
        fn check(&self, key: &[u8], _value: &[u8]) -> bool {
            key.len() % 2 == 0
        }
        fn should_stop(&self, _key: &[u8], _value: &[u8]) -> bool {
            false
        }
        fn strip_len(&self) -> usize {
            0
        }
    }

    #[test]
    fn should_resolve_registered_lib_filter() {
        // given
        register_filter("even_len", |_mode, _args| Ok(Arc::new(EvenLengthFilter)));

        // when
        let filter = new_filter(Mode::LIB_FILTER, Bytes::from_static(b"even_len")).unwrap();

        // then
        assert!(filter.check(b"ab", b""));
        assert!(!filter.check(b"abc", b""));
    }

    #[test]
    fn should_reject_unknown_lib_filter() {
        let result = new_filter(Mode::LIB_FILTER, Bytes::from_static(b"missing"));
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }
}
