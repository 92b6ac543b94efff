//! The polymorphic database contract implemented by every storage engine.

use async_trait::async_trait;
use common::{BitField, ByteRun, Error, KeyValueFilter, Mode, Result, ValueSink};

/// A storage engine behind the common database surface.
///
/// Every verb receives the operation [`Mode`] and returns a [`Result`].
/// Batched inputs arrive as [`ByteRun`] views over the decoded request
/// buffer; batched outputs are written through [`ValueSink`] /
/// [`BitField`] views into the response region. Per-element outcomes
/// (missing key, slot too small) are encoded into size slots as sentinels
/// and do not abort the batch.
///
/// Engines without ordered iteration keep the default `list_*` bodies,
/// which report [`Error::OpUnsupported`].
#[async_trait]
pub trait Database: Send + Sync {
    /// Backend type tag, as used in configuration.
    fn backend_type(&self) -> &'static str;

    /// The normalized configuration this database was created from.
    fn config(&self) -> serde_json::Value;

    /// True when every set bit of `mode` is honored by this engine.
    /// The advertised mask is authoritative; the provider rejects requests
    /// outside it before any verb runs.
    fn supports_mode(&self, mode: Mode) -> bool;

    /// Number of stored keys.
    async fn count(&self, mode: Mode) -> Result<u64>;

    /// Sets `flags[i]` iff key `i` is present.
    async fn exists(&self, mode: Mode, keys: &ByteRun<'_>, flags: &mut BitField<'_>)
        -> Result<()>;

    /// Writes each key's value byte length (0 for key-set engines) or
    /// `KEY_NOT_FOUND` into `vsizes`.
    async fn length(&self, mode: Mode, keys: &ByteRun<'_>, vsizes: &mut [u64]) -> Result<()>;

    /// Stores each `(key, value)` pair.
    async fn put(&self, mode: Mode, keys: &ByteRun<'_>, vals: &ByteRun<'_>) -> Result<()>;

    /// Writes each key's value bytes and actual length into `vals`.
    async fn get(&self, mode: Mode, keys: &ByteRun<'_>, vals: &mut ValueSink<'_>) -> Result<()>;

    /// Removes each key; absence is not an error.
    async fn erase(&self, mode: Mode, keys: &ByteRun<'_>) -> Result<()>;

    /// Emits keys in comparator order starting after (or at, under
    /// `INCLUSIVE`) `from_key`, up to the sink's slot count. Unconsumed
    /// trailing slots are stamped `NO_MORE_KEYS`.
    async fn list_keys(
        &self,
        _mode: Mode,
        _from_key: &[u8],
        _filter: &dyn KeyValueFilter,
        _keys_out: &mut ValueSink<'_>,
    ) -> Result<()> {
        Err(Error::OpUnsupported)
    }

    /// Like [`list_keys`](Self::list_keys) but also emits each value.
    async fn list_key_values(
        &self,
        _mode: Mode,
        _from_key: &[u8],
        _filter: &dyn KeyValueFilter,
        _keys_out: &mut ValueSink<'_>,
        _vals_out: &mut ValueSink<'_>,
    ) -> Result<()> {
        Err(Error::OpUnsupported)
    }

    /// Drops all contents and wakes any waiters.
    async fn destroy(&self) -> Result<()>;
}
