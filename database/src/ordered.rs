//! In-memory ordered key-set backend.
//!
//! Stores distinct byte-string keys in comparator order behind a
//! reader/writer lock, and supports range listing. Values are always empty:
//! `put` rejects non-empty value bytes, `get` emits zero-length values, and
//! `length` reports 0 for present keys.
//!
//! `WAIT`-mode reads probe under the read lock; on a miss they register with
//! the key watcher *while still holding the lock*, release it around the
//! wait, then re-acquire and re-probe. Writers service `NOTIFY` after their
//! write lock is released, so a waiter can never miss the wake-up.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use common::filter::{key_slice, value_slice};
use common::{
    BitField, ByteRun, Error, KeyValueFilter, KeyWatcher, Mode, Result, ValueSink, WaitOutcome,
};
use serde_json::Value;

use crate::comparator::{resolve_comparator, Comparator};
use crate::config::{expect_object, normalize_common};
use crate::database::Database;

/// A stored key ordered by the database's comparator.
#[derive(Clone)]
struct SetKey {
    bytes: Bytes,
    cmp: Arc<dyn Comparator>,
}

impl SetKey {
    fn new(bytes: Bytes, cmp: Arc<dyn Comparator>) -> Self {
        Self { bytes, cmp }
    }
}

impl PartialEq for SetKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp.compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl Eq for SetKey {}

impl PartialOrd for SetKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SetKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp.compare(&self.bytes, &other.bytes)
    }
}

/// Ordered in-memory key set.
pub struct OrderedSetDatabase {
    db: RwLock<BTreeSet<SetKey>>,
    cmp: Arc<dyn Comparator>,
    watcher: KeyWatcher,
    config: Value,
    wait_timeout: Option<Duration>,
}

impl OrderedSetDatabase {
    /// Creates a database from its JSON configuration.
    ///
    /// Recognized keys: `use_lock` (default `true`), `comparator`
    /// (default `"default"`), `wait_timeout_ms`, and the common
    /// `allocators` section. Unknown keys are preserved.
    pub fn create(config: &Value) -> Result<Arc<dyn Database>> {
        let mut config = config.clone();
        let opts = normalize_common(&mut config)?;

        let map = expect_object(&mut config)?;
        let comparator_name = match map.get("comparator") {
            None => {
                map.insert("comparator".to_string(), Value::from("default"));
                "default".to_string()
            }
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(Error::InvalidConfig(
                    "comparator must be a string".to_string(),
                ))
            }
        };
        let cmp = resolve_comparator(&comparator_name)?;

        Ok(Arc::new(Self {
            db: RwLock::new(BTreeSet::new()),
            cmp,
            watcher: KeyWatcher::new(),
            config,
            wait_timeout: opts.wait_timeout,
        }))
    }

    fn probe(&self, key: &[u8]) -> SetKey {
        SetKey::new(Bytes::copy_from_slice(key), self.cmp.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeSet<SetKey>>> {
        self.db
            .read()
            .map_err(|_| Error::Other("database lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeSet<SetKey>>> {
        self.db
            .write()
            .map_err(|_| Error::Other("database lock poisoned".to_string()))
    }

    /// Probes every key of the batch under a single read guard held for
    /// the duration. A `WAIT`-mode miss is the only point that drops the
    /// lock, and only around the wait, before re-acquiring and re-probing.
    async fn probe_batch(&self, mode: Mode, keys: &ByteRun<'_>) -> Result<Vec<bool>> {
        let mut present = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            loop {
                // Register while the read lock is held: a notifying writer
                // needs the write lock, so it cannot slip in between the
                // probe and the registration. The guard is scoped to this
                // block so it is dropped before the `await` below.
                let wait = {
                    let db = self.read()?;
                    if db.contains(&self.probe(key)) {
                        present.push(true);
                        break;
                    }
                    if !mode.contains(Mode::WAIT) {
                        present.push(false);
                        break;
                    }
                    self.watcher.add_key(key)
                };
                match wait.wait(self.wait_timeout).await {
                    WaitOutcome::KeyPresent => {}
                    WaitOutcome::TimedOut => return Err(Error::Timeout),
                    WaitOutcome::Cancelled => return Err(Error::Aborted),
                }
            }
        }
        Ok(present)
    }

    fn erase_keys(&self, keys: &ByteRun<'_>) -> Result<()> {
        let mut db = self.write()?;
        for key in keys.iter() {
            db.remove(&self.probe(key));
        }
        Ok(())
    }

    fn start_bound(&self, mode: Mode, from_key: &[u8]) -> Bound<SetKey> {
        if from_key.is_empty() {
            Bound::Unbounded
        } else if mode.contains(Mode::INCLUSIVE) {
            Bound::Included(self.probe(from_key))
        } else {
            Bound::Excluded(self.probe(from_key))
        }
    }

    fn mode_mask() -> Mode {
        Mode::INCLUSIVE
            | Mode::APPEND
            | Mode::CONSUME
            | Mode::WAIT
            | Mode::NOTIFY
            | Mode::NEW_ONLY
            | Mode::EXIST_ONLY
            | Mode::NO_PREFIX
            | Mode::IGNORE_KEYS
            | Mode::KEEP_LAST
            | Mode::SUFFIX
            | Mode::FILTER_VALUE
            | Mode::LIB_FILTER
            | Mode::NO_RDMA
    }
}

#[async_trait::async_trait]
impl Database for OrderedSetDatabase {
    fn backend_type(&self) -> &'static str {
        "set"
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn supports_mode(&self, mode: Mode) -> bool {
        mode.subset_of(Self::mode_mask())
    }

    async fn count(&self, _mode: Mode) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn exists(
        &self,
        mode: Mode,
        keys: &ByteRun<'_>,
        flags: &mut BitField<'_>,
    ) -> Result<()> {
        if flags.len() < keys.len() {
            return Err(Error::invalid_args("flag field shorter than key batch"));
        }
        let present = self.probe_batch(mode, keys).await?;
        for (i, found) in present.into_iter().enumerate() {
            flags.set(i, found);
        }
        if mode.contains(Mode::CONSUME) {
            self.erase_keys(keys)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn length(&self, mode: Mode, keys: &ByteRun<'_>, vsizes: &mut [u64]) -> Result<()> {
        if keys.len() != vsizes.len() {
            return Err(Error::invalid_args("key and size counts differ"));
        }
        let present = self.probe_batch(mode, keys).await?;
        for (i, found) in present.into_iter().enumerate() {
            vsizes[i] = if found {
                0
            } else {
                common::sentinel::KEY_NOT_FOUND
            };
        }
        if mode.contains(Mode::CONSUME) {
            self.erase_keys(keys)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn put(&self, mode: Mode, keys: &ByteRun<'_>, vals: &ByteRun<'_>) -> Result<()> {
        if keys.len() != vals.len() {
            return Err(Error::invalid_args("key and value counts differ"));
        }
        if vals.total_size() != 0 {
            return Err(Error::invalid_args(
                "key-set backend only stores empty values",
            ));
        }

        if mode.contains(Mode::EXIST_ONLY) {
            // Single-key batches enforce presence; larger batches skip the
            // check. Nothing is inserted either way: presence is the whole
            // point of EXIST_ONLY on a key set.
            if keys.len() == 1 {
                let key = keys.get(0).expect("single-element run");
                if !self.read()?.contains(&self.probe(key)) {
                    return Err(Error::KeyNotFound);
                }
            }
            return Ok(());
        }

        {
            let mut db = self.write()?;
            // The NEW_ONLY check shares the write guard with the insert so
            // no concurrent put can slip in between check and mutation.
            if mode.contains(Mode::NEW_ONLY) && keys.len() == 1 {
                let key = keys.get(0).expect("single-element run");
                if db.contains(&self.probe(key)) {
                    return Err(Error::KeyExists);
                }
            }
            for key in keys.iter() {
                db.insert(SetKey::new(Bytes::copy_from_slice(key), self.cmp.clone()));
            }
        }

        if mode.contains(Mode::NOTIFY) {
            for key in keys.iter() {
                self.watcher.notify_key(key);
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, mode: Mode, keys: &ByteRun<'_>, vals: &mut ValueSink<'_>) -> Result<()> {
        if vals.slots() != keys.len() {
            return Err(Error::invalid_args("value slots and key counts differ"));
        }
        let present = self.probe_batch(mode, keys).await?;
        for found in present {
            if found {
                vals.write(b"");
            } else {
                vals.miss();
            }
        }
        if mode.contains(Mode::CONSUME) {
            self.erase_keys(keys)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn erase(&self, mode: Mode, keys: &ByteRun<'_>) -> Result<()> {
        if mode.contains(Mode::WAIT) {
            self.probe_batch(mode, keys).await?;
        }
        self.erase_keys(keys)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn list_keys(
        &self,
        mode: Mode,
        from_key: &[u8],
        filter: &dyn KeyValueFilter,
        keys_out: &mut ValueSink<'_>,
    ) -> Result<()> {
        let db = self.read()?;
        let max = keys_out.slots();
        let mut iter = db
            .range((self.start_bound(mode, from_key), Bound::Unbounded))
            .peekable();
        let mut emitted = 0;

        while emitted < max {
            let Some(entry) = iter.next() else { break };
            let key = entry.bytes.as_ref();
            if !filter.check(key, &[]) {
                if filter.should_stop(key, &[]) {
                    break;
                }
                continue;
            }
            let is_last = emitted + 1 == max || iter.peek().is_none();
            keys_out.write(key_slice(mode, filter, key, is_last));
            emitted += 1;
        }

        keys_out.exhaust();
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn list_key_values(
        &self,
        mode: Mode,
        from_key: &[u8],
        filter: &dyn KeyValueFilter,
        keys_out: &mut ValueSink<'_>,
        vals_out: &mut ValueSink<'_>,
    ) -> Result<()> {
        if vals_out.slots() != keys_out.slots() {
            return Err(Error::invalid_args("key and value slot counts differ"));
        }
        let db = self.read()?;
        let max = keys_out.slots();
        let mut iter = db
            .range((self.start_bound(mode, from_key), Bound::Unbounded))
            .peekable();
        let mut emitted = 0;

        while emitted < max {
            let Some(entry) = iter.next() else { break };
            let key = entry.bytes.as_ref();
            if !filter.check(key, &[]) {
                if filter.should_stop(key, &[]) {
                    break;
                }
                continue;
            }
            let is_last = emitted + 1 == max || iter.peek().is_none();
            keys_out.write(key_slice(mode, filter, key, is_last));
            vals_out.write(value_slice(mode, &[]));
            emitted += 1;
        }

        keys_out.exhaust();
        vals_out.exhaust();
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.write()?.clear();
        self.watcher.cancel_all();
        Ok(())
    }
}
