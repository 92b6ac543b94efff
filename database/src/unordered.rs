//! In-memory hashed key-set backend.
//!
//! Same verb semantics as the ordered set minus ordering and the watcher:
//! no `list_*` support (the defaults report `OpUnsupported`) and no
//! `WAIT`/`NOTIFY` in the advertised mask. The hash set starts with a
//! configurable bucket count.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use common::{BitField, ByteRun, Error, Mode, Result, ValueSink};
use serde_json::{json, Value};

use crate::config::{expect_object, normalize_common};
use crate::database::Database;

const DEFAULT_BUCKET_COUNT: u64 = 23;

/// Unordered in-memory key set.
pub struct UnorderedSetDatabase {
    db: RwLock<HashSet<Bytes>>,
    config: Value,
}

impl UnorderedSetDatabase {
    /// Creates a database from its JSON configuration.
    ///
    /// Recognized keys: `use_lock` (default `true`), `initial_bucket_count`
    /// (default 23), and the common `allocators` section. Unknown keys are
    /// preserved.
    pub fn create(config: &Value) -> Result<Arc<dyn Database>> {
        let mut config = config.clone();
        normalize_common(&mut config)?;

        let map = expect_object(&mut config)?;
        let buckets = match map.get("initial_bucket_count") {
            None => {
                map.insert("initial_bucket_count".to_string(), json!(DEFAULT_BUCKET_COUNT));
                DEFAULT_BUCKET_COUNT
            }
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::InvalidConfig("initial_bucket_count must be an unsigned number".to_string())
            })?,
        };

        Ok(Arc::new(Self {
            db: RwLock::new(HashSet::with_capacity(buckets as usize)),
            config,
        }))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashSet<Bytes>>> {
        self.db
            .read()
            .map_err(|_| Error::Other("database lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashSet<Bytes>>> {
        self.db
            .write()
            .map_err(|_| Error::Other("database lock poisoned".to_string()))
    }

    fn erase_keys(&self, keys: &ByteRun<'_>) -> Result<()> {
        let mut db = self.write()?;
        for key in keys.iter() {
            db.remove(key);
        }
        Ok(())
    }

    fn mode_mask() -> Mode {
        // Listing flags are advertised for parity with the mask layout even
        // though list verbs themselves report OpUnsupported.
        Mode::INCLUSIVE
            | Mode::APPEND
            | Mode::CONSUME
            | Mode::NEW_ONLY
            | Mode::EXIST_ONLY
            | Mode::NO_PREFIX
            | Mode::IGNORE_KEYS
            | Mode::KEEP_LAST
            | Mode::SUFFIX
            | Mode::FILTER_VALUE
            | Mode::LIB_FILTER
            | Mode::NO_RDMA
            | Mode::IGNORE_DOCS
    }
}

#[async_trait::async_trait]
impl Database for UnorderedSetDatabase {
    fn backend_type(&self) -> &'static str {
        "unordered_set"
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
        {
            let db = self.read()?;
            for (i, key) in keys.iter().enumerate() {
                flags.set(i, db.contains(key));
            }
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
        {
            let db = self.read()?;
            for (i, key) in keys.iter().enumerate() {
                vsizes[i] = if db.contains(key) {
                    0
                } else {
                    common::sentinel::KEY_NOT_FOUND
                };
            }
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
            if keys.len() == 1 {
                let key = keys.get(0).expect("single-element run");
                if !self.read()?.contains(key) {
                    return Err(Error::KeyNotFound);
                }
            }
            return Ok(());
        }

        let mut db = self.write()?;
        // The NEW_ONLY check shares the write guard with the insert so no
        // concurrent put can slip in between check and mutation.
        if mode.contains(Mode::NEW_ONLY) && keys.len() == 1 {
            let key = keys.get(0).expect("single-element run");
            if db.contains(key) {
                return Err(Error::KeyExists);
            }
        }
        for key in keys.iter() {
            db.insert(Bytes::copy_from_slice(key));
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, mode: Mode, keys: &ByteRun<'_>, vals: &mut ValueSink<'_>) -> Result<()> {
        if vals.slots() != keys.len() {
            return Err(Error::invalid_args("value slots and key counts differ"));
        }
        {
            let db = self.read()?;
            for key in keys.iter() {
                if db.contains(key) {
                    vals.write(b"");
                } else {
                    vals.miss();
                }
            }
        }
        if mode.contains(Mode::CONSUME) {
            self.erase_keys(keys)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn erase(&self, _mode: Mode, keys: &ByteRun<'_>) -> Result<()> {
        self.erase_keys(keys)
    }

    async fn destroy(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}
