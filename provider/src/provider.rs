//! The provider: a process-wide registry of databases keyed by UUID.
//!
//! A provider owns its databases exclusively. It is configured with a JSON
//! document listing the databases to open; registration fills each entry's
//! `__id__` in, and [`Provider::config`] returns the normalized document.
//! Incoming requests are dispatched by UUID after a mode-mask check, with
//! the flat-buffer layouts decoded by [`request`](crate::request).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::{Error, Mode, Result};
use database::{create_database, Database};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::request;

/// A registered database and its identity.
pub struct DatabaseEntry {
    pub id: Uuid,
    pub name: String,
    pub type_tag: String,
    pub db: Arc<dyn Database>,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<Uuid, Arc<DatabaseEntry>>,
    by_name: HashMap<String, Uuid>,
}

/// Declaration of one database in the provider configuration.
#[derive(Deserialize)]
struct DatabaseDecl {
    name: String,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    config: Value,
    #[serde(rename = "__id__", default)]
    id: Option<Uuid>,
}

#[derive(Deserialize)]
struct ProviderDecl {
    #[serde(default)]
    databases: Vec<DatabaseDecl>,
}

/// Registry of databases hosted behind one endpoint.
pub struct Provider {
    registry: RwLock<Registry>,
}

impl Provider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Creates a provider from a JSON configuration document of the form
    /// `{"databases": [{"name", "type", "config", "__id__"?}, ...]}`.
    /// Entries without an `__id__` get one assigned.
    pub fn with_config(config: &str) -> Result<Self> {
        let decl: ProviderDecl = serde_json::from_str(config)
            .map_err(|err| Error::InvalidConfig(err.to_string()))?;
        let provider = Self::new();
        for database in decl.databases {
            provider.register(database.name, database.type_tag, &database.config, database.id)?;
        }
        Ok(provider)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>> {
        self.registry
            .read()
            .map_err(|_| Error::Other("provider registry poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>> {
        self.registry
            .write()
            .map_err(|_| Error::Other("provider registry poisoned".to_string()))
    }

    fn register(
        &self,
        name: String,
        type_tag: String,
        config: &Value,
        id: Option<Uuid>,
    ) -> Result<Uuid> {
        let db = create_database(&type_tag, config)?;
        let id = id.unwrap_or_else(Uuid::new_v4);
        let mut registry = self.write()?;
        if registry.by_name.contains_key(&name) {
            return Err(Error::invalid_args(format!(
                "database name already in use: {}",
                name
            )));
        }
        if registry.by_id.contains_key(&id) {
            return Err(Error::invalid_args(format!(
                "database id already in use: {}",
                id
            )));
        }
        tracing::debug!(name = %name, backend = %type_tag, id = %id, "opening database");
        let entry = Arc::new(DatabaseEntry {
            id,
            name: name.clone(),
            type_tag,
            db,
        });
        registry.by_name.insert(name, id);
        registry.by_id.insert(id, entry);
        Ok(id)
    }

    /// Opens a database and registers it under a fresh UUID.
    pub fn open_database(&self, name: &str, type_tag: &str, config: &Value) -> Result<Uuid> {
        self.register(name.to_string(), type_tag.to_string(), config, None)
    }

    /// Looks a database up by id.
    pub fn find_database(&self, id: &Uuid) -> Result<Arc<DatabaseEntry>> {
        self.read()?
            .by_id
            .get(id)
            .cloned()
            .ok_or(Error::InvalidDatabase)
    }

    /// Resolves a database id from its configured name.
    pub fn find_by_name(&self, name: &str) -> Result<Uuid> {
        self.read()?
            .by_name
            .get(name)
            .copied()
            .ok_or(Error::InvalidDatabase)
    }

    /// Forgets a database without touching its contents.
    pub fn close_database(&self, id: &Uuid) -> Result<()> {
        let mut registry = self.write()?;
        let entry = registry.by_id.remove(id).ok_or(Error::InvalidDatabase)?;
        registry.by_name.remove(&entry.name);
        Ok(())
    }

    /// Closes a database and drops its contents.
    pub async fn destroy_database(&self, id: &Uuid) -> Result<()> {
        let entry = {
            let mut registry = self.write()?;
            let entry = registry.by_id.remove(id).ok_or(Error::InvalidDatabase)?;
            registry.by_name.remove(&entry.name);
            entry
        };
        tracing::debug!(name = %entry.name, id = %id, "destroying database");
        entry.db.destroy().await
    }

    /// Ids of all registered databases.
    pub fn database_ids(&self) -> Vec<Uuid> {
        match self.read() {
            Ok(registry) => registry.by_id.keys().copied().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The normalized provider configuration, `__id__` fields included.
    pub fn config(&self) -> Value {
        let databases: Vec<Value> = match self.read() {
            Ok(registry) => registry
                .by_id
                .values()
                .map(|entry| {
                    json!({
                        "name": entry.name,
                        "type": entry.type_tag,
                        "config": entry.db.config(),
                        "__id__": entry.id.to_string(),
                    })
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        json!({ "databases": databases })
    }

    /// Resolves the target database and checks its advertised mode mask.
    fn target(&self, id: &Uuid, mode_bits: u32) -> Result<(Arc<DatabaseEntry>, Mode)> {
        let entry = self.find_database(id)?;
        let mode = Mode::from_wire(mode_bits);
        if !entry.db.supports_mode(mode) {
            return Err(Error::OpUnsupported);
        }
        Ok((entry, mode))
    }

    /// Number of keys stored in the database.
    pub async fn count(&self, id: &Uuid, mode_bits: u32) -> Result<u64> {
        let (entry, mode) = self.target(id, mode_bits)?;
        entry.db.count(mode).await
    }

    /// Batched existence test over `[ksizes | keys | flag bit-field]`.
    pub async fn exists(
        &self,
        id: &Uuid,
        mode_bits: u32,
        count: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::exists(entry.db.as_ref(), mode, count, buf).await
    }

    /// Batched value-length query over `[ksizes | keys | vsizes]`.
    pub async fn length(
        &self,
        id: &Uuid,
        mode_bits: u32,
        count: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::length(entry.db.as_ref(), mode, count, buf).await
    }

    /// Batched put over `[ksizes | vsizes | keys | vals]`.
    pub async fn put(
        &self,
        id: &Uuid,
        mode_bits: u32,
        count: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::put(entry.db.as_ref(), mode, count, buf).await
    }

    /// Batched get over `[ksizes | keys | vsizes | vals]`.
    pub async fn get(
        &self,
        id: &Uuid,
        mode_bits: u32,
        count: usize,
        packed: bool,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::get(entry.db.as_ref(), mode, count, packed, buf).await
    }

    /// Batched erase over `[ksizes | keys]`.
    pub async fn erase(
        &self,
        id: &Uuid,
        mode_bits: u32,
        count: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::erase(entry.db.as_ref(), mode, count, buf).await
    }

    /// Ordered listing of keys into the `[ksizes | keys]` result area.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_keys(
        &self,
        id: &Uuid,
        mode_bits: u32,
        max: usize,
        packed: bool,
        from_key: &[u8],
        filter: &[u8],
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::list_keys(entry.db.as_ref(), mode, max, packed, from_key, filter, buf).await
    }

    /// Ordered listing of pairs into the `[ksizes | vsizes | keys | vals]`
    /// result area; `key_buf_size` splits the two byte regions.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_key_values(
        &self,
        id: &Uuid,
        mode_bits: u32,
        max: usize,
        packed: bool,
        from_key: &[u8],
        filter: &[u8],
        key_buf_size: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::list_key_values(
            entry.db.as_ref(),
            mode,
            max,
            packed,
            from_key,
            filter,
            key_buf_size,
            buf,
        )
        .await
    }

    /// Direct existence test over already-split key slices.
    pub async fn exists_direct(
        &self,
        id: &Uuid,
        mode_bits: u32,
        keys: &[&[u8]],
    ) -> Result<Vec<bool>> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::exists_direct(entry.db.as_ref(), mode, keys).await
    }

    /// Direct value-length query over already-split key slices.
    pub async fn length_direct(
        &self,
        id: &Uuid,
        mode_bits: u32,
        keys: &[&[u8]],
    ) -> Result<Vec<u64>> {
        let (entry, mode) = self.target(id, mode_bits)?;
        request::length_direct(entry.db.as_ref(), mode, keys).await
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}
