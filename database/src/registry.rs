//! Backend registry: maps a configuration type tag to a constructor.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use common::{Error, Result};
use serde_json::Value;

use crate::database::Database;
use crate::ordered::OrderedSetDatabase;
use crate::unordered::UnorderedSetDatabase;

/// Builds a database instance from a backend configuration document.
pub type BackendConstructor = fn(&Value) -> Result<Arc<dyn Database>>;

fn registry() -> &'static RwLock<HashMap<String, BackendConstructor>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, BackendConstructor>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, BackendConstructor> = HashMap::new();
        map.insert("set".to_string(), OrderedSetDatabase::create);
        map.insert("unordered_set".to_string(), UnorderedSetDatabase::create);
        RwLock::new(map)
    })
}

/// Registers a backend constructor under `tag`, replacing any previous
/// registration.
pub fn register_backend(tag: &str, constructor: BackendConstructor) {
    registry()
        .write()
        .expect("backend registry poisoned")
        .insert(tag.to_string(), constructor);
}

/// Creates a database of type `tag` from `config`.
pub fn create_database(tag: &str, config: &Value) -> Result<Arc<dyn Database>> {
    let constructor = registry()
        .read()
        .expect("backend registry poisoned")
        .get(tag)
        .copied()
        .ok_or_else(|| Error::InvalidBackend(tag.to_string()))?;
    constructor(config)
}
