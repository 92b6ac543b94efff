//! Key comparators and their name registry.
//!
//! Ordered backends sort keys under a [`Comparator`]. The default orders
//! byte-wise with shorter-key-first tiebreak. Deployments can register
//! additional comparators at startup and select them by name through the
//! backend configuration (`"comparator": "<name>"`).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use common::{Error, Result};

/// Total order over byte-string keys.
pub trait Comparator: Send + Sync {
    /// Registry name of this comparator.
    fn name(&self) -> &str;

    fn compare(&self, lhs: &[u8], rhs: &[u8]) -> Ordering;
}

/// Default order: memcmp over the common length, shorter key first on ties.
/// This is exactly the standard ordering of byte slices.
pub struct LexShorterFirst;

impl Comparator for LexShorterFirst {
    fn name(&self) -> &str {
        "default"
    }

    fn compare(&self, lhs: &[u8], rhs: &[u8]) -> Ordering {
        lhs.cmp(rhs)
    }
}

fn registry() -> &'static RwLock<HashMap<String, Arc<dyn Comparator>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<dyn Comparator>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn Comparator>> = HashMap::new();
        map.insert("default".to_string(), Arc::new(LexShorterFirst));
        RwLock::new(map)
    })
}

/// Registers a comparator under its [`name`](Comparator::name), replacing
/// any previous registration.
pub fn register_comparator(comparator: Arc<dyn Comparator>) {
    registry()
        .write()
        .expect("comparator registry poisoned")
        .insert(comparator.name().to_string(), comparator);
}

/// Resolves a comparator by name, failing with `InvalidConfig` when the
/// name was never registered.
pub fn resolve_comparator(name: &str) -> Result<Arc<dyn Comparator>> {
    registry()
        .read()
        .expect("comparator registry poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| Error::InvalidConfig(format!("unknown comparator: {}", name)))
}
