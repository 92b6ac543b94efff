//! Backend configuration normalization.
//!
//! Backend configs are JSON documents. Normalization writes defaults back
//! into the document (so the stored config is self-describing), validates
//! the keys it understands, and preserves unknown keys verbatim. The
//! normalized document is what [`Database::config`](crate::Database::config)
//! returns.

use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use common::{Error, Result};
use serde_json::{json, Map, Value};

/// Options shared by every backend.
pub(crate) struct CommonOpts {
    /// Whether the backend wraps its state in a reader/writer lock. The
    /// in-memory engines always carry the lock (safe Rust cannot hand out
    /// unsynchronized aliasing); the flag is normalized and stored so
    /// configs round-trip.
    #[allow(dead_code)]
    pub use_lock: bool,
    /// Deadline for `WAIT`-mode reads; `None` waits without limit.
    pub wait_timeout: Option<Duration>,
}

/// Views `cfg` as a JSON object, treating `null` as an empty one.
pub(crate) fn expect_object(cfg: &mut Value) -> Result<&mut Map<String, Value>> {
    if cfg.is_null() {
        *cfg = json!({});
    }
    cfg.as_object_mut()
        .ok_or_else(|| Error::InvalidConfig("configuration must be a JSON object".to_string()))
}

/// Normalizes `use_lock`, `wait_timeout_ms`, and the `allocators` section.
pub(crate) fn normalize_common(cfg: &mut Value) -> Result<CommonOpts> {
    let map = expect_object(cfg)?;

    let use_lock = match map.get("use_lock") {
        None => {
            map.insert("use_lock".to_string(), json!(true));
            true
        }
        Some(Value::Bool(value)) => *value,
        Some(_) => {
            return Err(Error::InvalidConfig(
                "use_lock must be a boolean".to_string(),
            ))
        }
    };

    let wait_timeout = match map.get("wait_timeout_ms") {
        None => None,
        Some(value) => Some(Duration::from_millis(value.as_u64().ok_or_else(|| {
            Error::InvalidConfig("wait_timeout_ms must be an unsigned number".to_string())
        })?)),
    };

    normalize_allocators(map)?;

    Ok(CommonOpts {
        use_lock,
        wait_timeout,
    })
}

/// Fills allocator defaults and validates the configured names.
fn normalize_allocators(map: &mut Map<String, Value>) -> Result<()> {
    let allocators = map
        .entry("allocators".to_string())
        .or_insert_with(|| json!({}));
    let allocators = allocators.as_object_mut().ok_or_else(|| {
        Error::InvalidConfig("allocators must be a JSON object".to_string())
    })?;

    for field in ["key_allocator", "node_allocator"] {
        let name = match allocators.get(field) {
            None => {
                allocators.insert(field.to_string(), json!("default"));
                "default".to_string()
            }
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(Error::InvalidConfig(format!(
                    "{} must be a string",
                    field
                )))
            }
        };
        if !allocator_known(&name) {
            return Err(Error::InvalidConfig(format!("unknown allocator: {}", name)));
        }
        allocators
            .entry(format!("{}_config", field))
            .or_insert_with(|| json!({}));
    }

    Ok(())
}

fn allocator_names() -> &'static RwLock<HashSet<String>> {
    static NAMES: OnceLock<RwLock<HashSet<String>>> = OnceLock::new();
    NAMES.get_or_init(|| {
        let mut names = HashSet::new();
        names.insert("default".to_string());
        RwLock::new(names)
    })
}

/// Registers an allocator name so configs referencing it validate. Rust
/// collections keep using the global allocator; the registry only makes
/// configs written for named-allocator deployments round-trip.
pub fn register_allocator(name: &str) {
    allocator_names()
        .write()
        .expect("allocator registry poisoned")
        .insert(name.to_string());
}

fn allocator_known(name: &str) -> bool {
    allocator_names()
        .read()
        .expect("allocator registry poisoned")
        .contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fill_defaults_into_empty_config() {
        // given
        let mut cfg = json!({});

        // when
        let opts = normalize_common(&mut cfg).unwrap();

        // then
        assert!(opts.use_lock);
        assert!(opts.wait_timeout.is_none());
        assert_eq!(cfg["use_lock"], json!(true));
        assert_eq!(cfg["allocators"]["key_allocator"], json!("default"));
        assert_eq!(cfg["allocators"]["node_allocator"], json!("default"));
        assert_eq!(cfg["allocators"]["key_allocator_config"], json!({}));
    }

    #[test]
    fn should_treat_null_as_empty_object() {
        let mut cfg = Value::Null;
        normalize_common(&mut cfg).unwrap();
        assert_eq!(cfg["use_lock"], json!(true));
    }

    #[test]
    fn should_preserve_unknown_keys() {
        let mut cfg = json!({"custom_tuning": 42});

        normalize_common(&mut cfg).unwrap();

        assert_eq!(cfg["custom_tuning"], json!(42));
    }

    #[test]
    fn should_keep_explicit_use_lock_false() {
        let mut cfg = json!({"use_lock": false});
        let opts = normalize_common(&mut cfg).unwrap();
        assert!(!opts.use_lock);
        assert_eq!(cfg["use_lock"], json!(false));
    }

    #[test]
    fn should_parse_wait_timeout() {
        let mut cfg = json!({"wait_timeout_ms": 250});
        let opts = normalize_common(&mut cfg).unwrap();
        assert_eq!(opts.wait_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn should_reject_non_boolean_use_lock() {
        let mut cfg = json!({"use_lock": "yes"});
        assert!(matches!(
            normalize_common(&mut cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn should_reject_non_object_config() {
        let mut cfg = json!([1, 2, 3]);
        assert!(matches!(
            normalize_common(&mut cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn should_reject_unknown_allocator() {
        let mut cfg = json!({"allocators": {"key_allocator": "arena"}});
        assert!(matches!(
            normalize_common(&mut cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn should_accept_registered_allocator() {
        register_allocator("slab");
        let mut cfg = json!({"allocators": {"node_allocator": "slab"}});

        normalize_common(&mut cfg).unwrap();

        assert_eq!(cfg["allocators"]["node_allocator"], json!("slab"));
        assert_eq!(cfg["allocators"]["node_allocator_config"], json!({}));
    }
}
