//! Layered document loading.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// Merge `overlay` into `base`: maps merge key by key, recursively; any
/// other value (lists included) replaces what was there.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Read one YAML or JSON document (`.json` selects JSON). Empty files load
/// as `Null`.
pub fn load_document(path: &Path) -> ConfigResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(value)
}

/// Load every document in order and deep-merge them; later files win.
///
/// Every non-empty document must be a mapping.
pub fn load_merged<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Value> {
    let mut merged = Value::Mapping(Default::default());
    for path in paths {
        let path = path.as_ref();
        match load_document(path)? {
            Value::Null => {}
            doc @ Value::Mapping(_) => deep_merge(&mut merged, doc),
            _ => {
                return Err(ConfigError::Document {
                    path: path.to_path_buf(),
                    what: "top level must be a mapping".to_string(),
                });
            }
        }
    }
    Ok(merged)
}
