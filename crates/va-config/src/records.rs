//! Record database files.

use std::path::Path;

use va_records::{RecordDatabase, RecordDescriptor};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::load_merged;

/// Load and deep-merge record database files into one database.
///
/// Descriptors are only parsed here; kind and attribute checks happen when
/// the records are built.
pub fn load_record_db<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<RecordDatabase> {
    let merged = load_merged(paths)?;
    let db: RecordDatabase = serde_yaml::from_value(merged)?;
    Ok(db)
}

/// Prepend `prefix` to every record name.
pub fn prefixed(db: RecordDatabase, prefix: &str) -> RecordDatabase {
    if prefix.is_empty() {
        return db;
    }
    db.into_iter()
        .map(|(name, descriptor)| (format!("{}{}", prefix, name), descriptor))
        .collect()
}

/// Append `extra` to `db`; a name present in both is an error.
pub fn extend_unique(db: &mut RecordDatabase, extra: RecordDatabase) -> ConfigResult<()> {
    for (name, descriptor) in extra {
        if db.contains_key(&name) {
            return Err(ConfigError::InvalidValue {
                field: name,
                reason: "record defined twice".to_string(),
            });
        }
        db.insert(name, descriptor);
    }
    Ok(())
}

/// Build a single-record database.
pub fn single(name: &str, descriptor: RecordDescriptor) -> RecordDatabase {
    let mut db = RecordDatabase::new();
    db.insert(name.to_string(), descriptor);
    db
}
