//! va-config: declarative inputs of the server.
//!
//! - record database files (YAML/JSON, deep-merged in order)
//! - device controls files and the device templates built from them
//! - server settings

pub mod devices;
pub mod error;
pub mod merge;
pub mod records;
pub mod settings;

pub use devices::{DeviceInfo, device_records, load_relevant_controls, select_devices};
pub use error::{ConfigError, ConfigResult};
pub use merge::{deep_merge, load_document, load_merged};
pub use records::{extend_unique, load_record_db, prefixed, single};
pub use settings::{DEFAULT_RESET_POINT, ScreenDefaults, ServerConfig};

use std::path::Path;

use va_records::RecordDatabase;

/// Record database from explicit record files plus device controls files.
///
/// Records generated from devices come first; a name defined by both is an
/// error.
pub fn load_database<P: AsRef<Path>, Q: AsRef<Path>>(
    record_files: &[P],
    device_files: &[Q],
    screen: &ScreenDefaults,
) -> ConfigResult<RecordDatabase> {
    let mut db = if device_files.is_empty() {
        RecordDatabase::new()
    } else {
        device_records(&load_relevant_controls(device_files)?, screen)
    };
    if !record_files.is_empty() {
        extend_unique(&mut db, load_record_db(record_files)?)?;
    }
    Ok(db)
}
