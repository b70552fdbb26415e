//! Server settings file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use va_sim::{
    CoordinatorOptions, DEFAULT_IGNORE, DEFAULT_STATUS_POINT, DEFAULT_TIMEOUT_POINT,
    MeasurementFilter,
};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::load_merged;

/// Defaults for the screen (OTRS) device template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenDefaults {
    pub n_row: usize,
    pub n_col: usize,
    /// Microns per pixel.
    pub resolution: f64,
}

impl Default for ScreenDefaults {
    fn default() -> Self {
        Self {
            n_row: 1944,
            n_col: 1472,
            resolution: 23.33,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Prepended to every record name, pseudo points included.
    pub prefix: String,
    pub threaded: bool,
    pub debounce_interval_s: f64,
    pub status_point: String,
    pub timeout_point: String,
    /// Writes to this point restore the reference model's initial state.
    pub reset_point: Option<String>,
    pub measurement_ignore: Vec<String>,
    pub screen: ScreenDefaults,
}

/// Default name of the model reset point.
pub const DEFAULT_RESET_POINT: &str = "VIRT:BEAM:RESET_SIM";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            threaded: true,
            debounce_interval_s: 0.0,
            status_point: DEFAULT_STATUS_POINT.to_string(),
            timeout_point: DEFAULT_TIMEOUT_POINT.to_string(),
            reset_point: Some(DEFAULT_RESET_POINT.to_string()),
            measurement_ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            screen: ScreenDefaults::default(),
        }
    }
}

impl ServerConfig {
    /// Load from YAML or JSON files, later files overriding earlier ones.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Self> {
        let merged = load_merged(paths)?;
        let config: ServerConfig = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.debounce_interval_s.is_finite() || self.debounce_interval_s < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "debounce_interval_s".to_string(),
                reason: format!("{} is not a non-negative number", self.debounce_interval_s),
            });
        }
        let reset = self.reset_point.iter().map(|name| ("reset_point", name));
        for (field, name) in [
            ("status_point", &self.status_point),
            ("timeout_point", &self.timeout_point),
        ]
        .into_iter()
        .chain(reset)
        {
            if name.is_empty() || name.contains('.') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("'{}' is not a valid record name", name),
                });
            }
        }
        if self.status_point == self.timeout_point {
            return Err(ConfigError::InvalidValue {
                field: "timeout_point".to_string(),
                reason: "must differ from status_point".to_string(),
            });
        }
        if let Some(reset) = &self.reset_point {
            if *reset == self.status_point || *reset == self.timeout_point {
                return Err(ConfigError::InvalidValue {
                    field: "reset_point".to_string(),
                    reason: "must differ from the other pseudo points".to_string(),
                });
            }
        }
        if self.screen.n_row == 0 || self.screen.n_col == 0 {
            return Err(ConfigError::InvalidValue {
                field: "screen".to_string(),
                reason: "image dimensions must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn status_name(&self) -> String {
        format!("{}{}", self.prefix, self.status_point)
    }

    pub fn timeout_name(&self) -> String {
        format!("{}{}", self.prefix, self.timeout_point)
    }

    pub fn reset_name(&self) -> Option<String> {
        self.reset_point
            .as_ref()
            .map(|name| format!("{}{}", self.prefix, name))
    }

    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.debounce_interval_s).unwrap_or(Duration::ZERO)
    }

    /// Coordinator options with prefixed pseudo point names.
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            threaded: self.threaded,
            interval: self.interval(),
            status_point: self.status_name(),
            timeout_point: self.timeout_name(),
            filter: MeasurementFilter::new(self.measurement_ignore.iter().cloned()),
        }
    }
}
