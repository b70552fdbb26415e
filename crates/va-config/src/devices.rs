//! Device controls files and the templates that turn devices into records.
//!
//! A controls file groups devices by section. Only one device type per
//! section is served:
//!
//! | section | `metadata.type` |
//! |---------|-----------------|
//! | magnets | QUAD            |
//! | screens | PROF            |
//! | tcavs   | LCAV            |
//! | bpms    | BPM             |
//!
//! The template is chosen from the control name (`QUAD:`, `OTRS:`, `TCAV:`,
//! `BPMS:` families); each template names the PV keys it needs.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};
use va_records::{RecordDatabase, RecordDescriptor};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::load_merged;
use crate::settings::ScreenDefaults;

const SECTIONS: [(&str, &str); 4] = [
    ("magnets", "QUAD"),
    ("screens", "PROF"),
    ("tcavs", "LCAV"),
    ("bpms", "BPM"),
];

/// One served device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub control_name: String,
    /// PV key (`bctrl`, `image`, ...) to PV name.
    pub pvs: IndexMap<String, String>,
    pub metadata: Mapping,
    /// Lowercased device key, as used by lattice files.
    pub madname: String,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(default)]
    metadata: Mapping,
    controls_information: Option<RawControls>,
}

#[derive(Debug, Deserialize)]
struct RawControls {
    control_name: String,
    #[serde(rename = "PVs", default)]
    pvs: IndexMap<String, String>,
}

/// Load controls files (deep-merged in order) and select the served devices,
/// keyed by control name.
pub fn load_relevant_controls<P: AsRef<Path>>(
    paths: &[P],
) -> ConfigResult<IndexMap<String, DeviceInfo>> {
    let merged = load_merged(paths)?;
    select_devices(&merged)
}

pub fn select_devices(doc: &Value) -> ConfigResult<IndexMap<String, DeviceInfo>> {
    let mut devices = IndexMap::new();
    for (section, wanted) in SECTIONS {
        let Some(entries) = doc.get(section) else {
            continue;
        };
        let entries: IndexMap<String, RawDevice> = serde_yaml::from_value(entries.clone())?;
        for (key, raw) in entries {
            let device_type = raw.metadata.get("type").and_then(Value::as_str);
            if device_type != Some(wanted) {
                continue;
            }
            let controls = raw
                .controls_information
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("{}.{}", section, key),
                    reason: "missing controls_information".to_string(),
                })?;
            devices.insert(
                controls.control_name.clone(),
                DeviceInfo {
                    control_name: controls.control_name,
                    pvs: controls.pvs,
                    metadata: raw.metadata,
                    madname: key.to_lowercase(),
                },
            );
        }
    }
    debug!(devices = devices.len(), "device controls selected");
    Ok(devices)
}

/// Expand devices into a record database through the device templates.
///
/// A device whose PV list lacks any name its template needs is skipped as a
/// whole.
pub fn device_records(
    devices: &IndexMap<String, DeviceInfo>,
    screen: &ScreenDefaults,
) -> RecordDatabase {
    let mut db = RecordDatabase::new();
    for (control_name, info) in devices {
        let Some(template) = template_for(control_name, screen) else {
            debug!(device = %control_name, "no template for device family");
            continue;
        };

        let missing: Vec<&str> = template
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| !info.pvs.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            warn!(device = %control_name, missing = ?missing, "device skipped, PV names missing");
            continue;
        }

        for (key, descriptor) in template {
            db.insert(info.pvs[key].clone(), descriptor);
        }
    }
    db
}

fn template_for(
    control_name: &str,
    screen: &ScreenDefaults,
) -> Option<Vec<(&'static str, RecordDescriptor)>> {
    if control_name.contains("QUAD") {
        Some(quad())
    } else if control_name.contains("OTRS") {
        Some(screen_template(screen))
    } else if control_name.contains("TCAV") {
        Some(tcav())
    } else if control_name.contains("BPMS") {
        Some(bpm())
    } else {
        None
    }
}

fn magnet_setting() -> RecordDescriptor {
    RecordDescriptor::float(0.0)
        .with("prec", 5)
        .with("hopr", 20)
        .with("lopr", -20)
        .with("drvh", 20)
        .with("drvl", -20)
}

fn readback(prec: i32) -> RecordDescriptor {
    RecordDescriptor::float(0.0).with("prec", prec)
}

fn quad() -> Vec<(&'static str, RecordDescriptor)> {
    vec![
        ("bact", magnet_setting()),
        ("bctrl", magnet_setting()),
        ("bmax", RecordDescriptor::float(20.0).with("prec", 5)),
        ("bmin", RecordDescriptor::float(-20.0).with("prec", 5)),
        ("bdes", magnet_setting()),
        ("bcon", magnet_setting()),
        (
            "ctrl",
            RecordDescriptor::enumerated(["Ready", "TRIM", "Perturb", "MORE_IF_NEEDED"]),
        ),
    ]
}

fn screen_template(screen: &ScreenDefaults) -> Vec<(&'static str, RecordDescriptor)> {
    let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
    vec![
        ("image", RecordDescriptor::array(screen.n_row, screen.n_col)),
        ("n_row", RecordDescriptor::int(count(screen.n_row))),
        ("n_col", RecordDescriptor::int(count(screen.n_col))),
        (
            "resolution",
            RecordDescriptor::float(screen.resolution).with("unit", "um/px"),
        ),
        ("target_control", RecordDescriptor::enumerated(["OUT", "IN"])),
    ]
}

fn tcav() -> Vec<(&'static str, RecordDescriptor)> {
    let switch = || RecordDescriptor::enumerated(["Disable", "Enable"]);
    let feedback = || RecordDescriptor::enumerated(["Disable", "Pause", "Feedforward", "Enable"]);
    vec![
        ("amplitude_fbenb", switch()),
        ("amplitude_fbst", feedback()),
        ("phase_fbenb", switch()),
        ("phase_fbst", feedback()),
        ("rf_enable", switch()),
        ("amplitude", readback(5)),
        ("phase", readback(5)),
        (
            "mode_config",
            RecordDescriptor::enumerated(["Disable", "ACCEL", "STDBY"]),
        ),
    ]
}

fn bpm() -> Vec<(&'static str, RecordDescriptor)> {
    vec![
        ("tmit", readback(5)),
        ("x", readback(5)),
        ("y", readback(5)),
    ]
}
