//! Relay configuration
//!
//! The parameter file is produced ahead of time by the setup wizard. Top-level keys start
//! with an underscore; devices are stored as `dev0`, `dev1`, ... up to `_num_devices`.
//! JSON is the default format, files ending in `.toml` are read as TOML with the same
//! layout.
//!
//! Loading either returns a fully validated [`RelayParams`] or the first problem found as
//! a [`ConfigError`]. The relay never starts with a partially valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::devices::{ButtonId, DeviceRole, ValueKind, ValueKinds};
use crate::tracking::MAX_TRACKED_DEVICE_COUNT;

const APP_DIR: &str = "vr-relay";
const DEFAULT_PARAMS_FILE: &str = "params.json";

/// Button display names that would collide with the per-device keys of the output message
const RESERVED_BUTTON_NAMES: [&str; 2] = ["role", "pose"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed parameter file: {0}")]
    Parse(String),

    #[error("Invalid number of devices specified: {0}")]
    InvalidDeviceCount(i64),

    #[error("At least 2 devices must be specified for bimanual control")]
    BimanualNeedsTwoDevices,

    #[error("Missing entry for device {0}")]
    MissingDevice(String),

    #[error("Duplicate device name specified: {0}")]
    DuplicateDeviceName(String),

    #[error("Invalid device role '{role}' for {device}")]
    InvalidRole { device: String, role: String },

    #[error("Multiple {0} controllers specified")]
    DuplicateHand(DeviceRole),

    #[error("Invalid button ID '{key}' for device {device}")]
    InvalidButtonId { device: String, key: String },

    #[error("Duplicate button name {name} for device {device}")]
    DuplicateButtonName { device: String, name: String },

    #[error("Button name '{name}' on device {device} is reserved")]
    ReservedButtonName { device: String, name: String },

    #[error("Invalid button data input type '{kind}' for button {button}")]
    InvalidValueType { button: String, kind: String },

    #[error("Bimanual mode was specified, but left and right controllers are not both configured")]
    BimanualMissingHands,
}

// Raw file layout

#[derive(Deserialize, Serialize, Clone, Debug)]
struct RawParams {
    #[serde(rename = "_bimanual")]
    bimanual: bool,
    #[serde(rename = "_num_devices")]
    num_devices: i64,
    #[serde(rename = "_out_addr", default)]
    out_addr: String,
    #[serde(rename = "_out_port")]
    out_port: u16,
    #[serde(rename = "_update_freq")]
    update_freq: u32,
    #[serde(rename = "_cmd_port", default)]
    cmd_port: Option<u16>,
    // Everything else. Only `dev0..dev{n-1}` is read as a device.
    #[serde(flatten)]
    entries: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
struct RawDevice {
    #[serde(rename = "_name")]
    name: String,
    #[serde(rename = "_role")]
    role: String,
    #[serde(rename = "_track_pose")]
    track_pose: bool,
    #[serde(default)]
    buttons: BTreeMap<String, RawButton>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
struct RawButton {
    name: String,
    #[serde(default)]
    types: BTreeMap<String, bool>,
}

// Validated model

#[derive(Debug, Clone, PartialEq)]
pub struct ButtonSpec {
    pub id: ButtonId,
    pub name: String,
    pub kinds: ValueKinds,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub name: String,
    pub role: DeviceRole,
    pub track_pose: bool,
    pub buttons: Vec<ButtonSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayParams {
    /// Publish only while both hands are active
    pub bimanual: bool,
    /// Destination address, empty for the local host
    pub out_addr: String,
    pub out_port: u16,
    /// Ticks per second, 0 for unpaced
    pub update_freq: u32,
    /// Local UDP port for vibrate/quit commands
    pub command_port: Option<u16>,
    pub devices: Vec<DeviceSpec>,
}

impl RelayParams {
    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Target tick period. Zero means tick as fast as possible.
    pub fn update_period(&self) -> Duration {
        if self.update_freq == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.update_freq
        }
    }

    /// Default parameter file location under the platform config directory
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(mut path) => {
                path.push(APP_DIR);
                path.push(DEFAULT_PARAMS_FILE);
                path
            }
            None => PathBuf::from(DEFAULT_PARAMS_FILE),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading parameters from {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let params = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };

        info!(
            "Loaded {} devices (bimanual: {}, {} Hz)",
            params.num_devices(),
            params.bimanual,
            params.update_freq
        );
        Ok(params)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawParams =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        raw.validate()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawParams =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        raw.validate()
    }
}

impl RawParams {
    fn validate(mut self) -> Result<RelayParams, ConfigError> {
        if self.num_devices <= 0 || self.num_devices > MAX_TRACKED_DEVICE_COUNT as i64 {
            return Err(ConfigError::InvalidDeviceCount(self.num_devices));
        }
        if self.bimanual && self.num_devices < 2 {
            return Err(ConfigError::BimanualNeedsTwoDevices);
        }

        let mut names = BTreeSet::new();
        let mut left_configured = false;
        let mut right_configured = false;
        let mut devices = Vec::with_capacity(self.num_devices as usize);

        for i in 0..self.num_devices {
            let entry = format!("dev{}", i);
            let value = self
                .entries
                .remove(&entry)
                .ok_or_else(|| ConfigError::MissingDevice(entry.clone()))?;
            let raw: RawDevice = serde_json::from_value(value)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", entry, e)))?;

            if !names.insert(raw.name.clone()) {
                return Err(ConfigError::DuplicateDeviceName(raw.name));
            }

            let role = DeviceRole::from_name(&raw.role);
            match role {
                DeviceRole::Left if left_configured => {
                    return Err(ConfigError::DuplicateHand(role));
                }
                DeviceRole::Left => left_configured = true,
                DeviceRole::Right if right_configured => {
                    return Err(ConfigError::DuplicateHand(role));
                }
                DeviceRole::Right => right_configured = true,
                DeviceRole::Tracker => {}
                DeviceRole::Invalid => {
                    return Err(ConfigError::InvalidRole {
                        device: raw.name,
                        role: raw.role,
                    });
                }
            }

            let device = raw.validate(role)?;
            debug!(
                "Configured {} as {} with {} buttons",
                device.name,
                device.role,
                device.buttons.len()
            );
            devices.push(device);
        }

        for key in self.entries.keys() {
            if key.starts_with("dev") {
                warn!("Ignoring {}: beyond _num_devices", key);
            } else {
                debug!("Ignoring unknown key {}", key);
            }
        }

        if self.bimanual && (!left_configured || !right_configured) {
            return Err(ConfigError::BimanualMissingHands);
        }

        Ok(RelayParams {
            bimanual: self.bimanual,
            out_addr: self.out_addr,
            out_port: self.out_port,
            update_freq: self.update_freq,
            command_port: self.cmd_port,
            devices,
        })
    }
}

impl RawDevice {
    fn validate(self, role: DeviceRole) -> Result<DeviceSpec, ConfigError> {
        let mut buttons: Vec<ButtonSpec> = Vec::with_capacity(self.buttons.len());

        for (key, raw) in self.buttons {
            let id = ButtonId::from_key(&key).ok_or_else(|| ConfigError::InvalidButtonId {
                device: self.name.clone(),
                key: key.clone(),
            })?;

            if buttons.iter().any(|b| b.name == raw.name) {
                return Err(ConfigError::DuplicateButtonName {
                    device: self.name.clone(),
                    name: raw.name,
                });
            }
            if RESERVED_BUTTON_NAMES.contains(&raw.name.as_str()) {
                return Err(ConfigError::ReservedButtonName {
                    device: self.name.clone(),
                    name: raw.name,
                });
            }

            let mut kinds = ValueKinds::NONE;
            for (kind_name, enabled) in &raw.types {
                let kind = ValueKind::from_name(kind_name).ok_or_else(|| {
                    ConfigError::InvalidValueType {
                        button: raw.name.clone(),
                        kind: kind_name.clone(),
                    }
                })?;
                if *enabled {
                    kinds.insert(kind);
                }
            }

            buttons.push(ButtonSpec {
                id,
                name: raw.name,
                kinds,
            });
        }

        if !role.is_hand() && !buttons.is_empty() {
            warn!(
                "Tracker {} declares {} buttons; trackers report no button data",
                self.name,
                buttons.len()
            );
            buttons.clear();
        }

        Ok(DeviceSpec {
            name: self.name,
            role,
            track_pose: self.track_pose,
            buttons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "_bimanual": true,
            "_num_devices": 3,
            "_out_addr": "127.0.0.1",
            "_out_port": 9000,
            "_update_freq": 120,
            "dev0": {
                "_name": "left_hand",
                "_role": "left",
                "_track_pose": true,
                "buttons": {
                    "AXIS1": {
                        "name": "trigger",
                        "types": { "boolean": true, "pressure": true, "2d": false }
                    },
                    "GRIP": { "name": "grip", "types": { "boolean": true } }
                }
            },
            "dev1": {
                "_name": "right_hand",
                "_role": "right",
                "_track_pose": true,
                "buttons": {
                    "AXIS0": { "name": "pad", "types": { "2d": true } }
                }
            },
            "dev2": { "_name": "waist", "_role": "tracker", "_track_pose": false }
        })
    }

    fn parse(value: serde_json::Value) -> Result<RelayParams, ConfigError> {
        RelayParams::from_json_str(&value.to_string())
    }

    #[test]
    fn parses_valid_file() {
        let params = parse(base()).unwrap();
        assert!(params.bimanual);
        assert_eq!(params.num_devices(), 3);
        assert_eq!(params.command_port, None);
        assert_eq!(params.update_period(), Duration::from_secs(1) / 120);

        let left = &params.devices[0];
        assert_eq!(left.role, DeviceRole::Left);
        let trigger = left.buttons.iter().find(|b| b.id == ButtonId::Axis1).unwrap();
        assert_eq!(trigger.name, "trigger");
        assert!(trigger.kinds.contains(ValueKind::Boolean));
        assert!(trigger.kinds.contains(ValueKind::Pressure));
        assert!(!trigger.kinds.contains(ValueKind::TwoD));

        let waist = &params.devices[2];
        assert_eq!(waist.role, DeviceRole::Tracker);
        assert!(!waist.track_pose);
        assert!(waist.buttons.is_empty());
    }

    #[test]
    fn zero_frequency_is_unpaced() {
        let mut value = base();
        value["_update_freq"] = json!(0);
        assert_eq!(parse(value).unwrap().update_period(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_device_counts() {
        for count in [0, -1, 65] {
            let mut value = base();
            value["_num_devices"] = json!(count);
            assert!(matches!(
                parse(value),
                Err(ConfigError::InvalidDeviceCount(c)) if c == count
            ));
        }

        let mut value = base();
        value["_num_devices"] = json!(1);
        assert!(matches!(parse(value), Err(ConfigError::BimanualNeedsTwoDevices)));
    }

    #[test]
    fn rejects_missing_device_entry() {
        let mut value = base();
        value["_num_devices"] = json!(4);
        assert!(matches!(parse(value), Err(ConfigError::MissingDevice(d)) if d == "dev3"));
    }

    #[test]
    fn rejects_duplicate_names_and_hands() {
        let mut value = base();
        value["dev2"]["_name"] = json!("left_hand");
        assert!(matches!(parse(value), Err(ConfigError::DuplicateDeviceName(_))));

        let mut value = base();
        value["dev2"]["_role"] = json!("right");
        assert!(matches!(
            parse(value),
            Err(ConfigError::DuplicateHand(DeviceRole::Right))
        ));

        let mut value = base();
        value["dev2"]["_role"] = json!("head");
        assert!(matches!(parse(value), Err(ConfigError::InvalidRole { .. })));
    }

    #[test]
    fn rejects_bad_buttons() {
        let mut value = base();
        value["dev1"]["buttons"]["TRIGGER"] = json!({ "name": "t", "types": {} });
        assert!(matches!(parse(value), Err(ConfigError::InvalidButtonId { .. })));

        let mut value = base();
        value["dev0"]["buttons"]["GRIP"]["name"] = json!("trigger");
        assert!(matches!(parse(value), Err(ConfigError::DuplicateButtonName { .. })));

        let mut value = base();
        value["dev0"]["buttons"]["GRIP"]["name"] = json!("pose");
        assert!(matches!(parse(value), Err(ConfigError::ReservedButtonName { .. })));

        let mut value = base();
        value["dev0"]["buttons"]["GRIP"]["types"]["analog"] = json!(true);
        assert!(matches!(
            parse(value),
            Err(ConfigError::InvalidValueType { kind, .. }) if kind == "analog"
        ));
    }

    #[test]
    fn bimanual_requires_both_hands() {
        let mut value = base();
        value["dev1"]["_role"] = json!("tracker");
        assert!(matches!(parse(value), Err(ConfigError::BimanualMissingHands)));

        let mut value = base();
        value["_bimanual"] = json!(false);
        value["dev1"]["_role"] = json!("tracker");
        let params = parse(value).unwrap();
        assert!(params.devices[1].buttons.is_empty());
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        assert!(matches!(
            RelayParams::from_json_str("{ \"_bimanual\": true"),
            Err(ConfigError::Parse(_))
        ));
        let mut value = base();
        value["_out_port"] = json!(70000);
        assert!(matches!(parse(value), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn ignores_unrelated_top_level_keys() {
        let mut value = base();
        value["_all_required"] = json!(true);
        value["comment"] = json!("written by the setup wizard");
        value["dev7"] = json!({ "_name": "spare" });
        let params = parse(value).unwrap();
        assert_eq!(params.num_devices(), 3);
    }

    #[test]
    fn malformed_device_entry_names_the_entry() {
        let mut value = base();
        value["dev1"] = json!(true);
        assert!(matches!(parse(value), Err(ConfigError::Parse(msg)) if msg.starts_with("dev1")));
    }

    #[test]
    fn reads_toml_layout() {
        let content = r#"
            _bimanual = false
            _num_devices = 1
            _out_addr = ""
            _out_port = 5005
            _update_freq = 60
            _cmd_port = 5006
            _all_required = true

            [dev0]
            _name = "right_hand"
            _role = "right"
            _track_pose = true

            [dev0.buttons.APP_MENU]
            name = "menu"
            types = { boolean = true }
        "#;
        let params = RelayParams::from_toml_str(content).unwrap();
        assert_eq!(params.command_port, Some(5006));
        assert_eq!(params.out_addr, "");
        assert_eq!(params.devices[0].buttons[0].id, ButtonId::AppMenu);
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let result = RelayParams::load("/nonexistent/vr-relay/params.json").await;
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
