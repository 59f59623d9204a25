use std::collections::BTreeMap;
use std::fmt;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{ButtonSpec, DeviceSpec};

/// Logical role a configured device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Left,
    Right,
    Tracker,
    Invalid,
}

impl DeviceRole {
    pub fn from_name(name: &str) -> Self {
        match name {
            "left" => DeviceRole::Left,
            "right" => DeviceRole::Right,
            "tracker" => DeviceRole::Tracker,
            _ => DeviceRole::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Left => "left",
            DeviceRole::Right => "right",
            DeviceRole::Tracker => "tracker",
            DeviceRole::Invalid => "invalid",
        }
    }

    /// Left and right devices carry buttons, trackers don't
    pub fn is_hand(&self) -> bool {
        matches!(self, DeviceRole::Left | DeviceRole::Right)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of buttons a hand device can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ButtonId {
    #[serde(rename = "APP_MENU")]
    AppMenu,
    #[serde(rename = "GRIP")]
    Grip,
    #[serde(rename = "AXIS0")]
    Axis0,
    #[serde(rename = "AXIS1")]
    Axis1,
    #[serde(rename = "AXIS2")]
    Axis2,
    #[serde(rename = "AXIS3")]
    Axis3,
    #[serde(rename = "AXIS4")]
    Axis4,
}

impl ButtonId {
    pub const ALL: [ButtonId; 7] = [
        ButtonId::AppMenu,
        ButtonId::Grip,
        ButtonId::Axis0,
        ButtonId::Axis1,
        ButtonId::Axis2,
        ButtonId::Axis3,
        ButtonId::Axis4,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ButtonId::AppMenu => "APP_MENU",
            ButtonId::Grip => "GRIP",
            ButtonId::Axis0 => "AXIS0",
            ButtonId::Axis1 => "AXIS1",
            ButtonId::Axis2 => "AXIS2",
            ButtonId::Axis3 => "AXIS3",
            ButtonId::Axis4 => "AXIS4",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }

    /// Bit position of this button in the runtime's pressed/touched masks
    pub fn runtime_bit(&self) -> u32 {
        match self {
            ButtonId::AppMenu => 1,
            ButtonId::Grip => 2,
            ButtonId::Axis0 => 32,
            ButtonId::Axis1 => 33,
            ButtonId::Axis2 => 34,
            ButtonId::Axis3 => 35,
            ButtonId::Axis4 => 36,
        }
    }

    pub fn mask(&self) -> u64 {
        1u64 << self.runtime_bit()
    }

    /// Analog axis slot backing this button, if any
    pub fn axis(&self) -> Option<usize> {
        match self {
            ButtonId::Axis0 => Some(0),
            ButtonId::Axis1 => Some(1),
            ButtonId::Axis2 => Some(2),
            ButtonId::Axis3 => Some(3),
            ButtonId::Axis4 => Some(4),
            ButtonId::AppMenu | ButtonId::Grip => None,
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Kind of value a button publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Pressure,
    TwoD,
}

impl ValueKind {
    pub const ALL: [ValueKind; 3] = [ValueKind::Boolean, ValueKind::Pressure, ValueKind::TwoD];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(ValueKind::Boolean),
            "pressure" => Some(ValueKind::Pressure),
            "2d" => Some(ValueKind::TwoD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Pressure => "pressure",
            ValueKind::TwoD => "2d",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            ValueKind::Boolean => 0b001,
            ValueKind::Pressure => 0b010,
            ValueKind::TwoD => 0b100,
        }
    }
}

/// Set of enabled [`ValueKind`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ValueKinds(u8);

impl ValueKinds {
    pub const NONE: ValueKinds = ValueKinds(0);

    pub fn insert(&mut self, kind: ValueKind) {
        self.0 |= kind.bit();
    }

    pub fn with(mut self, kind: ValueKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn contains(&self, kind: ValueKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueKind> + '_ {
        ValueKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl FromIterator<ValueKind> for ValueKinds {
    fn from_iter<I: IntoIterator<Item = ValueKind>>(iter: I) -> Self {
        let mut kinds = ValueKinds::NONE;
        for kind in iter {
            kinds.insert(kind);
        }
        kinds
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub id: ButtonId,
    pub name: String,
    pub pressed: bool,
    /// Only meaningful with [`ValueKind::Pressure`] enabled
    pub pressure: f32,
    /// Only meaningful with [`ValueKind::TwoD`] enabled
    pub touch_pos: Vec2,
    pub kinds: ValueKinds,
}

impl Button {
    pub fn new(id: ButtonId, name: impl Into<String>, kinds: ValueKinds) -> Self {
        Self {
            id,
            name: name.into(),
            pressed: false,
            pressure: 0.0,
            touch_pos: Vec2::ZERO,
            kinds,
        }
    }
}

impl From<&ButtonSpec> for Button {
    fn from(spec: &ButtonSpec) -> Self {
        Button::new(spec.id, spec.name.clone(), spec.kinds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    /// Unit quaternion once sampled, all zero before
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        }
    }
}

/// Configured logical device and its last sampled state
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub role: DeviceRole,
    pub track_pose: bool,
    pub pose: Pose,
    pub buttons: BTreeMap<ButtonId, Button>,
}

impl Device {
    pub fn new(name: impl Into<String>, role: DeviceRole, track_pose: bool) -> Self {
        Self {
            name: name.into(),
            role,
            track_pose,
            pose: Pose::default(),
            buttons: BTreeMap::new(),
        }
    }

    /// Adds a button. Ignored for devices that aren't hands.
    pub fn with_button(mut self, button: Button) -> Self {
        if self.role.is_hand() {
            self.buttons.insert(button.id, button);
        }
        self
    }
}

impl From<&DeviceSpec> for Device {
    fn from(spec: &DeviceSpec) -> Self {
        spec.buttons.iter().fold(
            Device::new(spec.name.clone(), spec.role, spec.track_pose),
            |device, button| device.with_button(Button::from(button)),
        )
    }
}
