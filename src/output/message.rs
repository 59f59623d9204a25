//! Wire layout of one published frame
//!
//! ```text
//! {
//!    "<device name>": {
//!       "role": "left",
//!       "pose": { "position": {x,y,z}, "orientation": {x,y,z,w} },
//!       "<button name>": { "boolean": .., "pressure": .., "2d": {x,y} }
//!    }
//! }
//! ```
//!
//! Buttons only appear with the kinds they have enabled, and not at all when none are.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::devices::{Button, Device, DeviceRegistry, ValueKind};

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Vec2Message {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PositionMessage {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct OrientationMessage {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseMessage {
    pub position: PositionMessage,
    pub orientation: OrientationMessage,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ButtonMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(rename = "2d", skip_serializing_if = "Option::is_none")]
    pub two_d: Option<Vec2Message>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeviceMessage<'a> {
    pub role: &'static str,
    pub pose: PoseMessage,
    #[serde(flatten)]
    pub buttons: BTreeMap<&'a str, ButtonMessage>,
}

/// One frame, keyed by device name
pub type FrameMessage<'a> = BTreeMap<&'a str, DeviceMessage<'a>>;

impl From<&Button> for ButtonMessage {
    fn from(button: &Button) -> Self {
        let mut message = ButtonMessage::default();
        for kind in button.kinds.iter() {
            match kind {
                ValueKind::Boolean => message.boolean = Some(button.pressed),
                ValueKind::Pressure => message.pressure = Some(button.pressure),
                ValueKind::TwoD => {
                    message.two_d = Some(Vec2Message {
                        x: button.touch_pos.x,
                        y: button.touch_pos.y,
                    })
                }
            }
        }
        message
    }
}

impl<'a> From<&'a Device> for DeviceMessage<'a> {
    fn from(device: &'a Device) -> Self {
        let pose = &device.pose;
        Self {
            role: device.role.as_str(),
            pose: PoseMessage {
                position: PositionMessage {
                    x: pose.position.x,
                    y: pose.position.y,
                    z: pose.position.z,
                },
                orientation: OrientationMessage {
                    x: pose.orientation.x,
                    y: pose.orientation.y,
                    z: pose.orientation.z,
                    w: pose.orientation.w,
                },
            },
            buttons: device
                .buttons
                .values()
                .filter(|button| !button.kinds.is_empty())
                .map(|button| (button.name.as_str(), ButtonMessage::from(button)))
                .collect(),
        }
    }
}

/// Frame for every currently active device
pub fn frame_from_registry(registry: &DeviceRegistry) -> FrameMessage<'_> {
    registry
        .active()
        .map(|(_, device)| (device.name.as_str(), DeviceMessage::from(device)))
        .collect()
}
