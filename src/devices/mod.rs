//! Configured logical devices and their lifecycle
//!
//! - [`device`] - roles, buttons, value kinds and poses
//! - [`registry`] - arena of devices split into inactive (by name) and active (by index)

pub mod device;
pub mod registry;

pub use device::{Button, ButtonId, Device, DeviceRole, Pose, ValueKind, ValueKinds};
pub use registry::{DeviceKey, DeviceRegistry, RegistryError};
