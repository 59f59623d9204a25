//! Device registry
//!
//! All configured devices live in one arena. Two index maps record each device's
//! lifecycle state:
//!
//! ```text
//! inactive: name  ──► DeviceKey      (stable for the process lifetime)
//! active:   index ──► DeviceKey      (volatile, rebuilt every tick)
//! ```
//!
//! Every key is in exactly one of the two maps. Both maps are ordered, so role lookups
//! scan inactive devices by ascending name and active devices by ascending index.

use std::collections::BTreeMap;

use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};

use super::device::{Device, DeviceRole};
use crate::config::RelayParams;
use crate::tracking::TrackedDeviceIndex;

new_key_type! {
    pub struct DeviceKey;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Device name already registered: {0}")]
    DuplicateName(String),
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: SlotMap<DeviceKey, Device>,
    inactive: BTreeMap<String, DeviceKey>,
    active: BTreeMap<TrackedDeviceIndex, DeviceKey>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every configured device as inactive
    pub fn from_params(params: &RelayParams) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in &params.devices {
            registry.insert(Device::from(spec))?;
        }
        debug!("Registry created with {} devices", registry.len());
        Ok(registry)
    }

    /// Adds a new device to the inactive collection
    pub fn insert(&mut self, device: Device) -> Result<DeviceKey, RegistryError> {
        if self.key_by_name(&device.name).is_some() {
            return Err(RegistryError::DuplicateName(device.name));
        }
        let name = device.name.clone();
        let key = self.devices.insert(device);
        self.inactive.insert(name, key);
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn get(&self, key: DeviceKey) -> Option<&Device> {
        self.devices.get(key)
    }

    pub fn get_mut(&mut self, key: DeviceKey) -> Option<&mut Device> {
        self.devices.get_mut(key)
    }

    pub fn key_by_name(&self, name: &str) -> Option<DeviceKey> {
        self.devices
            .iter()
            .find(|(_, device)| device.name == name)
            .map(|(key, _)| key)
    }

    /// Key of the device active at `index` this tick
    pub fn key_at(&self, index: TrackedDeviceIndex) -> Option<DeviceKey> {
        self.active.get(&index).copied()
    }

    /// Hardware index the named device is active under, if it is active
    pub fn active_index_of(&self, name: &str) -> Option<TrackedDeviceIndex> {
        self.active
            .iter()
            .find(|(_, key)| self.devices[**key].name == name)
            .map(|(index, _)| *index)
    }

    /// Active devices in ascending index order
    pub fn active(&self) -> impl Iterator<Item = (TrackedDeviceIndex, &Device)> + '_ {
        self.active
            .iter()
            .map(|(index, key)| (*index, &self.devices[*key]))
    }

    /// Inactive devices in ascending name order
    pub fn inactive(&self) -> impl Iterator<Item = &Device> + '_ {
        self.inactive.values().map(|key| &self.devices[*key])
    }

    /// First device with `role` in the requested collection
    pub fn find_by_role(&self, role: DeviceRole, from_active: bool) -> Option<DeviceKey> {
        let matches = |key: &&DeviceKey| self.devices[**key].role == role;
        if from_active {
            self.active.values().find(matches).copied()
        } else {
            self.inactive.values().find(matches).copied()
        }
    }

    /// Moves `device` from inactive to active under `index`.
    ///
    /// No-op when `device` is `None`, when `index` is already taken this tick, or when the
    /// device isn't inactive. Returns whether the device moved.
    pub fn activate(&mut self, device: Option<DeviceKey>, index: TrackedDeviceIndex) -> bool {
        let Some(key) = device else {
            return false;
        };
        if self.active.contains_key(&index) {
            trace!("Index {} already active, skipping activation", index);
            return false;
        }
        let Some(device) = self.devices.get(key) else {
            return false;
        };
        if self.inactive.remove(&device.name).is_none() {
            return false;
        }

        debug!("Activated {} ({}) at index {}", device.name, device.role, index);
        self.active.insert(index, key);
        true
    }

    /// Moves the device at `index` back to the inactive collection
    pub fn deactivate(&mut self, index: TrackedDeviceIndex) -> bool {
        let Some(key) = self.active.remove(&index) else {
            return false;
        };
        let device = &self.devices[key];
        trace!("Deactivated {} from index {}", device.name, index);
        self.inactive.insert(device.name.clone(), key);
        true
    }

    /// Deactivates every active device. Runs at the start of each tick.
    pub fn reset_all_to_inactive(&mut self) {
        let indices: Vec<TrackedDeviceIndex> = self.active.keys().copied().collect();
        for index in indices {
            self.deactivate(index);
        }
    }

    pub fn role_found(&self, role: DeviceRole) -> bool {
        self.find_by_role(role, true).is_some()
    }

    pub fn left_found(&self) -> bool {
        self.role_found(DeviceRole::Left)
    }

    pub fn right_found(&self) -> bool {
        self.role_found(DeviceRole::Right)
    }
}
