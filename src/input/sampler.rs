use glam::Vec2;
use tracing::{debug, trace};

use super::pose::pose_from_matrix;
use crate::devices::{Button, DeviceKey, DeviceRegistry, DeviceRole};
use crate::tracking::{
    AxisReading, AxisType, ControllerRole, ControllerState, DeviceClass, TrackedDeviceIndex,
    TrackingSystem, MAX_TRACKED_DEVICE_COUNT,
};

/// What one sampling pass saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Connected controllers and trackers
    pub candidates: usize,
    /// Candidates matched to a configured device
    pub matched: usize,
    /// Candidates with no configured device left for their role
    pub unmatched: usize,
    /// Matched devices whose pose could not be read this tick
    pub invalid_poses: usize,
}

/// Lifetime totals across all passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub passes: u64,
    pub unmatched: u64,
    pub invalid_poses: u64,
}

/// Rebuilds the active device set and refreshes device state every tick
#[derive(Debug, Default)]
pub struct InputSampler {
    stats: SamplerStats,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// One sampling pass over the whole runtime index space.
    ///
    /// Resets the registry first, so a device that moved to another index is found
    /// under the new one and a disconnected device ends up inactive.
    pub fn sample(
        &mut self,
        system: &dyn TrackingSystem,
        registry: &mut DeviceRegistry,
    ) -> SampleReport {
        registry.reset_all_to_inactive();

        let mut report = SampleReport::default();
        for index in 0..MAX_TRACKED_DEVICE_COUNT {
            if !system.is_device_connected(index) {
                continue;
            }
            let Some(wanted) = role_for_index(system, index) else {
                continue;
            };
            report.candidates += 1;

            let Some(key) = activate_for_role(registry, wanted, index) else {
                report.unmatched += 1;
                continue;
            };
            report.matched += 1;

            if !update_device(system, registry, key, index) {
                report.invalid_poses += 1;
            }
        }

        self.stats.passes += 1;
        self.stats.unmatched += report.unmatched as u64;
        self.stats.invalid_poses += report.invalid_poses as u64;
        trace!("Sample pass: {:?}", report);
        report
    }
}

/// Configured role that may claim the device at `index`.
/// `None` for classes the relay ignores and for controllers without a hand.
fn role_for_index(system: &dyn TrackingSystem, index: TrackedDeviceIndex) -> Option<DeviceRole> {
    match system.device_class(index) {
        DeviceClass::Controller => match system.controller_role(index) {
            ControllerRole::LeftHand => Some(DeviceRole::Left),
            ControllerRole::RightHand => Some(DeviceRole::Right),
            ControllerRole::Unassigned => {
                trace!("Controller at index {} has no hand assigned", index);
                None
            }
        },
        DeviceClass::GenericTracker => Some(DeviceRole::Tracker),
        _ => None,
    }
}

fn activate_for_role(
    registry: &mut DeviceRegistry,
    role: DeviceRole,
    index: TrackedDeviceIndex,
) -> Option<DeviceKey> {
    let candidate = registry.find_by_role(role, false);
    registry.activate(candidate, index);
    registry.key_at(index)
}

/// Reads buttons and pose for an active device. Returns false if the runtime had no
/// valid pose, in which case the device keeps its previous state.
fn update_device(
    system: &dyn TrackingSystem,
    registry: &mut DeviceRegistry,
    key: DeviceKey,
    index: TrackedDeviceIndex,
) -> bool {
    let Some((state, tracked)) = system.controller_state_with_pose(index) else {
        debug!("No state for device at index {}", index);
        return false;
    };
    if !tracked.pose_is_valid {
        trace!("Invalid pose at index {}, keeping previous pose", index);
        return false;
    }
    let Some(device) = registry.get_mut(key) else {
        return false;
    };

    if device.role.is_hand() {
        for button in device.buttons.values_mut() {
            read_button(system, index, &state, button);
        }
    }
    if device.track_pose {
        device.pose = pose_from_matrix(&tracked.device_to_absolute);
    }
    true
}

fn read_button(
    system: &dyn TrackingSystem,
    index: TrackedDeviceIndex,
    state: &ControllerState,
    button: &mut Button,
) {
    button.pressed = state.buttons_pressed & button.id.mask() != 0;

    let Some(axis) = button.id.axis() else {
        return;
    };
    match system.axis_type(index, axis) {
        Ok(axis_type) => apply_axis(button, axis_type, state.axes[axis]),
        Err(e) => debug!("Skipping analog data for {}: {}", button.name, e),
    }
}

/// Stores the analog part of a reading according to the axis type
pub fn apply_axis(button: &mut Button, axis_type: AxisType, reading: AxisReading) {
    match axis_type {
        AxisType::TrackPad | AxisType::Joystick => {
            button.touch_pos = Vec2::new(reading.x, reading.y);
        }
        AxisType::Trigger => {
            button.pressure = reading.x;
        }
        AxisType::None => {}
    }
}
