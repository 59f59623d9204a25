//! In-memory tracking runtime
//!
//! Holds a sparse map of simulated devices in the runtime index space. Tests attach,
//! move and detach devices between ticks to reproduce reconnects, role changes and
//! invalid poses. [`SimulatedSystem::demo`] builds a headset, two controllers and a
//! tracker that move on circular paths and cycle their analog inputs over time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use glam::{Quat, Vec3};
use tracing::{debug, info};

use super::system::{
    AxisReading, AxisType, ControllerRole, ControllerState, DeviceClass, Matrix34,
    TrackedDeviceIndex, TrackedPose, TrackingError, TrackingEvent, TrackingSystem,
    CONTROLLER_AXIS_COUNT, IDENTITY_MATRIX34,
};
use crate::devices::ButtonId;
use crate::input::pose::matrix_from_pose;

/// Circular path used by the demo animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    pub center: Vec3,
    pub radius: f32,
    /// Radians per second
    pub angular_speed: f32,
    pub phase: f32,
}

impl Orbit {
    fn matrix_at(&self, t: f32) -> Matrix34 {
        let angle = self.phase + self.angular_speed * t;
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * self.radius;
        // Device faces along its direction of travel
        let orientation = Quat::from_rotation_y(-angle);
        matrix_from_pose(self.center + offset, orientation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub class: DeviceClass,
    pub role: ControllerRole,
    pub connected: bool,
    pub state: ControllerState,
    pub pose: TrackedPose,
    /// Raw axis type properties, `None` where the runtime has no value
    pub axis_types: [Option<i32>; CONTROLLER_AXIS_COUNT],
    pub orbit: Option<Orbit>,
}

impl SimulatedDevice {
    fn with_class(class: DeviceClass, role: ControllerRole) -> Self {
        Self {
            class,
            role,
            connected: true,
            state: ControllerState::default(),
            pose: TrackedPose {
                device_to_absolute: IDENTITY_MATRIX34,
                pose_is_valid: true,
            },
            axis_types: [Some(AxisType::None.raw()); CONTROLLER_AXIS_COUNT],
            orbit: None,
        }
    }

    pub fn controller(role: ControllerRole) -> Self {
        Self::with_class(DeviceClass::Controller, role)
    }

    pub fn tracker() -> Self {
        Self::with_class(DeviceClass::GenericTracker, ControllerRole::Unassigned)
    }

    pub fn hmd() -> Self {
        Self::with_class(DeviceClass::Hmd, ControllerRole::Unassigned)
    }

    pub fn with_axis_type(mut self, axis: usize, axis_type: AxisType) -> Self {
        self.axis_types[axis] = Some(axis_type.raw());
        self
    }

    pub fn with_pose(mut self, matrix: Matrix34) -> Self {
        self.pose.device_to_absolute = matrix;
        self.pose.pose_is_valid = true;
        self
    }

    pub fn with_orbit(mut self, orbit: Orbit) -> Self {
        self.orbit = Some(orbit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HapticPulse {
    pub index: TrackedDeviceIndex,
    pub axis: u32,
    pub duration_us: u16,
}

#[derive(Debug, Default)]
pub struct SimulatedSystem {
    devices: BTreeMap<TrackedDeviceIndex, SimulatedDevice>,
    events: VecDeque<TrackingEvent>,
    haptic_pulses: Arc<Mutex<Vec<HapticPulse>>>,
    shutdown_count: Arc<AtomicUsize>,
    // Animation clock, only set for the demo runtime
    started: Option<Instant>,
}

impl SimulatedSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headset at 0, left and right controllers at 1 and 2, one tracker at 3.
    /// Controllers expose a trackpad on axis 0 and a trigger on axis 1.
    pub fn demo() -> Self {
        let mut system = Self::new();
        let hand_orbit = |phase: f32| Orbit {
            center: Vec3::new(0.0, 1.2, 0.0),
            radius: 0.4,
            angular_speed: 0.8,
            phase,
        };

        system.attach(0, SimulatedDevice::hmd().with_pose(matrix_from_pose(
            Vec3::new(0.0, 1.7, 0.0),
            Quat::IDENTITY,
        )));
        for (index, role, phase) in [
            (1, ControllerRole::LeftHand, std::f32::consts::PI),
            (2, ControllerRole::RightHand, 0.0),
        ] {
            system.attach(
                index,
                SimulatedDevice::controller(role)
                    .with_axis_type(0, AxisType::TrackPad)
                    .with_axis_type(1, AxisType::Trigger)
                    .with_orbit(hand_orbit(phase)),
            );
        }
        system.attach(
            3,
            SimulatedDevice::tracker().with_orbit(Orbit {
                center: Vec3::new(0.0, 1.0, 0.0),
                radius: 0.1,
                angular_speed: 0.3,
                phase: 0.0,
            }),
        );

        system.started = Some(Instant::now());
        info!("Simulated tracking runtime ready with {} devices", system.devices.len());
        system
    }

    /// Connects `device` at `index`, replacing whatever was there
    pub fn attach(&mut self, index: TrackedDeviceIndex, device: SimulatedDevice) -> &mut Self {
        debug!("Simulated device {:?} attached at index {}", device.class, index);
        self.devices.insert(index, device);
        self.events.push_back(TrackingEvent::DeviceActivated(index));
        self
    }

    pub fn detach(&mut self, index: TrackedDeviceIndex) -> Option<SimulatedDevice> {
        let device = self.devices.remove(&index);
        if device.is_some() {
            debug!("Simulated device detached from index {}", index);
            self.events.push_back(TrackingEvent::DeviceDeactivated(index));
        }
        device
    }

    /// Reconnects the device at `from` under a new index
    pub fn move_device(&mut self, from: TrackedDeviceIndex, to: TrackedDeviceIndex) -> bool {
        match self.detach(from) {
            Some(device) => {
                self.attach(to, device);
                true
            }
            None => false,
        }
    }

    pub fn set_pose(&mut self, index: TrackedDeviceIndex, matrix: Matrix34) {
        if let Some(device) = self.devices.get_mut(&index) {
            device.pose.device_to_absolute = matrix;
            device.pose.pose_is_valid = true;
        }
    }

    pub fn set_pose_valid(&mut self, index: TrackedDeviceIndex, valid: bool) {
        if let Some(device) = self.devices.get_mut(&index) {
            device.pose.pose_is_valid = valid;
        }
    }

    pub fn set_pressed(&mut self, index: TrackedDeviceIndex, button: ButtonId, pressed: bool) {
        if let Some(device) = self.devices.get_mut(&index) {
            if pressed {
                device.state.buttons_pressed |= button.mask();
            } else {
                device.state.buttons_pressed &= !button.mask();
            }
        }
    }

    pub fn set_axis(&mut self, index: TrackedDeviceIndex, axis: usize, reading: AxisReading) {
        if let Some(device) = self.devices.get_mut(&index) {
            device.state.axes[axis] = reading;
        }
    }

    pub fn push_event(&mut self, event: TrackingEvent) {
        self.events.push_back(event);
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn haptic_pulses(&self) -> Vec<HapticPulse> {
        self.haptic_pulses
            .lock()
            .map(|pulses| pulses.clone())
            .unwrap_or_default()
    }

    /// Shared log of haptic pulses, readable after the system was handed off
    pub fn haptic_log(&self) -> Arc<Mutex<Vec<HapticPulse>>> {
        self.haptic_pulses.clone()
    }

    /// Shared counter of `shutdown` calls, readable after the system was handed off
    pub fn shutdown_counter(&self) -> Arc<AtomicUsize> {
        self.shutdown_count.clone()
    }

    fn animate(&self, device: &SimulatedDevice) -> (ControllerState, TrackedPose) {
        let (Some(started), Some(orbit)) = (self.started, device.orbit) else {
            return (device.state, device.pose);
        };
        let t = started.elapsed().as_secs_f32();

        let mut pose = device.pose;
        pose.device_to_absolute = orbit.matrix_at(t);

        let mut state = device.state;
        if device.class == DeviceClass::Controller {
            let wave = (t * 1.5 + orbit.phase).sin();
            state.axes[0] = AxisReading::new(0.5 * (t + orbit.phase).cos(), 0.5 * wave);
            state.axes[1] = AxisReading::new((wave + 1.0) / 2.0, 0.0);
            let mut pressed = 0;
            if wave > 0.8 {
                pressed |= ButtonId::Axis1.mask();
            }
            if (t + orbit.phase).rem_euclid(4.0) < 1.0 {
                pressed |= ButtonId::Grip.mask();
            }
            state.buttons_pressed = pressed;
        }

        (state, pose)
    }
}

impl TrackingSystem for SimulatedSystem {
    fn is_device_connected(&self, index: TrackedDeviceIndex) -> bool {
        self.devices
            .get(&index)
            .map(|device| device.connected)
            .unwrap_or(false)
    }

    fn device_class(&self, index: TrackedDeviceIndex) -> DeviceClass {
        self.devices
            .get(&index)
            .map(|device| device.class)
            .unwrap_or(DeviceClass::Invalid)
    }

    fn controller_role(&self, index: TrackedDeviceIndex) -> ControllerRole {
        match self.devices.get(&index) {
            Some(device) if device.class == DeviceClass::Controller => device.role,
            _ => ControllerRole::Unassigned,
        }
    }

    fn controller_state_with_pose(
        &self,
        index: TrackedDeviceIndex,
    ) -> Option<(ControllerState, TrackedPose)> {
        let device = self.devices.get(&index)?;
        if !device.connected {
            return None;
        }
        Some(self.animate(device))
    }

    fn axis_type(&self, index: TrackedDeviceIndex, axis: usize) -> Result<AxisType, TrackingError> {
        let device = self
            .devices
            .get(&index)
            .ok_or(TrackingError::InvalidDevice(index))?;
        device
            .axis_types
            .get(axis)
            .copied()
            .flatten()
            .map(AxisType::from_raw)
            .ok_or_else(|| TrackingError::PropertyUnavailable {
                index,
                property: format!("Axis{}Type", axis),
            })
    }

    fn trigger_haptic_pulse(&mut self, index: TrackedDeviceIndex, axis: u32, duration_us: u16) {
        debug!(
            "Haptic pulse on device {} axis {} for {}us",
            index, axis, duration_us
        );
        if let Ok(mut pulses) = self.haptic_pulses.lock() {
            pulses.push(HapticPulse {
                index,
                axis,
                duration_us,
            });
        }
    }

    fn poll_event(&mut self) -> Option<TrackingEvent> {
        self.events.pop_front()
    }

    fn shutdown(&mut self) {
        let calls = self.shutdown_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Simulated tracking runtime shut down (call {})", calls);
        self.devices.clear();
        self.events.clear();
    }
}
