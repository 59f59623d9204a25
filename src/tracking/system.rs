use std::fmt;

/// Index of a device in the runtime's flat index space. Reused across reconnects.
pub type TrackedDeviceIndex = u32;

/// Size of the runtime's device index space
pub const MAX_TRACKED_DEVICE_COUNT: TrackedDeviceIndex = 64;

/// Number of analog axis slots reported per controller
pub const CONTROLLER_AXIS_COUNT: usize = 5;

/// Row-major 3x4 device-to-absolute transform (rotation | translation)
pub type Matrix34 = [[f32; 4]; 3];

pub const IDENTITY_MATRIX34: Matrix34 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
    DisplayRedirect,
}

/// Hand assignment the runtime gives a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Unassigned,
    LeftHand,
    RightHand,
}

/// Value of the per-axis type property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisType {
    None,
    TrackPad,
    Joystick,
    Trigger,
}

impl AxisType {
    /// Maps the raw integer property value. Unknown values read as `None`.
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => AxisType::TrackPad,
            2 => AxisType::Joystick,
            3 => AxisType::Trigger,
            _ => AxisType::None,
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            AxisType::None => 0,
            AxisType::TrackPad => 1,
            AxisType::Joystick => 2,
            AxisType::Trigger => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisReading {
    pub x: f32,
    pub y: f32,
}

impl AxisReading {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Raw controller input as reported by the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub buttons_pressed: u64,
    pub axes: [AxisReading; CONTROLLER_AXIS_COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    pub device_to_absolute: Matrix34,
    pub pose_is_valid: bool,
}

impl Default for TrackedPose {
    fn default() -> Self {
        Self {
            device_to_absolute: IDENTITY_MATRIX34,
            pose_is_valid: false,
        }
    }
}

/// Events drained from the runtime queue once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingEvent {
    DeviceActivated(TrackedDeviceIndex),
    DeviceDeactivated(TrackedDeviceIndex),
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Failed to initialize tracking runtime: {0}")]
    InitializationError(String),

    #[error("Device {index} has no value for property {property}")]
    PropertyUnavailable {
        index: TrackedDeviceIndex,
        property: String,
    },

    #[error("Invalid device index: {0}")]
    InvalidDevice(TrackedDeviceIndex),
}

/// Session with a tracking runtime.
///
/// All queries are cheap, synchronous reads of the runtime's current state. The relay
/// calls them from a single task and never concurrently.
pub trait TrackingSystem: fmt::Debug {
    fn is_device_connected(&self, index: TrackedDeviceIndex) -> bool;

    fn device_class(&self, index: TrackedDeviceIndex) -> DeviceClass;

    /// Hand role of a controller. Non-controllers report `Unassigned`.
    fn controller_role(&self, index: TrackedDeviceIndex) -> ControllerRole;

    /// Controller state together with the current standing-universe pose.
    /// `None` if the runtime could not read the device this frame.
    fn controller_state_with_pose(
        &self,
        index: TrackedDeviceIndex,
    ) -> Option<(ControllerState, TrackedPose)>;

    /// Type property of analog axis `axis` (0..CONTROLLER_AXIS_COUNT)
    fn axis_type(&self, index: TrackedDeviceIndex, axis: usize) -> Result<AxisType, TrackingError>;

    fn trigger_haptic_pulse(&mut self, index: TrackedDeviceIndex, axis: u32, duration_us: u16);

    fn poll_event(&mut self) -> Option<TrackingEvent>;

    /// Releases the runtime session. Called exactly once by the main cycle.
    fn shutdown(&mut self);
}
