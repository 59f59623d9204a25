//! Tracking runtime abstraction
//!
//! The relay never talks to tracking hardware directly. Everything it needs from the
//! runtime (connection state, device class, hand role, controller state with pose,
//! axis properties, haptics and the event queue) goes through [`system::TrackingSystem`].
//!
//! ```text
//! Hardware runtime ──► TrackingSystem ──► InputSampler ──► DeviceRegistry
//!                       (index space)     (per tick)       (stable names)
//! ```
//!
//! [`simulated::SimulatedSystem`] is a scriptable in-memory runtime. Tests drive it
//! device by device, and the binary uses its animated demo setup. With the `openvr`
//! feature, `openvr::OpenVrSystem` talks to SteamVR. [`runtime::open_runtime`] picks one.

#[cfg(feature = "openvr")]
pub mod openvr;
pub mod runtime;
pub mod simulated;
pub mod system;

#[cfg(feature = "openvr")]
pub use self::openvr::OpenVrSystem;
pub use runtime::{open_runtime, RuntimeKind};
pub use simulated::{HapticPulse, Orbit, SimulatedDevice, SimulatedSystem};
pub use system::{
    AxisReading, AxisType, ControllerRole, ControllerState, DeviceClass, Matrix34,
    TrackedDeviceIndex, TrackedPose, TrackingError, TrackingEvent, TrackingSystem,
    CONTROLLER_AXIS_COUNT, IDENTITY_MATRIX34, MAX_TRACKED_DEVICE_COUNT,
};
