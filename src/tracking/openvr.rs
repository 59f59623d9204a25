//! OpenVR runtime backed by the `openvr` bindings
//!
//! Only built with the `openvr` feature. Needs a running SteamVR (or another OpenVR
//! runtime) at startup.

use std::fmt;

use openvr::{
    property, ApplicationType, Context, Event, System, TrackedControllerRole,
    TrackedDeviceClass, TrackingUniverseOrigin,
};
use tracing::{debug, info, warn};

use super::system::{
    AxisReading, AxisType, ControllerRole, ControllerState, DeviceClass, TrackedDeviceIndex,
    TrackedPose, TrackingError, TrackingEvent, TrackingSystem, CONTROLLER_AXIS_COUNT,
};

const ORIGIN: TrackingUniverseOrigin = TrackingUniverseOrigin::Standing;

pub struct OpenVrSystem {
    // Dropping the context ends the session
    context: Option<Context>,
    system: System,
}

impl fmt::Debug for OpenVrSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenVrSystem")
            .field("session_open", &self.context.is_some())
            .finish()
    }
}

impl OpenVrSystem {
    /// Opens a background session with the OpenVR runtime
    pub fn connect() -> Result<Self, TrackingError> {
        // SAFETY: the context is the only live session and is dropped exactly once
        let context = unsafe { openvr::init(ApplicationType::Other) }
            .map_err(|e| TrackingError::InitializationError(e.to_string()))?;
        let system = context
            .system()
            .map_err(|e| TrackingError::InitializationError(e.to_string()))?;

        info!("Connected to OpenVR runtime");
        Ok(Self {
            context: Some(context),
            system,
        })
    }
}

impl TrackingSystem for OpenVrSystem {
    fn is_device_connected(&self, index: TrackedDeviceIndex) -> bool {
        self.system.is_tracked_device_connected(index)
    }

    fn device_class(&self, index: TrackedDeviceIndex) -> DeviceClass {
        match self.system.tracked_device_class(index) {
            TrackedDeviceClass::Invalid => DeviceClass::Invalid,
            TrackedDeviceClass::HMD => DeviceClass::Hmd,
            TrackedDeviceClass::Controller => DeviceClass::Controller,
            TrackedDeviceClass::GenericTracker => DeviceClass::GenericTracker,
            TrackedDeviceClass::TrackingReference => DeviceClass::TrackingReference,
            TrackedDeviceClass::DisplayRedirect => DeviceClass::DisplayRedirect,
        }
    }

    fn controller_role(&self, index: TrackedDeviceIndex) -> ControllerRole {
        match self.system.get_controller_role_for_tracked_device_index(index) {
            Some(TrackedControllerRole::LeftHand) => ControllerRole::LeftHand,
            Some(TrackedControllerRole::RightHand) => ControllerRole::RightHand,
            None => ControllerRole::Unassigned,
        }
    }

    fn controller_state_with_pose(
        &self,
        index: TrackedDeviceIndex,
    ) -> Option<(ControllerState, TrackedPose)> {
        let (state, pose) = self.system.controller_state_with_pose(ORIGIN, index)?;

        let mut axes = [AxisReading::default(); CONTROLLER_AXIS_COUNT];
        for (reading, raw) in axes.iter_mut().zip(state.rAxis.iter()) {
            *reading = AxisReading::new(raw.x, raw.y);
        }
        Some((
            ControllerState {
                buttons_pressed: state.ulButtonPressed,
                axes,
            },
            TrackedPose {
                device_to_absolute: *pose.device_to_absolute_tracking(),
                pose_is_valid: pose.pose_is_valid(),
            },
        ))
    }

    fn axis_type(&self, index: TrackedDeviceIndex, axis: usize) -> Result<AxisType, TrackingError> {
        if axis >= CONTROLLER_AXIS_COUNT {
            return Err(TrackingError::PropertyUnavailable {
                index,
                property: format!("Axis{}Type", axis),
            });
        }
        // Axis0Type..Axis4Type are consecutive property ids
        let id = property::Axis0Type_Int32 + axis as u32;
        self.system
            .int32_tracked_device_property(index, id)
            .map(AxisType::from_raw)
            .map_err(|e| TrackingError::PropertyUnavailable {
                index,
                property: format!("Axis{}Type ({})", axis, e),
            })
    }

    fn trigger_haptic_pulse(&mut self, index: TrackedDeviceIndex, axis: u32, duration_us: u16) {
        self.system.trigger_haptic_pulse(index, axis, duration_us);
    }

    fn poll_event(&mut self) -> Option<TrackingEvent> {
        while let Some((info, _)) = self.system.poll_next_event_with_pose(ORIGIN) {
            let index = info.tracked_device_index;
            match info.event {
                Event::TrackedDeviceActivated => return Some(TrackingEvent::DeviceActivated(index)),
                Event::TrackedDeviceDeactivated => {
                    return Some(TrackingEvent::DeviceDeactivated(index))
                }
                Event::Quit(_) => return Some(TrackingEvent::Quit),
                _ => continue,
            }
        }
        None
    }

    fn shutdown(&mut self) {
        match self.context.take() {
            Some(context) => {
                drop(context);
                debug!("OpenVR session closed");
            }
            None => warn!("OpenVR session already closed"),
        }
    }
}
