use tracing::info;

use super::simulated::SimulatedSystem;
use super::system::{TrackingError, TrackingSystem};

/// Which tracking runtime the relay reads from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RuntimeKind {
    /// Animated in-memory headset, hands and tracker
    #[default]
    Demo,
    /// SteamVR or another OpenVR runtime
    #[value(name = "openvr")]
    OpenVr,
}

pub fn open_runtime(kind: RuntimeKind) -> Result<Box<dyn TrackingSystem>, TrackingError> {
    info!("Opening {:?} tracking runtime", kind);
    match kind {
        RuntimeKind::Demo => Ok(Box::new(SimulatedSystem::demo())),
        RuntimeKind::OpenVr => open_openvr(),
    }
}

#[cfg(feature = "openvr")]
fn open_openvr() -> Result<Box<dyn TrackingSystem>, TrackingError> {
    Ok(Box::new(super::openvr::OpenVrSystem::connect()?))
}

#[cfg(not(feature = "openvr"))]
fn open_openvr() -> Result<Box<dyn TrackingSystem>, TrackingError> {
    Err(TrackingError::InitializationError(
        "built without the openvr feature".to_string(),
    ))
}
