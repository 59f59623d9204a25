use thiserror::Error;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::devices::RegistryError;
use crate::output::PublisherError;
use crate::tracking::TrackingError;

/// Startup failures. Once the cycle is running nothing is fatal.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Tracking runtime error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),

    #[error("Command channel error: {0}")]
    Command(#[from] CommandError),
}
