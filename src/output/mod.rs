//! State publication
//!
//! - [`message`] - serde model of the per-tick frame
//! - [`publisher`] - suppression policy and UDP transport
//!
//! Transport is fire-and-forget: one datagram per tick, failures are logged and the tick
//! moves on.

pub mod message;
pub mod publisher;

pub use message::{frame_from_registry, FrameMessage};
pub use publisher::{PublishOutcome, PublisherError, PublisherStats, StatePublisher, Suppression};
