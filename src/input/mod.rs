//! Input sampling
//!
//! Each tick the [`sampler::InputSampler`] walks the runtime's index space, matches
//! connected controllers and trackers to configured devices by role, and copies button
//! and pose data into the registry. [`pose`] holds the matrix to position/quaternion
//! conversion.

pub mod pose;
pub mod sampler;

pub use sampler::{InputSampler, SampleReport, SamplerStats};
