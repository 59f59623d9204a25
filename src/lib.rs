pub mod command;
pub mod config;
pub mod devices;
pub mod input;
pub mod output;
pub mod relay;
pub mod tracking;
