//! Optional runtime command channel (`quit`, `vibrate`) on a loopback UDP port

pub mod command_listener;

pub use command_listener::{CommandError, CommandListener, RelayCommand};
