//! Integration test modules for setalight
//!
//! - session: transport and song-switch state machine
//! - pads: fades, crossfades and pad load failures
//! - settings: global settings, toggles and routing
//! - driver: threaded session driver

pub mod driver;
pub mod pads;
pub mod session;
pub mod settings;
