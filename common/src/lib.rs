//! Wire types shared between the line controller service and the potting device firmware.
//!
//! This crate provides:
//! - Commands the controller pushes to the device, and their endpoint paths
//! - Payloads the device reports back (heartbeats)

mod protocol;

pub use protocol::*;

/// Default port of the controller's HTTP API.
pub const DEFAULT_CONTROLLER_PORT: u16 = 5001;
