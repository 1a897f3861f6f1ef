mod config_watcher;
pub mod controller;
pub mod db;
mod device;
pub mod liveness;
pub mod model;
mod runtime;
mod startup;
mod state;

// Re-export a curated crate-visible surface for consumers of `crate::app`
pub(crate) use startup::start;
pub(crate) use state::{AppState, ConfigRx, WsTx};

pub use controller::{Conflict, ControlError};
pub use liveness::{DeviceState, LivenessReport};
