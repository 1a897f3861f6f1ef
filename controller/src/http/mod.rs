//! HTTP interface of the line controller.
//!
//! Defines routes for the dashboard and the device, error mapping and middleware.

pub mod api;
pub mod error;
pub mod m2m;
pub mod server;

pub(crate) use server::*;
