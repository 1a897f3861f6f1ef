//! HTTP server wiring: router and middleware.

pub mod middleware;
pub mod router;
