//! Administrative HTTP surface.
//!
//! Read-mostly projections of scheduler state plus a handful of control
//! endpoints (manual overrides, start/stop, runtime config updates). These
//! handlers never place or cancel wagers; all trading flows through the
//! line controller.

mod routes;

pub use routes::{router, serve, AdminContext};
