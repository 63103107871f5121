//! Port traits decoupling the application from external services.

pub mod outbound;
