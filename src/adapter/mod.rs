//! Adapters binding the ports to real services.

pub mod inbound;
pub mod outbound;
