//! Inbound adapters: the administrative HTTP surface.

pub mod http;
