//! Outbound ports: the reference odds feed and the betting exchange.

pub mod exchange;
pub mod feed;
