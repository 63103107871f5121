//! Reference odds feed adapter.
//!
//! Talks to an odds-aggregator REST API and reduces each event to the
//! single configured sharp bookmaker's markets.

mod client;
mod dto;

pub use client::OddsApiClient;
