//! Betting exchange adapter.
//!
//! Implements the [`ExchangeApi`](crate::port::outbound::exchange::ExchangeApi)
//! port against the exchange's partner REST API: token auth with automatic
//! refresh, market trees, wager placement and cancellation, and paginated
//! wager histories.

mod auth;
mod client;
mod dto;

pub use auth::AuthManager;
pub use client::ExchangeClient;
