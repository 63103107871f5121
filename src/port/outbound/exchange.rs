//! Betting exchange port.
//!
//! Defines the abstract operations the core depends on. "Not found" is a
//! value here, not an error: a missing wager on an individual lookup is
//! evidence of settlement and drives a state transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::event::{ExchangeEvent, Tournament};
use crate::domain::id::{ExchangeEventId, LineId};
use crate::domain::market::ExchangeMarket;
use crate::domain::odds::AmericanOdds;
use crate::domain::wager::{MatchingStatus, WagerRecord, WagerStatus};
use crate::error::Result;

/// A placement request carrying the client idempotency key.
///
/// External IDs are unique per placement attempt and never reused, even on
/// retry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceWager {
    pub external_id: String,
    pub line_id: LineId,
    pub odds: AmericanOdds,
    pub stake: Decimal,
}

/// Successful placement acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWager {
    /// Server-issued wager id.
    pub wager_id: String,
    pub external_id: String,
    /// True when the placement was simulated (dry-run mode).
    pub dry_run: bool,
}

/// Result of an individual wager lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum WagerLookup {
    Found(WagerRecord),
    /// The record is absent; for a wager we placed, this is evidence it
    /// matured and cleared.
    NotFound,
}

/// Time-window query over the exchange's wager histories.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<WagerStatus>,
    pub matching_status: Option<MatchingStatus>,
    /// Server page size; the client follows `next_cursor` until drained.
    pub page_size: u32,
}

impl HistoryQuery {
    /// Query covering the given window with the default page size.
    #[must_use]
    pub fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            page_size: 1000,
            ..Self::default()
        }
    }
}

/// The exchange API surface the core depends on.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// List tournaments, filtered by sport label.
    async fn tournaments(&self, sport: &str) -> Result<Vec<Tournament>>;

    /// List events within a tournament.
    async fn events(&self, tournament_id: i64) -> Result<Vec<ExchangeEvent>>;

    /// Fetch the market tree for an event, all categories included.
    async fn markets(&self, event_id: ExchangeEventId) -> Result<Vec<ExchangeMarket>>;

    /// Place a wager. Fire-and-forget within a cycle: the next cycle
    /// observes the outcome through wager histories.
    async fn place_wager(&self, request: &PlaceWager) -> Result<PlacedWager>;

    /// Cancel a wager by server id.
    async fn cancel_wager(&self, wager_id: &str) -> Result<()>;

    /// Fetch wager records in a time window, following pagination until
    /// the window is drained.
    async fn wager_histories(&self, query: &HistoryQuery) -> Result<Vec<WagerRecord>>;

    /// Look up a single wager by server id.
    async fn wager(&self, wager_id: &str) -> Result<WagerLookup>;
}
