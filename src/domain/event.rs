//! Event types from both sides of the replication.
//!
//! A [`ReferenceEvent`] is one game as the reference book prices it, with up
//! to three two-outcome markets. An [`ExchangeEvent`] is the same game as
//! the exchange lists it. Pairing the two is the event resolver's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ExchangeEventId, ReferenceEventId};
use super::market::MarketKind;
use super::odds::AmericanOdds;

/// One priceable outcome of a reference market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Selection name as the reference book labels it (team, "Over", "Under").
    pub name: String,
    /// American odds quoted by the reference book.
    pub odds: AmericanOdds,
    /// Handicap or total line; absent on moneylines.
    pub point: Option<f64>,
}

/// A two-outcome market as the reference book prices it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMarket {
    pub kind: MarketKind,
    pub outcomes: Vec<Outcome>,
    pub last_update: DateTime<Utc>,
}

impl ReferenceMarket {
    /// True when the market has exactly the two outcomes arbitrage needs.
    #[must_use]
    pub fn is_two_way(&self) -> bool {
        self.outcomes.len() == 2
    }
}

/// One event from the reference feed, restricted to the target bookmaker.
///
/// Immutable within a cycle; a fresh snapshot replaces it entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEvent {
    pub id: ReferenceEventId,
    pub sport: String,
    pub home: String,
    pub away: String,
    pub commence_time: DateTime<Utc>,
    pub moneyline: Option<ReferenceMarket>,
    pub spread: Option<ReferenceMarket>,
    pub total: Option<ReferenceMarket>,
}

impl ReferenceEvent {
    /// Human-readable label for logs.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} @ {}", self.away, self.home)
    }

    /// The market of the given kind, if the reference priced it.
    #[must_use]
    pub fn market(&self, kind: MarketKind) -> Option<&ReferenceMarket> {
        match kind {
            MarketKind::Moneyline => self.moneyline.as_ref(),
            MarketKind::Spread => self.spread.as_ref(),
            MarketKind::Total => self.total.as_ref(),
        }
    }

    /// Markets present on this event, in a stable order.
    pub fn markets(&self) -> impl Iterator<Item = &ReferenceMarket> {
        [&self.moneyline, &self.spread, &self.total]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

/// One event as the exchange lists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    pub id: ExchangeEventId,
    pub home: String,
    pub away: String,
    pub commence_time: DateTime<Utc>,
    pub tournament: String,
    /// Lifecycle label from the exchange; only `not_started` events are
    /// candidates for market making.
    pub status: String,
}

impl ExchangeEvent {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} @ {}", self.away, self.home)
    }
}

/// Tournament listing entry from the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: i64,
    pub name: String,
    pub sport: String,
}
