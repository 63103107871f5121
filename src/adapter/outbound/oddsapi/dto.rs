//! Wire types for the odds-aggregator API.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::event::{Outcome, ReferenceEvent, ReferenceMarket};
use crate::domain::id::ReferenceEventId;
use crate::domain::market::MarketKind;
use crate::domain::odds::AmericanOdds;

/// One event in the feed's odds response.
#[derive(Debug, Deserialize)]
pub struct FeedEvent {
    pub id: String,
    #[serde(default)]
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<FeedBookmaker>,
}

#[derive(Debug, Deserialize)]
pub struct FeedBookmaker {
    pub key: String,
    #[serde(default)]
    pub markets: Vec<FeedMarket>,
}

#[derive(Debug, Deserialize)]
pub struct FeedMarket {
    pub key: String,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub outcomes: Vec<FeedOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct FeedOutcome {
    pub name: String,
    /// American odds; the feed sends them as numbers.
    pub price: Decimal,
    #[serde(default)]
    pub point: Option<f64>,
}

impl FeedMarket {
    /// Feed market keys map onto the kinds we replicate.
    #[must_use]
    pub fn kind(&self) -> Option<MarketKind> {
        match self.key.as_str() {
            "h2h" => Some(MarketKind::Moneyline),
            "spreads" => Some(MarketKind::Spread),
            "totals" => Some(MarketKind::Total),
            _ => None,
        }
    }

    fn to_domain(&self, kind: MarketKind) -> ReferenceMarket {
        ReferenceMarket {
            kind,
            outcomes: self
                .outcomes
                .iter()
                .filter_map(|o| {
                    let odds = o.price.to_i32()?;
                    Some(Outcome {
                        name: o.name.clone(),
                        odds: AmericanOdds::new(odds),
                        point: o.point,
                    })
                })
                .collect(),
            last_update: self.last_update,
        }
    }
}

impl FeedEvent {
    /// Reduce to the target bookmaker's markets. Returns `None` when that
    /// book does not price this event or prices none of the wanted kinds.
    #[must_use]
    pub fn into_reference(self, bookmaker: &str, wanted: &[MarketKind]) -> Option<ReferenceEvent> {
        let book = self.bookmakers.iter().find(|b| b.key == bookmaker)?;

        let mut event = ReferenceEvent {
            id: ReferenceEventId::new(self.id),
            sport: self.sport_title,
            home: self.home_team,
            away: self.away_team,
            commence_time: self.commence_time,
            moneyline: None,
            spread: None,
            total: None,
        };

        for market in &book.markets {
            let Some(kind) = market.kind() else { continue };
            if !wanted.contains(&kind) {
                continue;
            }
            let domain = market.to_domain(kind);
            match kind {
                MarketKind::Moneyline => event.moneyline = Some(domain),
                MarketKind::Spread => event.spread = Some(domain),
                MarketKind::Total => event.total = Some(domain),
            }
        }

        if event.markets().next().is_some() {
            Some(event)
        } else {
            None
        }
    }
}
