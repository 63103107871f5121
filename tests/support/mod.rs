//! Shared test doubles: a scripted reference feed and a recording exchange.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use linesmith::domain::event::{
    ExchangeEvent, Outcome, ReferenceEvent, ReferenceMarket, Tournament,
};
use linesmith::domain::id::{ExchangeEventId, LineId, ReferenceEventId};
use linesmith::domain::market::{ExchangeLine, ExchangeMarket, MarketKind};
use linesmith::domain::odds::AmericanOdds;
use linesmith::domain::wager::{MatchingStatus, WagerRecord, WagerStatus};
use linesmith::error::{Error, Result};
use linesmith::port::outbound::exchange::{
    ExchangeApi, HistoryQuery, PlaceWager, PlacedWager, WagerLookup,
};
use linesmith::port::outbound::feed::{FeedUsage, ReferenceFeed};

/// Scripted reference feed.
pub struct MockFeed {
    events: Mutex<Vec<ReferenceEvent>>,
    fail: AtomicBool,
}

impl MockFeed {
    pub fn new(events: Vec<ReferenceEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_events(&self, events: Vec<ReferenceEvent>) {
        *self.events.lock() = events;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReferenceFeed for MockFeed {
    async fn fetch_events(&self) -> Result<Vec<ReferenceEvent>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                body: "feed unavailable".into(),
            });
        }
        Ok(self.events.lock().clone())
    }

    fn usage(&self) -> FeedUsage {
        FeedUsage::default()
    }
}

/// Recording exchange double.
///
/// Placements are appended to the wager-history store as open unmatched
/// records, the way the real exchange would surface them on the next
/// sweep. Tests mutate the store directly to simulate fills, settlement,
/// and disappearance.
pub struct MockExchange {
    pub tournaments: Vec<Tournament>,
    pub events: HashMap<i64, Vec<ExchangeEvent>>,
    pub markets: Mutex<HashMap<i64, Vec<ExchangeMarket>>>,
    pub histories: Mutex<Vec<WagerRecord>>,
    pub placed: Mutex<Vec<PlaceWager>>,
    pub cancelled: Mutex<Vec<String>>,
    next_wager: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            tournaments: vec![Tournament {
                id: 1,
                name: "MLB".into(),
                sport: "Baseball".into(),
            }],
            events: HashMap::new(),
            markets: Mutex::new(HashMap::new()),
            histories: Mutex::new(Vec::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            next_wager: AtomicU64::new(1),
        }
    }

    pub fn with_event(
        mut self,
        event: ExchangeEvent,
        markets: Vec<ExchangeMarket>,
    ) -> Self {
        let id = event.id.value();
        self.events.entry(1).or_default().push(event);
        self.markets.lock().insert(id, markets);
        self
    }

    /// Simulate a fill on the first open record of a line.
    pub fn fill_line(&self, line_id: &LineId, amount: Decimal, at: DateTime<Utc>) {
        let mut histories = self.histories.lock();
        if let Some(record) = histories
            .iter_mut()
            .find(|w| &w.line_id == line_id && w.status == WagerStatus::Open)
        {
            record.matched_stake += amount;
            record.matching_status = if record.matched_stake >= record.stake {
                MatchingStatus::FullyMatched
            } else {
                MatchingStatus::PartiallyMatched
            };
            record.updated_at = at;
        }
    }

    /// Remove a wager from histories entirely (post-settlement cleanup).
    pub fn vanish_wager(&self, wager_id: &str) {
        self.histories.lock().retain(|w| w.wager_id != wager_id);
    }

    pub fn placed_count(&self) -> usize {
        self.placed.lock().len()
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn tournaments(&self, _sport: &str) -> Result<Vec<Tournament>> {
        Ok(self.tournaments.clone())
    }

    async fn events(&self, tournament_id: i64) -> Result<Vec<ExchangeEvent>> {
        Ok(self.events.get(&tournament_id).cloned().unwrap_or_default())
    }

    async fn markets(&self, event_id: ExchangeEventId) -> Result<Vec<ExchangeMarket>> {
        Ok(self
            .markets
            .lock()
            .get(&event_id.value())
            .cloned()
            .unwrap_or_default())
    }

    async fn place_wager(&self, request: &PlaceWager) -> Result<PlacedWager> {
        let wager_id = format!("mw-{}", self.next_wager.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();

        self.histories.lock().push(WagerRecord {
            wager_id: wager_id.clone(),
            external_id: request.external_id.clone(),
            line_id: request.line_id.clone(),
            odds: request.odds,
            stake: request.stake,
            matched_stake: Decimal::ZERO,
            status: WagerStatus::Open,
            matching_status: MatchingStatus::Unmatched,
            created_at: now,
            updated_at: now,
        });
        self.placed.lock().push(request.clone());

        Ok(PlacedWager {
            wager_id,
            external_id: request.external_id.clone(),
            dry_run: false,
        })
    }

    async fn cancel_wager(&self, wager_id: &str) -> Result<()> {
        self.cancelled.lock().push(wager_id.to_string());
        let mut histories = self.histories.lock();
        if let Some(record) = histories.iter_mut().find(|w| w.wager_id == wager_id) {
            record.status = WagerStatus::Cancelled;
            record.matching_status = MatchingStatus::Unmatched;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn wager_histories(&self, query: &HistoryQuery) -> Result<Vec<WagerRecord>> {
        let histories = self.histories.lock();
        Ok(histories
            .iter()
            .filter(|w| query.from.map_or(true, |from| w.created_at >= from))
            .filter(|w| query.to.map_or(true, |to| w.created_at <= to))
            .cloned()
            .collect())
    }

    async fn wager(&self, wager_id: &str) -> Result<WagerLookup> {
        Ok(self
            .histories
            .lock()
            .iter()
            .find(|w| w.wager_id == wager_id)
            .cloned()
            .map_or(WagerLookup::NotFound, WagerLookup::Found))
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn reference_moneyline(
    id: &str,
    home: &str,
    away: &str,
    home_odds: i32,
    away_odds: i32,
    commence_time: DateTime<Utc>,
) -> ReferenceEvent {
    ReferenceEvent {
        id: ReferenceEventId::new(id),
        sport: "baseball".into(),
        home: home.into(),
        away: away.into(),
        commence_time,
        moneyline: Some(ReferenceMarket {
            kind: MarketKind::Moneyline,
            outcomes: vec![
                Outcome {
                    name: home.into(),
                    odds: AmericanOdds::new(home_odds),
                    point: None,
                },
                Outcome {
                    name: away.into(),
                    odds: AmericanOdds::new(away_odds),
                    point: None,
                },
            ],
            last_update: Utc::now(),
        }),
        spread: None,
        total: None,
    }
}

pub fn exchange_event(
    id: i64,
    home: &str,
    away: &str,
    commence_time: DateTime<Utc>,
) -> ExchangeEvent {
    ExchangeEvent {
        id: ExchangeEventId::new(id),
        home: home.into(),
        away: away.into(),
        commence_time,
        tournament: "MLB".into(),
        status: "not_started".into(),
    }
}

pub fn moneyline_market(home: &str, away: &str) -> ExchangeMarket {
    ExchangeMarket {
        market_id: "m-ml".into(),
        name: "Moneyline".into(),
        kind: Some(MarketKind::Moneyline),
        category: "Game Lines".into(),
        lines: vec![
            ExchangeLine {
                line_id: LineId::new("l-home"),
                selection_name: home.into(),
                odds: None,
                point: None,
            },
            ExchangeLine {
                line_id: LineId::new("l-away"),
                selection_name: away.into(),
                odds: Some(AmericanOdds::new(100)),
                point: None,
            },
        ],
    }
}

pub fn soon(minutes: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(minutes)
}
