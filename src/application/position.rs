//! Per-line position projections over exchange wager histories.
//!
//! The exchange is authoritative. Each cycle performs one windowed history
//! sweep, groups records by line client-side, and summarizes. The store is
//! stateless across cycles aside from memoizing the sweep within a single
//! refresh pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::id::LineId;
use crate::domain::wager::WagerRecord;
use crate::error::Result;
use crate::port::outbound::exchange::{ExchangeApi, HistoryQuery, WagerLookup};

/// One observed fill on a line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub wager_id: String,
    pub external_id: String,
    pub matched_stake: Decimal,
    pub at: DateTime<Utc>,
}

/// Aggregate position for one line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePosition {
    pub line_id: LineId,
    pub wager_count: usize,
    pub total_stake: Decimal,
    pub total_matched: Decimal,
    pub total_unmatched: Decimal,
    pub has_open_wager: bool,
    /// Server ids of wagers still resting in the book.
    pub open_wager_ids: Vec<String>,
    pub last_fill_time: Option<DateTime<Utc>>,
    pub recent_fills: Vec<Fill>,
}

impl LinePosition {
    /// An empty projection for a line with no observed wagers.
    #[must_use]
    pub fn empty(line_id: LineId) -> Self {
        Self {
            line_id,
            wager_count: 0,
            total_stake: Decimal::ZERO,
            total_matched: Decimal::ZERO,
            total_unmatched: Decimal::ZERO,
            has_open_wager: false,
            open_wager_ids: Vec::new(),
            last_fill_time: None,
            recent_fills: Vec::new(),
        }
    }

    /// Summarize a line's wager records.
    #[must_use]
    pub fn summarize(line_id: LineId, records: &[WagerRecord], fill_window: Duration, now: DateTime<Utc>) -> Self {
        let total_stake: Decimal = records.iter().map(|w| w.stake).sum();
        let total_matched: Decimal = records.iter().map(|w| w.matched_stake).sum();
        let total_unmatched: Decimal = records.iter().map(WagerRecord::unmatched_stake).sum();
        let open_wager_ids: Vec<String> = records
            .iter()
            .filter(|w| w.is_resting())
            .map(|w| w.wager_id.clone())
            .collect();

        let last_fill_time = records
            .iter()
            .filter(|w| w.has_fill())
            .map(|w| w.updated_at)
            .max();

        let cutoff = now - fill_window;
        let mut recent_fills: Vec<Fill> = records
            .iter()
            .filter(|w| w.has_fill() && w.updated_at > cutoff)
            .map(|w| Fill {
                wager_id: w.wager_id.clone(),
                external_id: w.external_id.clone(),
                matched_stake: w.matched_stake,
                at: w.updated_at,
            })
            .collect();
        recent_fills.sort_by_key(|f| f.at);

        Self {
            line_id,
            wager_count: records.len(),
            total_stake,
            total_matched,
            total_unmatched,
            has_open_wager: !open_wager_ids.is_empty(),
            open_wager_ids,
            last_fill_time,
            recent_fills,
        }
    }
}

/// A wager this process placed and still expects to see in histories.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedWager {
    pub wager_id: String,
    pub stake: Decimal,
    /// Set once a `NotFound` lookup inferred the wager matured; the implied
    /// fill is carried without re-querying until a sweep confirms it.
    pub settled_inferred: bool,
}

/// What tracked-wager reconciliation learned this cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Tracked wagers that reappeared in the history sweep; tracking can stop.
    pub confirmed: Vec<String>,
    /// Tracked wagers whose lookup returned `NotFound` for the first time.
    pub newly_inferred: Vec<String>,
}

/// Builds per-line projections from the exchange's wager-history API.
pub struct PositionStore {
    exchange: Arc<dyn ExchangeApi>,
    /// How far back the history sweep looks.
    history_window: Duration,
    /// How recent a fill must be to appear in `recent_fills`.
    fill_window: Duration,
    /// Records grouped by line from the current sweep.
    cache: DashMap<LineId, Vec<WagerRecord>>,
}

impl PositionStore {
    #[must_use]
    pub fn new(exchange: Arc<dyn ExchangeApi>) -> Self {
        Self {
            exchange,
            history_window: Duration::days(7),
            fill_window: Duration::hours(1),
            cache: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_windows(mut self, history: Duration, fill: Duration) -> Self {
        self.history_window = history;
        self.fill_window = fill;
        self
    }

    /// Run the cycle's history sweep and rebuild the per-line cache.
    ///
    /// # Errors
    ///
    /// Propagates exchange transport errors; the previous cache is cleared
    /// first so stale data is never summarized as current.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<()> {
        self.cache.clear();

        let query = HistoryQuery::window(now - self.history_window, now);
        let records = self.exchange.wager_histories(&query).await?;

        let mut grouped: HashMap<LineId, Vec<WagerRecord>> = HashMap::new();
        for record in records {
            grouped.entry(record.line_id.clone()).or_default().push(record);
        }
        let lines = grouped.len();
        for (line_id, records) in grouped {
            self.cache.insert(line_id, records);
        }

        debug!(lines, "Position sweep complete");
        Ok(())
    }

    /// Summarize the swept records for one line.
    #[must_use]
    pub fn summary(&self, line_id: &LineId, now: DateTime<Utc>) -> LinePosition {
        match self.cache.get(line_id) {
            Some(records) => {
                LinePosition::summarize(line_id.clone(), &records, self.fill_window, now)
            }
            None => LinePosition::empty(line_id.clone()),
        }
    }

    /// Fills across the given lines inside the window.
    #[must_use]
    pub fn recent_fills(&self, line_ids: &[LineId], now: DateTime<Utc>) -> Vec<Fill> {
        let mut fills: Vec<Fill> = line_ids
            .iter()
            .flat_map(|id| self.summary(id, now).recent_fills)
            .collect();
        fills.sort_by_key(|f| f.at);
        fills
    }

    /// Reconcile wagers we placed that the sweep did not return.
    ///
    /// A tracked wager absent from histories is looked up individually.
    /// `NotFound` is evidence of settlement: the record cleared because it
    /// matured, so the wager is inferred matched in full, pending
    /// confirmation on the next sweep. The returned position includes any
    /// implied fills, with first-time inferences stamped at `now`.
    pub async fn reconcile_tracked(
        &self,
        line_id: &LineId,
        tracked: &[TrackedWager],
        now: DateTime<Utc>,
    ) -> Result<(LinePosition, ReconcileReport)> {
        let mut position = self.summary(line_id, now);
        let mut report = ReconcileReport::default();

        let known: Vec<String> = self
            .cache
            .get(line_id)
            .map(|records| records.iter().map(|w| w.wager_id.clone()).collect())
            .unwrap_or_default();

        for wager in tracked {
            if known.contains(&wager.wager_id) {
                report.confirmed.push(wager.wager_id.clone());
                continue;
            }

            if wager.settled_inferred {
                // Already inferred in an earlier cycle; carry the implied
                // fill without stamping a fresh one.
                position.wager_count += 1;
                position.total_stake += wager.stake;
                position.total_matched += wager.stake;
                continue;
            }

            match self.exchange.wager(&wager.wager_id).await? {
                WagerLookup::Found(record) => {
                    position.wager_count += 1;
                    position.total_stake += record.stake;
                    position.total_matched += record.matched_stake;
                    position.total_unmatched += record.unmatched_stake();
                    if record.is_resting() {
                        position.has_open_wager = true;
                        position.open_wager_ids.push(record.wager_id.clone());
                    }
                    if record.has_fill() {
                        position.last_fill_time =
                            Some(position.last_fill_time.map_or(record.updated_at, |t| {
                                t.max(record.updated_at)
                            }));
                    }
                }
                WagerLookup::NotFound => {
                    warn!(
                        line_id = %line_id.tail(),
                        wager_id = %wager.wager_id,
                        "Tracked wager absent from histories and lookup; inferring matched in full"
                    );
                    position.wager_count += 1;
                    position.total_stake += wager.stake;
                    position.total_matched += wager.stake;
                    position.last_fill_time = Some(now);
                    position.recent_fills.push(Fill {
                        wager_id: wager.wager_id.clone(),
                        external_id: String::new(),
                        matched_stake: wager.stake,
                        at: now,
                    });
                    report.newly_inferred.push(wager.wager_id.clone());
                }
            }
        }

        Ok((position, report))
    }
}
