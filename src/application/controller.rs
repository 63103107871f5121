//! Per-line placement state machine.
//!
//! For each line the controller decides, once per cycle, whether to place
//! an initial wager, top up after a fill, wait out a cool-down, or tear
//! down and reprice after a significant odds move. Placements are
//! fire-and-forget: the next cycle observes outcomes through the position
//! store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use super::position::{LinePosition, ReconcileReport, TrackedWager};
use crate::domain::id::LineId;
use crate::domain::odds::AmericanOdds;
use crate::domain::pricing::PricingTarget;
use crate::port::outbound::exchange::PlaceWager;

/// Lifecycle phase of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePhase {
    /// No wagers observed.
    Idle,
    /// An open unmatched wager rests at the intended odds.
    Active,
    /// A fill occurred recently; the cool-down is running.
    WaitingAfterFill,
    /// Reference odds moved; existing wagers are being replaced.
    Invalidated,
}

impl fmt::Display for LinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::WaitingAfterFill => "waiting_after_fill",
            Self::Invalidated => "invalidated",
        };
        write!(f, "{label}")
    }
}

/// Controller-owned state for one line.
#[derive(Debug, Clone)]
pub struct LineState {
    pub phase: LinePhase,
    pub cool_down_until: Option<DateTime<Utc>>,
    pub last_placed_odds: Option<AmericanOdds>,
    /// Matched total observed last cycle; a positive delta is a fill.
    last_total_matched: Option<Decimal>,
    pub last_placement_at: Option<DateTime<Utc>>,
    /// Cancels were issued and have not yet been reflected in a refresh.
    awaiting_cancel: bool,
    /// Wagers we placed, tracked until a history sweep confirms them.
    tracked: Vec<TrackedWager>,
}

impl Default for LineState {
    fn default() -> Self {
        Self {
            phase: LinePhase::Idle,
            cool_down_until: None,
            last_placed_odds: None,
            last_total_matched: None,
            last_placement_at: None,
            awaiting_cancel: false,
            tracked: Vec::new(),
        }
    }
}

/// Read-only view of a line's state for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct LineStateView {
    pub line_id: LineId,
    pub phase: LinePhase,
    pub cool_down_until: Option<DateTime<Utc>>,
    pub last_placed_odds: Option<AmericanOdds>,
    pub tracked_wagers: usize,
}

/// An effect the scheduler must execute against the exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Place(PlaceWager),
    Cancel { line_id: LineId, wager_id: String },
}

/// Controller tunables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Wait after a fill before adding more liquidity.
    pub cool_down: Duration,
    /// American-points move that invalidates resting wagers.
    pub significant_move: i32,
    /// Minimum spacing between placements on one line.
    pub dedup_guard: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cool_down: Duration::seconds(300),
            significant_move: 5,
            dedup_guard: Duration::minutes(2),
        }
    }
}

/// Process-wide unique external id minting.
///
/// Monotonic counter + line fragment + unix timestamp; never reused, even
/// across retries of the same placement.
#[derive(Debug, Default)]
pub struct ExternalIdGenerator {
    counter: AtomicU64,
}

impl ExternalIdGenerator {
    /// Mint a fresh external id for a placement on `line_id`.
    pub fn next(&self, line_id: &LineId, now: DateTime<Utc>) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("ls-{}-{}-{}", line_id.tail(), now.timestamp(), seq)
    }
}

/// The per-line state machine.
pub struct LineController {
    config: ControllerConfig,
    states: HashMap<LineId, LineState>,
    ids: Arc<ExternalIdGenerator>,
}

impl LineController {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            ids: Arc::new(ExternalIdGenerator::default()),
        }
    }

    pub fn set_cool_down(&mut self, cool_down: Duration) {
        self.config.cool_down = cool_down;
    }

    /// Shared handle to the external id generator, for placement retries
    /// that must mint a fresh id per attempt.
    #[must_use]
    pub fn id_generator(&self) -> Arc<ExternalIdGenerator> {
        Arc::clone(&self.ids)
    }

    /// Evaluate one line against a consistent position snapshot.
    ///
    /// Order of precedence: fill detection starts the cool-down; a
    /// significant odds move tears resting wagers down regardless of the
    /// cool-down; otherwise the cool-down, the dedup guard, and the
    /// position cap gate placement.
    pub fn evaluate(
        &mut self,
        line_id: &LineId,
        position: &LinePosition,
        target: Option<&PricingTarget>,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        let state = self.states.entry(line_id.clone()).or_default();
        let mut actions = Vec::new();

        // Fill detection: any positive delta in matched stake since the
        // previous observation. The exchange's fill timestamp wins ties
        // over our clock.
        match state.last_total_matched {
            Some(previous) if position.total_matched > previous => {
                let fill_at = position.last_fill_time.unwrap_or(now);
                let until = fill_at + self.config.cool_down;
                state.cool_down_until = Some(until);
                state.phase = LinePhase::WaitingAfterFill;
                info!(
                    line_id = %line_id.tail(),
                    filled = %(position.total_matched - previous),
                    until = %until,
                    "Fill detected; cool-down started"
                );
            }
            _ => {}
        }
        state.last_total_matched = Some(position.total_matched);

        // Odds-move invalidation preempts the cool-down.
        if !state.awaiting_cancel {
            if let (Some(last), Some(target)) = (state.last_placed_odds, target) {
                if last.distance(target.odds_to_post) >= self.config.significant_move
                    && position.has_open_wager
                {
                    info!(
                        line_id = %line_id.tail(),
                        previous = %last,
                        current = %target.odds_to_post,
                        "Significant odds move; cancelling resting wagers"
                    );
                    for wager_id in &position.open_wager_ids {
                        actions.push(Action::Cancel {
                            line_id: line_id.clone(),
                            wager_id: wager_id.clone(),
                        });
                    }
                    state.phase = LinePhase::Invalidated;
                    state.cool_down_until = None;
                    state.last_placement_at = None;
                    state.last_placed_odds = None;
                    state.awaiting_cancel = true;
                    return actions;
                }
            }
        }

        let Some(target) = target else {
            return actions;
        };

        // Post-invalidation: hold until a refreshed snapshot shows the
        // cancels landed, then repost as if from Idle.
        if state.awaiting_cancel {
            if position.has_open_wager {
                return actions;
            }
            state.awaiting_cancel = false;
        }

        // No placement while the cool-down runs.
        if let Some(until) = state.cool_down_until {
            if now < until {
                return actions;
            }
            state.cool_down_until = None;
            if state.phase == LinePhase::WaitingAfterFill {
                state.phase = LinePhase::Active;
            }
        }

        // Dedup guard: one placement per line per guard interval.
        if let Some(at) = state.last_placement_at {
            if now - at < self.config.dedup_guard {
                return actions;
            }
        }

        // Coverage guard: an open wager at the current target odds with
        // enough unmatched stake needs nothing.
        if position.has_open_wager
            && state.last_placed_odds == Some(target.odds_to_post)
            && position.total_unmatched >= target.target_unmatched
        {
            state.phase = LinePhase::Active;
            return actions;
        }

        // Position cap, then stake selection.
        let headroom = target.max_position - position.total_stake;
        if headroom <= Decimal::ZERO {
            debug!(line_id = %line_id.tail(), "At max position");
            return actions;
        }

        let stake = if position.total_stake == Decimal::ZERO {
            target.target_unmatched.min(headroom)
        } else {
            let gap = target.target_unmatched - position.total_unmatched;
            if gap <= Decimal::ZERO {
                return actions;
            }
            target.increment.min(headroom).min(gap)
        };
        if stake <= Decimal::ZERO {
            return actions;
        }

        let external_id = self.ids.next(line_id, now);
        info!(
            line_id = %line_id.tail(),
            odds = %target.odds_to_post,
            stake = %stake,
            external_id = %external_id,
            "Placing wager"
        );
        actions.push(Action::Place(PlaceWager {
            external_id,
            line_id: line_id.clone(),
            odds: target.odds_to_post,
            stake,
        }));
        state.phase = LinePhase::Active;
        state.last_placed_odds = Some(target.odds_to_post);
        state.last_placement_at = Some(now);

        actions
    }

    /// Record a confirmed placement so reconciliation can track it.
    pub fn record_placement(&mut self, line_id: &LineId, wager_id: String, stake: Decimal) {
        let state = self.states.entry(line_id.clone()).or_default();
        state.tracked.push(TrackedWager {
            wager_id,
            stake,
            settled_inferred: false,
        });
    }

    /// Stop tracking a wager (cancelled by us, or no longer of interest).
    pub fn forget_wager(&mut self, line_id: &LineId, wager_id: &str) {
        if let Some(state) = self.states.get_mut(line_id) {
            state.tracked.retain(|w| w.wager_id != wager_id);
        }
    }

    /// Wagers still awaiting confirmation from a history sweep.
    #[must_use]
    pub fn tracked(&self, line_id: &LineId) -> Vec<TrackedWager> {
        self.states
            .get(line_id)
            .map(|s| s.tracked.clone())
            .unwrap_or_default()
    }

    /// Apply what reconciliation learned: confirmed wagers stop being
    /// tracked; newly inferred ones carry their implied fill forward.
    pub fn apply_reconcile_report(&mut self, line_id: &LineId, report: &ReconcileReport) {
        let Some(state) = self.states.get_mut(line_id) else {
            return;
        };
        state.tracked.retain(|w| !report.confirmed.contains(&w.wager_id));
        for wager in &mut state.tracked {
            if report.newly_inferred.contains(&wager.wager_id) {
                wager.settled_inferred = true;
            }
        }
    }

    /// Drop state for lines no longer present in the resolved line map.
    pub fn sync_lines(&mut self, live: &HashSet<LineId>) {
        self.states.retain(|line_id, _| live.contains(line_id));
    }

    /// Current phase per line, for counters.
    #[must_use]
    pub fn phases(&self) -> HashMap<LineId, LinePhase> {
        self.states
            .iter()
            .map(|(id, s)| (id.clone(), s.phase))
            .collect()
    }

    /// Snapshot for the admin surface.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LineStateView> {
        self.states
            .iter()
            .map(|(id, s)| LineStateView {
                line_id: id.clone(),
                phase: s.phase,
                cool_down_until: s.cool_down_until,
                last_placed_odds: s.last_placed_odds,
                tracked_wagers: s.tracked.len(),
            })
            .collect()
    }
}
