//! The cycle driver.
//!
//! One cycle: refresh the reference snapshot, discover exchange events,
//! pair them, map market lines, recompute pricing targets, sweep wager
//! histories into per-line positions, let the controller emit actions, and
//! execute them against the exchange with bounded concurrency. Cycles never
//! overlap; an overrun simply shortens the following sleep to a 5 s floor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::controller::{Action, LineController};
use super::mapping::MarketResolver;
use super::pairing::EventResolver;
use super::pipeline::{self, EventTargets};
use super::position::PositionStore;
use super::state::AppState;
use crate::domain::event::{ExchangeEvent, ReferenceEvent};
use crate::domain::id::{ExchangeEventId, LineId};
use crate::domain::pricing::{PricingEngine, PricingTarget};
use crate::error::{Error, Result};
use crate::port::outbound::exchange::ExchangeApi;
use crate::port::outbound::feed::ReferenceFeed;

/// Scheduler tunables fixed at startup. Poll interval, base stake, and
/// cool-down come from [`AppState`] each cycle so admin updates apply.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sport label used for tournament discovery.
    pub sport: String,
    /// Events starting within this margin leave the active set.
    pub stop_margin: Duration,
    /// Only track events starting within this window.
    pub lookahead: Duration,
    /// Upper bound on simultaneously tracked events.
    pub max_events_tracked: usize,
    /// Bound on concurrent exchange calls when executing actions.
    pub max_concurrent_requests: usize,
    /// Stake ceiling per exchange event.
    pub max_exposure_per_event: Decimal,
    /// Stake ceiling across all events.
    pub max_exposure_total: Decimal,
    /// Cancel open wagers when an event leaves the active set.
    pub cancel_at_stop: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sport: "baseball".into(),
            stop_margin: Duration::minutes(15),
            lookahead: Duration::hours(72),
            max_events_tracked: 30,
            max_concurrent_requests: 10,
            max_exposure_per_event: Decimal::from(500),
            max_exposure_total: Decimal::from(2000),
            cancel_at_stop: false,
        }
    }
}

/// Outcome of one cycle, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub reference_events: usize,
    pub exchange_events: usize,
    pub active_pairings: usize,
    pub lines_tracked: usize,
    pub placements: usize,
    pub cancellations: usize,
    pub markets_skipped: usize,
}

/// Drives the market-making loop.
pub struct Scheduler {
    config: SchedulerConfig,
    feed: Arc<dyn ReferenceFeed>,
    exchange: Arc<dyn ExchangeApi>,
    resolver: Arc<EventResolver>,
    mapper: MarketResolver,
    engine: PricingEngine,
    positions: PositionStore,
    controller: LineController,
    state: Arc<AppState>,
    /// Which exchange event each tracked line belongs to.
    line_events: HashMap<LineId, ExchangeEventId>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        feed: Arc<dyn ReferenceFeed>,
        exchange: Arc<dyn ExchangeApi>,
        resolver: Arc<EventResolver>,
        engine: PricingEngine,
        controller: LineController,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            config,
            feed,
            exchange: Arc::clone(&exchange),
            resolver,
            mapper: MarketResolver,
            engine,
            positions: PositionStore::new(exchange),
            controller,
            state,
            line_events: HashMap::new(),
        }
    }

    /// Run cycles until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(sport = %self.config.sport, "Scheduler started");

        loop {
            let started = Utc::now();

            if self.state.is_running() {
                match self.cycle().await {
                    Ok(summary) => {
                        info!(
                            pairings = summary.active_pairings,
                            lines = summary.lines_tracked,
                            placements = summary.placements,
                            cancellations = summary.cancellations,
                            skipped = summary.markets_skipped,
                            duration_ms = (Utc::now() - started).num_milliseconds(),
                            "Cycle complete"
                        );
                        self.state.complete_cycle(Utc::now());
                    }
                    Err(err) => {
                        error!(error = %err, "Cycle failed");
                        self.state.record_error("scheduler", &err);
                    }
                }
            }

            let interval =
                Duration::seconds(self.state.settings().poll_interval_seconds as i64);
            let elapsed = Utc::now() - started;
            // Overrun still leaves at least 5 s of slack between cycles.
            let wait = (interval - elapsed).max(Duration::seconds(5));
            let wait = wait.to_std().unwrap_or(std::time::Duration::from_secs(5));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Execute one full cycle.
    pub async fn cycle(&mut self) -> Result<CycleSummary> {
        let now = Utc::now();
        let mut summary = CycleSummary::default();

        // Runtime-adjustable settings apply from here.
        let settings = self.state.settings();
        self.engine.config.base_plus_stake = settings.base_plus_stake;
        self.controller
            .set_cool_down(Duration::seconds(settings.cool_down_seconds as i64));

        let reference = self.fetch_reference_snapshot().await;
        if let Some(events) = &reference {
            summary.reference_events = events.len();
        }

        // `None` snapshot: keep reconciling known lines without repricing.
        let targets = match reference {
            Some(reference) => {
                let exchange_events = match self.discover_exchange_events(now).await {
                    Ok(events) => events,
                    Err(err) => {
                        self.state.record_error("exchange", &err);
                        warn!(error = %err, "Exchange discovery failed; reconciling only");
                        Vec::new()
                    }
                };
                summary.exchange_events = exchange_events.len();

                Some(
                    self.resolve_targets(&reference, &exchange_events, now, &mut summary)
                        .await,
                )
            }
            None => None,
        };

        // The position sweep must complete before any line is evaluated.
        if let Err(err) = self.positions.sweep(now).await {
            self.state.record_error("positions", &err);
            return Err(err);
        }

        // With a fresh snapshot the resolved map is authoritative: line
        // states exist only while their line is present in it.
        let live: HashSet<LineId> = match &targets {
            Some(targets) => {
                let live: HashSet<LineId> = targets.keys().cloned().collect();
                self.controller.sync_lines(&live);
                self.line_events.retain(|line_id, _| live.contains(line_id));
                live
            }
            None => self.controller.phases().into_keys().collect(),
        };
        summary.lines_tracked = live.len();

        let targets = targets.unwrap_or_default();
        let (actions, positions) = self.evaluate_lines(&live, &targets, now).await?;
        let (placements, cancellations) = self.execute_actions(actions).await;
        summary.placements = placements;
        summary.cancellations = cancellations;

        // Publish snapshots for the admin surface. Positions are the
        // reconciled views each line was evaluated against.
        self.state.publish_targets(
            targets
                .iter()
                .map(|(line_id, (target, _))| (line_id.clone(), target.clone()))
                .collect(),
        );
        self.state.publish_positions(positions);
        self.state
            .publish_line_states(self.controller.snapshot(), self.controller.phases());

        Ok(summary)
    }

    /// Fetch the reference snapshot, honoring a rate-limit retry hint once.
    async fn fetch_reference_snapshot(&self) -> Option<Vec<ReferenceEvent>> {
        match self.feed.fetch_events().await {
            Ok(events) => Some(events),
            Err(Error::RateLimited { retry_after }) => {
                warn!(retry_after_secs = retry_after.as_secs(), "Reference feed rate limited");
                tokio::time::sleep(retry_after).await;
                match self.feed.fetch_events().await {
                    Ok(events) => Some(events),
                    Err(err) => {
                        self.state.record_error("feed", &err);
                        None
                    }
                }
            }
            Err(err) => {
                self.state.record_error("feed", &err);
                warn!(error = %err, "Reference snapshot unavailable; reconciling only");
                None
            }
        }
    }

    /// Tournament-based discovery of upcoming exchange events.
    async fn discover_exchange_events(&self, now: DateTime<Utc>) -> Result<Vec<ExchangeEvent>> {
        let tournaments = self.exchange.tournaments(&self.config.sport).await?;
        let cutoff = now + self.config.lookahead;

        let mut events = Vec::new();
        for tournament in &tournaments {
            match self.exchange.events(tournament.id).await {
                Ok(batch) => {
                    events.extend(batch.into_iter().filter(|e| {
                        e.status == "not_started" && e.commence_time <= cutoff
                    }));
                }
                Err(err) => {
                    warn!(tournament = %tournament.name, error = %err, "Event listing failed");
                }
            }
        }
        events.sort_by_key(|e| e.commence_time);
        Ok(events)
    }

    /// Pair events, map lines, and price every active market.
    async fn resolve_targets(
        &mut self,
        reference: &[ReferenceEvent],
        exchange_events: &[ExchangeEvent],
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) -> HashMap<LineId, (PricingTarget, ExchangeEventId)> {
        let tracked: Vec<ReferenceEvent> = reference
            .iter()
            .take(self.config.max_events_tracked)
            .cloned()
            .collect();

        let outcomes = self.resolver.resolve(&tracked, exchange_events);
        self.state.publish_pairings(outcomes.clone());

        let mut targets = HashMap::new();
        for outcome in &outcomes {
            let Some(pairing) = outcome.pairing() else {
                continue;
            };
            let Some(reference_event) = tracked
                .iter()
                .find(|e| e.id == pairing.reference_event_id)
            else {
                continue;
            };

            // Events at or inside the stop margin leave the active set.
            if reference_event.commence_time - now <= self.config.stop_margin {
                info!(
                    event = %reference_event.display_name(),
                    "Inside stop margin; no further placements"
                );
                if self.config.cancel_at_stop {
                    self.cancel_event_lines(pairing.exchange_event_id).await;
                }
                continue;
            }
            summary.active_pairings += 1;

            let markets = match self.exchange.markets(pairing.exchange_event_id).await {
                Ok(markets) => markets,
                Err(err) => {
                    warn!(
                        event = %pairing.exchange_event_id,
                        error = %err,
                        "Market tree fetch failed"
                    );
                    self.state.record_error("exchange", &err);
                    continue;
                }
            };

            let map = self.mapper.map_event(reference_event, &markets);
            let EventTargets { targets: priced, skips } =
                pipeline::price_line_map(&self.engine, &map);

            summary.markets_skipped += skips.len();
            self.state
                .markets_skipped
                .fetch_add(skips.len() as u64, std::sync::atomic::Ordering::Relaxed);

            for (line_id, target) in priced {
                self.line_events
                    .insert(line_id.clone(), pairing.exchange_event_id);
                targets.insert(line_id, (target, pairing.exchange_event_id));
            }
        }

        targets
    }

    /// Evaluate every live line against its refreshed position. Returns
    /// the emitted actions and the reconciled position snapshots.
    async fn evaluate_lines(
        &mut self,
        live: &HashSet<LineId>,
        targets: &HashMap<LineId, (PricingTarget, ExchangeEventId)>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Action>, HashMap<LineId, super::position::LinePosition>)> {
        let mut event_exposure: HashMap<ExchangeEventId, Decimal> = HashMap::new();
        let mut total_exposure = Decimal::ZERO;
        for (line_id, (_, event_id)) in targets {
            let stake = self.positions.summary(line_id, now).total_stake;
            *event_exposure.entry(*event_id).or_default() += stake;
            total_exposure += stake;
        }

        let mut actions = Vec::new();
        let mut reconciled = HashMap::new();
        for line_id in live {
            let tracked = self.controller.tracked(line_id);
            let (position, report) = self
                .positions
                .reconcile_tracked(line_id, &tracked, now)
                .await?;
            self.controller.apply_reconcile_report(line_id, &report);
            reconciled.insert(line_id.clone(), position.clone());

            let target = targets.get(line_id);

            // A position above its cap means a bug or an out-of-band manual
            // bet; fatal for this cycle, the next one starts clean.
            if let Some((target, _)) = target {
                if position.total_stake > target.max_position {
                    return Err(Error::Invariant(format!(
                        "line {} stake {} exceeds cap {}",
                        line_id, position.total_stake, target.max_position
                    )));
                }
            }
            let line_actions = self.controller.evaluate(
                line_id,
                &position,
                target.map(|(t, _)| t),
                now,
            );

            for action in line_actions {
                match &action {
                    Action::Place(place) => {
                        let Some((_, event_id)) = target else {
                            continue;
                        };
                        let event_total =
                            event_exposure.entry(*event_id).or_default();
                        if *event_total + place.stake > self.config.max_exposure_per_event {
                            warn!(
                                line_id = %line_id.tail(),
                                "Placement skipped: event exposure cap"
                            );
                            continue;
                        }
                        if total_exposure + place.stake > self.config.max_exposure_total {
                            warn!(
                                line_id = %line_id.tail(),
                                "Placement skipped: total exposure cap"
                            );
                            continue;
                        }
                        *event_total += place.stake;
                        total_exposure += place.stake;
                        actions.push(action);
                    }
                    Action::Cancel { .. } => actions.push(action),
                }
            }
        }

        Ok((actions, reconciled))
    }

    /// Cancel resting wagers on every line of an event leaving the active set.
    async fn cancel_event_lines(&mut self, event_id: ExchangeEventId) {
        let now = Utc::now();
        let lines: Vec<LineId> = self
            .line_events
            .iter()
            .filter(|(_, ev)| **ev == event_id)
            .map(|(line_id, _)| line_id.clone())
            .collect();
        for line_id in lines {
            let position = self.positions.summary(&line_id, now);
            for wager_id in position.open_wager_ids {
                self.state.cancellations.attempt();
                match self.exchange.cancel_wager(&wager_id).await {
                    Ok(()) => {
                        self.state.cancellations.succeed();
                        self.controller.forget_wager(&line_id, &wager_id);
                    }
                    Err(err) => {
                        self.state.cancellations.fail();
                        warn!(wager_id = %wager_id, error = %err, "Stop-margin cancel failed");
                    }
                }
            }
        }
    }

    /// Dispatch actions with bounded concurrency, then fold the results
    /// back into the controller and counters.
    async fn execute_actions(&mut self, actions: Vec<Action>) -> (usize, usize) {
        enum Outcome {
            Placed {
                line_id: LineId,
                wager_id: String,
                stake: Decimal,
                dry_run: bool,
            },
            PlaceFailed,
            Cancelled { line_id: LineId, wager_id: String },
            CancelFailed,
        }

        let exchange = Arc::clone(&self.exchange);
        let ids = self.controller.id_generator();
        let results: Vec<Outcome> = stream::iter(actions.into_iter().map(|action| {
            let exchange = Arc::clone(&exchange);
            let ids = Arc::clone(&ids);
            async move {
                match action {
                    Action::Place(mut request) => {
                        // Transient failures retry with backoff, each
                        // attempt under a freshly minted external id.
                        let mut attempt = 0;
                        loop {
                            attempt += 1;
                            match exchange.place_wager(&request).await {
                                Ok(placed) => {
                                    break Outcome::Placed {
                                        line_id: request.line_id,
                                        wager_id: placed.wager_id,
                                        stake: request.stake,
                                        dry_run: placed.dry_run,
                                    }
                                }
                                Err(err) if attempt < 3 && err.is_transient() => {
                                    warn!(
                                        line_id = %request.line_id.tail(),
                                        attempt,
                                        error = %err,
                                        "Placement attempt failed; retrying"
                                    );
                                    tokio::time::sleep(std::time::Duration::from_millis(
                                        250 * 2u64.pow(attempt - 1),
                                    ))
                                    .await;
                                    request.external_id =
                                        ids.next(&request.line_id, Utc::now());
                                }
                                Err(err) => {
                                    warn!(
                                        line_id = %request.line_id.tail(),
                                        external_id = %request.external_id,
                                        error = %err,
                                        "Placement failed"
                                    );
                                    break Outcome::PlaceFailed;
                                }
                            }
                        }
                    }
                    Action::Cancel { line_id, wager_id } => {
                        match exchange.cancel_wager(&wager_id).await {
                            Ok(()) => Outcome::Cancelled { line_id, wager_id },
                            Err(err) => {
                                warn!(wager_id = %wager_id, error = %err, "Cancel failed");
                                Outcome::CancelFailed
                            }
                        }
                    }
                }
            }
        }))
        .buffer_unordered(self.config.max_concurrent_requests.max(1))
        .collect()
        .await;

        let mut placements = 0;
        let mut cancellations = 0;
        for outcome in results {
            match outcome {
                Outcome::Placed {
                    line_id,
                    wager_id,
                    stake,
                    dry_run,
                } => {
                    self.state.placements.attempt();
                    self.state.placements.succeed();
                    placements += 1;
                    // Dry-run ids are synthetic; tracking them would only
                    // produce phantom settlement inferences.
                    if !dry_run {
                        self.controller.record_placement(&line_id, wager_id, stake);
                    }
                }
                Outcome::PlaceFailed => {
                    self.state.placements.attempt();
                    self.state.placements.fail();
                }
                Outcome::Cancelled { line_id, wager_id } => {
                    self.state.cancellations.attempt();
                    self.state.cancellations.succeed();
                    cancellations += 1;
                    self.controller.forget_wager(&line_id, &wager_id);
                }
                Outcome::CancelFailed => {
                    self.state.cancellations.attempt();
                    self.state.cancellations.fail();
                }
            }
        }

        (placements, cancellations)
    }
}
