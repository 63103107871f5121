//! End-to-end cycle tests over mock ports.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use linesmith::application::controller::{LineController, LinePhase};
use linesmith::application::pairing::{EventResolver, PairingConfig};
use linesmith::application::scheduler::{Scheduler, SchedulerConfig};
use linesmith::application::state::{AppState, RuntimeSettings};
use linesmith::domain::ladder::OddsLadder;
use linesmith::domain::odds::AmericanOdds;
use linesmith::domain::pricing::{PricingConfig, PricingEngine};

use support::{exchange_event, moneyline_market, reference_moneyline, soon, MockExchange, MockFeed};

const HOME: &str = "Detroit Tigers";
const AWAY: &str = "Tampa Bay Rays";

fn runtime_settings() -> RuntimeSettings {
    RuntimeSettings {
        poll_interval_seconds: 60,
        base_plus_stake: dec!(100),
        cool_down_seconds: 300,
    }
}

struct Harness {
    scheduler: Scheduler,
    feed: Arc<MockFeed>,
    exchange: Arc<MockExchange>,
    state: Arc<AppState>,
}

fn harness(feed: MockFeed, exchange: MockExchange) -> Harness {
    let feed = Arc::new(feed);
    let exchange = Arc::new(exchange);
    let state = Arc::new(AppState::new(runtime_settings(), true));
    let resolver = Arc::new(EventResolver::new(PairingConfig::default()));
    let engine = PricingEngine::new(PricingConfig::default(), OddsLadder::standard());
    let controller = LineController::new(Default::default());

    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        feed.clone(),
        exchange.clone(),
        resolver,
        engine,
        controller,
        state.clone(),
    );

    Harness {
        scheduler,
        feed,
        exchange,
        state,
    }
}

fn standard_setup(commence_minutes: i64) -> Harness {
    let commence = soon(commence_minutes);
    let feed = MockFeed::new(vec![reference_moneyline(
        "r1", HOME, AWAY, -120, 110, commence,
    )]);
    let exchange = MockExchange::new().with_event(
        exchange_event(10, HOME, AWAY, commence),
        vec![moneyline_market(HOME, AWAY)],
    );
    harness(feed, exchange)
}

#[tokio::test]
async fn first_cycle_places_both_sides() {
    let mut h = standard_setup(120);

    let summary = h.scheduler.cycle().await.expect("cycle runs");
    assert_eq!(summary.active_pairings, 1);
    assert_eq!(summary.placements, 2);

    let placed = h.exchange.placed.lock().clone();
    assert_eq!(placed.len(), 2);

    // Home is the plus side: hedge of -120 -> +116.40 -> +116, stake 100.
    let home = placed
        .iter()
        .find(|p| p.line_id.as_str() == "l-home")
        .expect("home placement");
    assert_eq!(home.odds, AmericanOdds::new(116));
    assert_eq!(home.stake, dec!(100));

    // Away hedge of +110 -> -113.40 -> -113, arbitrage stake ~102.65.
    let away = placed
        .iter()
        .find(|p| p.line_id.as_str() == "l-away")
        .expect("away placement");
    assert_eq!(away.odds, AmericanOdds::new(-113));
    assert!(away.stake > dec!(102.64) && away.stake < dec!(102.65));

    // External ids are unique across every placement.
    let ids: HashSet<&str> = placed.iter().map(|p| p.external_id.as_str()).collect();
    assert_eq!(ids.len(), placed.len());

    // Both lines are active.
    let states = h.state.line_states();
    assert_eq!(states.len(), 2);
    assert!(states.iter().all(|s| s.phase == LinePhase::Active));
}

#[tokio::test]
async fn second_cycle_adds_nothing_when_covered() {
    let mut h = standard_setup(120);

    h.scheduler.cycle().await.expect("cycle 1");
    let summary = h.scheduler.cycle().await.expect("cycle 2");

    // Resting wagers cover the targets; nothing further goes out.
    assert_eq!(summary.placements, 0);
    assert_eq!(h.exchange.placed_count(), 2);
}

#[tokio::test]
async fn fresh_fill_starts_cool_down() {
    let mut h = standard_setup(120);

    h.scheduler.cycle().await.expect("cycle 1");

    // A $40 fill lands on the home line just now.
    h.exchange
        .fill_line(&"l-home".into(), dec!(40), Utc::now());

    let summary = h.scheduler.cycle().await.expect("cycle 2");
    assert_eq!(summary.placements, 0, "cool-down must block the top-up");

    let states = h.state.line_states();
    let home = states
        .iter()
        .find(|s| s.line_id.as_str() == "l-home")
        .expect("home state");
    assert_eq!(home.phase, LinePhase::WaitingAfterFill);
    assert!(home.cool_down_until.is_some());
}

#[tokio::test]
async fn significant_odds_move_cancels_resting_wagers() {
    let mut h = standard_setup(120);

    h.scheduler.cycle().await.expect("cycle 1");
    assert_eq!(h.exchange.placed_count(), 2);

    // The reference moves: home -120 -> -135, away +110 -> +125. Both
    // snapped targets shift by more than 5 points.
    h.feed.set_events(vec![reference_moneyline(
        "r1",
        HOME,
        AWAY,
        -135,
        125,
        soon(118),
    )]);

    let summary = h.scheduler.cycle().await.expect("cycle 2");
    assert_eq!(summary.cancellations, 2);
    assert_eq!(h.exchange.cancelled.lock().len(), 2);

    // Cycle 3 observes the cancels and reposts at the new prices.
    let summary = h.scheduler.cycle().await.expect("cycle 3");
    assert_eq!(summary.placements, 2);
    let placed = h.exchange.placed.lock().clone();
    let reposted_home = placed
        .iter()
        .filter(|p| p.line_id.as_str() == "l-home")
        .last()
        .expect("repost");
    // Hedge of -135 -> +135 * 0.97 = 130.95 -> snaps to 130.
    assert_eq!(reposted_home.odds, AmericanOdds::new(130));
}

#[tokio::test]
async fn unprofitable_market_is_skipped_quietly() {
    let commence = soon(120);
    let feed = MockFeed::new(vec![reference_moneyline(
        "r1", HOME, AWAY, -105, 100, commence,
    )]);
    let exchange = MockExchange::new().with_event(
        exchange_event(10, HOME, AWAY, commence),
        vec![moneyline_market(HOME, AWAY)],
    );
    let mut h = harness(feed, exchange);

    let summary = h.scheduler.cycle().await.expect("cycle runs");
    assert_eq!(summary.placements, 0);
    assert_eq!(summary.markets_skipped, 1);
    assert_eq!(h.exchange.placed_count(), 0);
    // A skip is not an error.
    assert!(h.state.stats().last_errors.is_empty());
}

#[tokio::test]
async fn event_at_stop_margin_is_excluded() {
    // Default stop margin is 15 minutes; an event at exactly the margin
    // leaves the active set.
    let mut h = standard_setup(15);

    let summary = h.scheduler.cycle().await.expect("cycle runs");
    assert_eq!(summary.active_pairings, 0);
    assert_eq!(h.exchange.placed_count(), 0);
}

#[tokio::test]
async fn event_outside_stop_margin_is_active() {
    let mut h = standard_setup(20);

    let summary = h.scheduler.cycle().await.expect("cycle runs");
    assert_eq!(summary.active_pairings, 1);
    assert_eq!(h.exchange.placed_count(), 2);
}

#[tokio::test]
async fn feed_failure_reconciles_without_placing() {
    let mut h = standard_setup(120);

    h.scheduler.cycle().await.expect("cycle 1");
    h.feed.set_fail(true);

    let summary = h.scheduler.cycle().await.expect("cycle 2 still completes");
    assert_eq!(summary.placements, 0);
    assert_eq!(summary.reference_events, 0);
    // Known lines are still being reconciled.
    assert_eq!(summary.lines_tracked, 2);
    assert!(h.state.stats().last_errors.contains_key("feed"));
}

#[tokio::test]
async fn vanished_wager_is_inferred_matched_in_full() {
    let mut h = standard_setup(120);

    h.scheduler.cycle().await.expect("cycle 1");

    // The home wager disappears entirely: absent from histories and its
    // individual lookup 404s.
    let home_wager = h
        .exchange
        .histories
        .lock()
        .iter()
        .find(|w| w.line_id.as_str() == "l-home")
        .map(|w| w.wager_id.clone())
        .expect("home wager exists");
    h.exchange.vanish_wager(&home_wager);

    let summary = h.scheduler.cycle().await.expect("cycle 2");
    assert_eq!(summary.placements, 0);

    let states = h.state.line_states();
    let home = states
        .iter()
        .find(|s| s.line_id.as_str() == "l-home")
        .expect("home state");
    assert_eq!(home.phase, LinePhase::WaitingAfterFill);

    // The implied fill counts as matched stake in the published position.
    let position = h
        .state
        .position(&"l-home".into())
        .expect("home position published");
    assert_eq!(position.total_matched, dec!(100));
}

#[tokio::test]
async fn total_matched_is_monotone_across_cycles() {
    // Observed matched stake never decreases absent cancellation.
    let mut h = standard_setup(120);
    h.scheduler.cycle().await.expect("cycle 1");

    let mut last = Decimal::ZERO;
    for step in 1..=3 {
        h.exchange
            .fill_line(&"l-home".into(), dec!(10), Utc::now());
        h.scheduler.cycle().await.expect("cycle");
        let matched = h
            .state
            .position(&"l-home".into())
            .map(|p| p.total_matched)
            .unwrap_or_default();
        assert!(matched >= last, "step {step}: {matched} < {last}");
        last = matched;
    }
    assert_eq!(last, dec!(30));
}

#[tokio::test]
async fn dropped_event_drops_line_state() {
    let mut h = standard_setup(120);
    h.scheduler.cycle().await.expect("cycle 1");
    assert_eq!(h.state.line_states().len(), 2);

    // The reference no longer lists the event.
    h.feed.set_events(Vec::new());
    let summary = h.scheduler.cycle().await.expect("cycle 2");
    assert_eq!(summary.lines_tracked, 0);
    assert!(h.state.line_states().is_empty());
}
