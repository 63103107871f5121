//! Shared application state.
//!
//! Counters and snapshots the scheduler publishes after each cycle and the
//! admin surface reads. Runtime-adjustable settings live here too: admin
//! updates apply from the next cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use super::controller::{LinePhase, LineStateView};
use super::pairing::PairingOutcome;
use super::position::LinePosition;
use crate::domain::id::LineId;
use crate::domain::pricing::PricingTarget;

/// Counter pair for attempted/succeeded/failed operations.
#[derive(Debug, Default)]
pub struct OpCounters {
    pub attempted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

impl OpCounters {
    pub fn attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeed(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fail(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OpCountersView {
        OpCountersView {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpCountersView {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Settings the admin surface may change while the agent runs.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSettings {
    pub poll_interval_seconds: u64,
    pub base_plus_stake: Decimal,
    pub cool_down_seconds: u64,
}

/// Aggregate statistics exposed by the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub running: bool,
    pub cycles_completed: u64,
    pub placements: OpCountersView,
    pub cancellations: OpCountersView,
    pub markets_skipped: u64,
    pub lines_by_phase: HashMap<String, usize>,
    pub last_errors: HashMap<String, String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub settings: RuntimeSettings,
}

/// Shared state between the scheduler and the admin surface.
pub struct AppState {
    /// Scheduler gate; cycles are skipped while false.
    running: AtomicBool,
    pub cycles_completed: AtomicU64,
    pub placements: OpCounters,
    pub cancellations: OpCounters,
    pub markets_skipped: AtomicU64,
    last_cycle_at: RwLock<Option<DateTime<Utc>>>,
    /// Most recent error per subsystem label.
    last_errors: RwLock<HashMap<&'static str, String>>,
    settings: RwLock<RuntimeSettings>,
    /// Snapshots refreshed at the end of each cycle.
    pairings: RwLock<Vec<PairingOutcome>>,
    targets: RwLock<HashMap<LineId, PricingTarget>>,
    positions: RwLock<HashMap<LineId, LinePosition>>,
    line_states: RwLock<Vec<LineStateView>>,
    phases: RwLock<HashMap<LineId, LinePhase>>,
}

impl AppState {
    #[must_use]
    pub fn new(settings: RuntimeSettings, start_running: bool) -> Self {
        Self {
            running: AtomicBool::new(start_running),
            cycles_completed: AtomicU64::new(0),
            placements: OpCounters::default(),
            cancellations: OpCounters::default(),
            markets_skipped: AtomicU64::new(0),
            last_cycle_at: RwLock::new(None),
            last_errors: RwLock::new(HashMap::new()),
            settings: RwLock::new(settings),
            pairings: RwLock::new(Vec::new()),
            targets: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            line_states: RwLock::new(Vec::new()),
            phases: RwLock::new(HashMap::new()),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn record_error(&self, subsystem: &'static str, error: impl ToString) {
        self.last_errors
            .write()
            .insert(subsystem, error.to_string());
    }

    pub fn complete_cycle(&self, at: DateTime<Utc>) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle_at.write() = Some(at);
    }

    #[must_use]
    pub fn settings(&self) -> RuntimeSettings {
        self.settings.read().clone()
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut RuntimeSettings)) -> RuntimeSettings {
        let mut settings = self.settings.write();
        update(&mut settings);
        settings.clone()
    }

    pub fn publish_pairings(&self, outcomes: Vec<PairingOutcome>) {
        *self.pairings.write() = outcomes;
    }

    #[must_use]
    pub fn pairings(&self) -> Vec<PairingOutcome> {
        self.pairings.read().clone()
    }

    /// Publish the resolved line map with its pricing targets.
    pub fn publish_targets(&self, targets: HashMap<LineId, PricingTarget>) {
        *self.targets.write() = targets;
    }

    #[must_use]
    pub fn targets(&self) -> HashMap<LineId, PricingTarget> {
        self.targets.read().clone()
    }

    pub fn publish_positions(&self, positions: HashMap<LineId, LinePosition>) {
        *self.positions.write() = positions;
    }

    #[must_use]
    pub fn positions(&self) -> HashMap<LineId, LinePosition> {
        self.positions.read().clone()
    }

    #[must_use]
    pub fn position(&self, line_id: &LineId) -> Option<LinePosition> {
        self.positions.read().get(line_id).cloned()
    }

    pub fn publish_line_states(
        &self,
        views: Vec<LineStateView>,
        phases: HashMap<LineId, LinePhase>,
    ) {
        *self.line_states.write() = views;
        *self.phases.write() = phases;
    }

    #[must_use]
    pub fn line_states(&self) -> Vec<LineStateView> {
        self.line_states.read().clone()
    }

    /// Aggregate view for `GET /stats`.
    #[must_use]
    pub fn stats(&self) -> StatsView {
        let mut lines_by_phase: HashMap<String, usize> = HashMap::new();
        for phase in self.phases.read().values() {
            *lines_by_phase.entry(phase.to_string()).or_default() += 1;
        }

        StatsView {
            running: self.is_running(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            placements: self.placements.snapshot(),
            cancellations: self.cancellations.snapshot(),
            markets_skipped: self.markets_skipped.load(Ordering::Relaxed),
            lines_by_phase,
            last_errors: self
                .last_errors
                .read()
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            last_cycle_at: *self.last_cycle_at.read(),
            settings: self.settings(),
        }
    }
}
