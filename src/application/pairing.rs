//! Event resolver: pairs reference events with exchange events.
//!
//! Confidence is 40% start-time proximity and 60% team-name similarity,
//! with both home/away orientations tried. A manual-override map bypasses
//! scoring entirely. Below-threshold candidates produce an explicit
//! no-match rather than a wrong pairing.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::names;
use crate::domain::event::{ExchangeEvent, ReferenceEvent};
use crate::domain::id::{ExchangeEventId, ReferenceEventId};

/// A confirmed identification of one reference event with one exchange event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPairing {
    pub reference_event_id: ReferenceEventId,
    pub exchange_event_id: ExchangeEventId,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of attempting to pair one reference event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairingOutcome {
    Paired(EventPairing),
    NoMatch {
        reference_event_id: ReferenceEventId,
        reason: String,
        best_score: f64,
    },
}

impl PairingOutcome {
    #[must_use]
    pub fn pairing(&self) -> Option<&EventPairing> {
        match self {
            Self::Paired(pairing) => Some(pairing),
            Self::NoMatch { .. } => None,
        }
    }
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Minimum confidence to accept a pairing. Exactly at threshold passes.
    pub confidence_threshold: f64,
    /// Maximum start-time difference before a candidate is rejected outright.
    pub time_tolerance: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            time_tolerance: Duration::minutes(15),
        }
    }
}

/// Pairs reference events to exchange events.
///
/// Shared between the scheduler (resolution each cycle) and the admin
/// surface (override management, pairing inspection), so mutable state
/// lives behind locks.
pub struct EventResolver {
    config: RwLock<PairingConfig>,
    overrides: RwLock<HashMap<ReferenceEventId, ExchangeEventId>>,
    /// Last resolution results, replaced wholesale each cycle.
    outcomes: RwLock<Vec<PairingOutcome>>,
}

impl EventResolver {
    #[must_use]
    pub fn new(config: PairingConfig) -> Self {
        Self {
            config: RwLock::new(config),
            overrides: RwLock::new(HashMap::new()),
            outcomes: RwLock::new(Vec::new()),
        }
    }

    /// Resolve pairings for a full reference snapshot.
    ///
    /// Results are cached for the admin surface and returned. Pairings may
    /// change between cycles as reference data updates.
    pub fn resolve(
        &self,
        reference: &[ReferenceEvent],
        exchange: &[ExchangeEvent],
    ) -> Vec<PairingOutcome> {
        let results: Vec<PairingOutcome> = reference
            .iter()
            .map(|event| self.resolve_one(event, exchange))
            .collect();

        let paired = results.iter().filter(|r| r.pairing().is_some()).count();
        info!(
            reference_events = reference.len(),
            exchange_events = exchange.len(),
            paired,
            "Event resolution complete"
        );

        *self.outcomes.write() = results.clone();
        results
    }

    fn resolve_one(
        &self,
        reference: &ReferenceEvent,
        exchange: &[ExchangeEvent],
    ) -> PairingOutcome {
        // Manual overrides short-circuit scoring with full confidence.
        if let Some(&target) = self.overrides.read().get(&reference.id) {
            if let Some(event) = exchange.iter().find(|e| e.id == target) {
                return PairingOutcome::Paired(EventPairing {
                    reference_event_id: reference.id.clone(),
                    exchange_event_id: event.id,
                    confidence: 1.0,
                    reasons: vec!["manual override".into()],
                    created_at: Utc::now(),
                });
            }
        }

        let config = self.config.read().clone();
        let mut best: Option<(&ExchangeEvent, f64, Vec<String>)> = None;

        for candidate in exchange {
            let Some((score, reasons)) = self.confidence(reference, candidate, &config) else {
                continue;
            };
            if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                best = Some((candidate, score, reasons));
            }
        }

        match best {
            Some((event, score, reasons)) if score >= config.confidence_threshold => {
                debug!(
                    reference = %reference.display_name(),
                    exchange = %event.display_name(),
                    confidence = score,
                    "Paired events"
                );
                PairingOutcome::Paired(EventPairing {
                    reference_event_id: reference.id.clone(),
                    exchange_event_id: event.id,
                    confidence: score,
                    reasons,
                    created_at: Utc::now(),
                })
            }
            Some((_, score, _)) => PairingOutcome::NoMatch {
                reference_event_id: reference.id.clone(),
                reason: format!(
                    "best confidence {score:.3} below threshold {:.1}",
                    config.confidence_threshold
                ),
                best_score: score,
            },
            None => PairingOutcome::NoMatch {
                reference_event_id: reference.id.clone(),
                reason: "no candidate within time tolerance".into(),
                best_score: 0.0,
            },
        }
    }

    /// Score one candidate. Returns `None` when the start times are too far
    /// apart to consider at all.
    fn confidence(
        &self,
        reference: &ReferenceEvent,
        candidate: &ExchangeEvent,
        config: &PairingConfig,
    ) -> Option<(f64, Vec<String>)> {
        let diff = (reference.commence_time - candidate.commence_time)
            .num_seconds()
            .abs();
        let diff_minutes = diff as f64 / 60.0;
        if diff > config.time_tolerance.num_seconds() {
            return None;
        }

        let time_score = if diff_minutes <= 5.0 {
            1.0
        } else if diff_minutes <= 10.0 {
            0.9
        } else {
            0.7
        };

        let team_score = team_score(reference, candidate);
        let confidence = (time_score * 0.4 + team_score * 0.6).min(1.0);

        let reasons = vec![
            format!("time score {time_score:.2} ({diff_minutes:.1} min apart)"),
            format!("team score {team_score:.2}"),
        ];
        Some((confidence, reasons))
    }

    /// Add a manual override mapping. Takes effect on the next resolution.
    pub fn add_override(&self, reference: ReferenceEventId, exchange: ExchangeEventId) {
        info!(reference = %reference, exchange = %exchange, "Manual override added");
        self.overrides.write().insert(reference, exchange);
    }

    /// Remove a manual override. Returns true when one existed.
    pub fn remove_override(&self, reference: &ReferenceEventId) -> bool {
        let removed = self.overrides.write().remove(reference).is_some();
        if removed {
            info!(reference = %reference, "Manual override removed");
        }
        removed
    }

    /// Overrides currently in effect.
    #[must_use]
    pub fn overrides(&self) -> HashMap<ReferenceEventId, ExchangeEventId> {
        self.overrides.read().clone()
    }

    /// Results of the most recent resolution.
    #[must_use]
    pub fn latest_outcomes(&self) -> Vec<PairingOutcome> {
        self.outcomes.read().clone()
    }

    /// Update the acceptance threshold and drop cached results, since the
    /// criteria changed.
    pub fn set_confidence_threshold(&self, threshold: f64) {
        self.config.write().confidence_threshold = threshold;
        self.outcomes.write().clear();
    }
}

/// Team-name similarity across both orientations; the better one wins.
fn team_score(reference: &ReferenceEvent, candidate: &ExchangeEvent) -> f64 {
    let ref_home = names::normalize(&reference.home);
    let ref_away = names::normalize(&reference.away);
    let ex_home = names::normalize(&candidate.home);
    let ex_away = names::normalize(&candidate.away);

    let straight = (names::similarity(&ref_home, &ex_home)
        + names::similarity(&ref_away, &ex_away))
        / 2.0;
    let swapped = (names::similarity(&ref_home, &ex_away)
        + names::similarity(&ref_away, &ex_home))
        / 2.0;

    straight.max(swapped)
}
