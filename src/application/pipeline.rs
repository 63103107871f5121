//! Pricing pipeline: mapped markets in, per-line targets out.
//!
//! This is the only place [`PricingTarget`]s are created; the line
//! controller never synthesizes prices.

use std::collections::HashMap;

use tracing::debug;

use super::mapping::LineMap;
use crate::domain::id::LineId;
use crate::domain::pricing::{PricingEngine, PricingTarget, SkipReason};

/// Targets for one event's lines, plus the markets skipped this cycle.
#[derive(Debug, Clone, Default)]
pub struct EventTargets {
    pub targets: HashMap<LineId, PricingTarget>,
    pub skips: Vec<SkipReason>,
}

impl EventTargets {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Run the pricing engine over every ready market in a line map.
#[must_use]
pub fn price_line_map(engine: &PricingEngine, map: &LineMap) -> EventTargets {
    let mut out = EventTargets::default();

    for market in &map.markets {
        if !market.is_ready() {
            out.skips.push(SkipReason::MissingLineId);
            continue;
        }

        let outcomes: Vec<_> = market
            .outcomes
            .iter()
            .flatten()
            .map(|m| m.reference_outcome.clone())
            .collect();
        let lines: Vec<_> = market
            .outcomes
            .iter()
            .map(|m| m.as_ref().map(|mapping| mapping.line.clone()))
            .collect();

        match engine.price_market(market.kind, &outcomes, &lines) {
            Ok(pair) => {
                for target in pair.targets() {
                    out.targets
                        .insert(target.line.line_id().clone(), target.clone());
                }
            }
            Err(reason) => {
                debug!(kind = %market.kind, reason = reason.as_str(), "Market skipped");
                out.skips.push(reason);
            }
        }
    }

    out
}
