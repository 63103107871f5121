//! Market resolver: maps reference outcomes to exchange line ids.
//!
//! Only the exchange's main game-lines category is considered; period
//! markets and props are ignored. A line with no current quote is still
//! usable — its line_id is valid and posting into it is first-liquidity
//! market making. A market is ready when both outcomes resolve.

use serde::Serialize;
use tracing::debug;

use super::names;
use crate::domain::event::{Outcome, ReferenceEvent, ReferenceMarket};
use crate::domain::market::{ExchangeLine, ExchangeMarket, LineRef, MarketKind, OverUnder};

/// Category label carried by replicable markets in the exchange tree.
pub const GAME_LINES_CATEGORY: &str = "Game Lines";

/// Minimum selection-name similarity for a moneyline or spread match.
const NAME_MATCH_THRESHOLD: f64 = 0.8;

/// Point equality tolerance for spreads and totals.
const POINT_TOLERANCE: f64 = 0.1;

/// One reference outcome bound to an exchange line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeMapping {
    pub reference_outcome: Outcome,
    pub line: LineRef,
    /// True when the exchange currently shows no quote on the line.
    pub unquoted: bool,
}

/// Issues found while mapping, split by severity.
///
/// Blocking issues prevent replication of the market; opportunities are
/// informational (an unquoted line is a chance to be first in the book).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "severity", rename_all = "snake_case")]
pub enum MappingIssue {
    Blocking { detail: String },
    Opportunity { detail: String },
}

impl MappingIssue {
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking { .. })
    }
}

/// Mapping result for one reference market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedMarket {
    pub kind: MarketKind,
    /// Both outcomes in reference order; `None` where no line matched.
    pub outcomes: Vec<Option<OutcomeMapping>>,
    pub issues: Vec<MappingIssue>,
}

impl MappedMarket {
    /// Ready when every reference outcome resolved to a line_id.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(Option::is_some)
    }
}

/// Per-event mapping result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMap {
    pub markets: Vec<MappedMarket>,
}

impl LineMap {
    /// Markets whose every outcome has a line.
    pub fn ready_markets(&self) -> impl Iterator<Item = &MappedMarket> {
        self.markets.iter().filter(|m| m.is_ready())
    }
}

/// Maps reference market outcomes onto the exchange's line identifiers.
#[derive(Debug, Clone, Default)]
pub struct MarketResolver;

impl MarketResolver {
    /// Map every replicated market of a paired event.
    ///
    /// `markets` is the full exchange tree for the paired exchange event;
    /// the game-lines restriction happens here.
    #[must_use]
    pub fn map_event(
        &self,
        reference: &ReferenceEvent,
        markets: &[ExchangeMarket],
    ) -> LineMap {
        let game_lines: Vec<&ExchangeMarket> = markets
            .iter()
            .filter(|m| m.category == GAME_LINES_CATEGORY)
            .collect();

        let mut mapped = Vec::new();
        for kind in MarketKind::all() {
            let Some(market) = reference.market(kind) else {
                continue;
            };
            mapped.push(self.map_market(reference, market, kind, &game_lines));
        }

        debug!(
            event = %reference.display_name(),
            markets = mapped.len(),
            ready = mapped.iter().filter(|m| m.is_ready()).count(),
            "Mapped event markets"
        );

        LineMap { markets: mapped }
    }

    fn map_market(
        &self,
        reference: &ReferenceEvent,
        market: &ReferenceMarket,
        kind: MarketKind,
        game_lines: &[&ExchangeMarket],
    ) -> MappedMarket {
        let Some(exchange_market) = game_lines.iter().find(|m| m.kind == Some(kind)) else {
            return MappedMarket {
                kind,
                outcomes: Vec::new(),
                issues: vec![MappingIssue::Blocking {
                    detail: format!("no {kind} market in game lines"),
                }],
            };
        };

        let mut outcomes = Vec::with_capacity(market.outcomes.len());
        let mut issues = Vec::new();

        for outcome in &market.outcomes {
            let matched = match kind {
                MarketKind::Moneyline => {
                    self.find_by_name(&outcome.name, &exchange_market.lines)
                }
                MarketKind::Spread => {
                    self.find_spread(&outcome.name, outcome.point, &exchange_market.lines)
                }
                MarketKind::Total => self.find_total(&outcome.name, outcome.point, &exchange_market.lines),
            };

            match matched {
                Some(line) => {
                    if !line.is_quoted() {
                        issues.push(MappingIssue::Opportunity {
                            detail: format!(
                                "{} line {} has no current quote",
                                kind,
                                line.line_id.tail()
                            ),
                        });
                    }
                    outcomes.push(Some(OutcomeMapping {
                        reference_outcome: outcome.clone(),
                        unquoted: !line.is_quoted(),
                        line: Self::line_ref(kind, outcome, line),
                    }));
                }
                None => {
                    issues.push(MappingIssue::Blocking {
                        detail: format!(
                            "no {} line for {} ({})",
                            kind,
                            outcome.name,
                            reference.display_name()
                        ),
                    });
                    outcomes.push(None);
                }
            }
        }

        MappedMarket {
            kind,
            outcomes,
            issues,
        }
    }

    /// Best selection-name match above the similarity floor, quoted or not.
    fn find_by_name<'a>(
        &self,
        outcome_name: &str,
        lines: &'a [ExchangeLine],
    ) -> Option<&'a ExchangeLine> {
        Self::best_name_match(outcome_name, lines.iter())
    }

    /// Spread lines must agree on the point before names are compared.
    fn find_spread<'a>(
        &self,
        outcome_name: &str,
        point: Option<f64>,
        lines: &'a [ExchangeLine],
    ) -> Option<&'a ExchangeLine> {
        let point = point?;
        Self::best_name_match(
            outcome_name,
            lines
                .iter()
                .filter(|line| line.point.is_some_and(|p| (p - point).abs() <= POINT_TOLERANCE)),
        )
    }

    fn best_name_match<'a>(
        outcome_name: &str,
        lines: impl Iterator<Item = &'a ExchangeLine>,
    ) -> Option<&'a ExchangeLine> {
        let normalized = names::normalize(outcome_name);
        let mut best: Option<(&ExchangeLine, f64)> = None;

        for line in lines {
            let score = names::similarity(&normalized, &names::normalize(&line.selection_name));
            if score >= NAME_MATCH_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                best = Some((line, score));
            }
        }

        best.map(|(line, _)| line)
    }

    /// Totals match on Over/Under plus point equality.
    fn find_total<'a>(
        &self,
        outcome_name: &str,
        point: Option<f64>,
        lines: &'a [ExchangeLine],
    ) -> Option<&'a ExchangeLine> {
        let point = point?;
        let wanted = outcome_name.trim().to_lowercase();

        lines.iter().find(|line| {
            let name = line.selection_name.to_lowercase();
            let name_match = (wanted == "over" && name.contains("over"))
                || (wanted == "under" && name.contains("under"));
            let point_match = line.point.is_some_and(|p| (p - point).abs() <= POINT_TOLERANCE);
            name_match && point_match
        })
    }

    fn line_ref(kind: MarketKind, outcome: &Outcome, line: &ExchangeLine) -> LineRef {
        match kind {
            MarketKind::Moneyline => LineRef::Moneyline {
                line_id: line.line_id.clone(),
                selection: line.selection_name.clone(),
            },
            MarketKind::Spread => LineRef::Spread {
                line_id: line.line_id.clone(),
                selection: line.selection_name.clone(),
                point: line.point.or(outcome.point).unwrap_or_default(),
            },
            MarketKind::Total => LineRef::Total {
                line_id: line.line_id.clone(),
                side: if outcome.name.trim().eq_ignore_ascii_case("over") {
                    OverUnder::Over
                } else {
                    OverUnder::Under
                },
                point: line.point.or(outcome.point).unwrap_or_default(),
            },
        }
    }
}
