//! Arbitrage pricing for two-outcome markets.
//!
//! For each reference market the engine posts the hedge of both reference
//! prices, adjusted for commission and snapped to the exchange ladder, with
//! stakes sized so the two sides lock in a small guaranteed profit when
//! both fill. Invalid inputs never panic; they produce a [`SkipReason`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::event::Outcome;
use super::ladder::OddsLadder;
use super::market::{LineRef, MarketKind};
use super::odds::AmericanOdds;

/// Which side of the arbitrage pair a target belongs to.
///
/// Sides are classified by the sign of the post-commission effective odds,
/// not the raw reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Plus,
    Minus,
}

/// Why a market produced no targets this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Both effective odds landed on the same side of zero.
    BothSameSign,
    /// The arbitrage locks in a loss after commission.
    Unprofitable,
    /// An outcome could not be bound to an exchange line.
    MissingLineId,
    /// The reference market does not have exactly two outcomes.
    FewerThanTwoOutcomes,
}

impl SkipReason {
    /// Stable label used in logs and skip counters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BothSameSign => "both_same_sign",
            Self::Unprofitable => "unprofitable",
            Self::MissingLineId => "missing_line_id",
            Self::FewerThanTwoOutcomes => "fewer_than_two_outcomes",
        }
    }
}

/// Stake pair locking in a guaranteed margin across both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageSizing {
    pub plus_stake: Decimal,
    pub minus_stake: Decimal,
    pub total_investment: Decimal,
    pub guaranteed_profit: Decimal,
    /// Profit as a percentage of total investment.
    pub profit_margin: Decimal,
}

impl ArbitrageSizing {
    /// Size both stakes from the effective (post-commission) odds.
    ///
    /// The plus side always stakes the base amount; the minus stake scales
    /// so its risk matches the plus side's win. The book is profitable when
    /// the two effective prices imply probabilities summing below one; the
    /// guaranteed profit is that margin over the total outlay.
    #[must_use]
    pub fn compute(eff_plus: Decimal, eff_minus: Decimal, base_plus_stake: Decimal) -> Self {
        let hundred = Decimal::ONE_HUNDRED;
        let plus_stake = base_plus_stake;
        let plus_win = plus_stake * eff_plus / hundred;
        let minus_stake = plus_win / (eff_minus.abs() / hundred);
        let total_investment = plus_stake + minus_stake;

        let implied_plus = hundred / (eff_plus + hundred);
        let implied_minus = eff_minus.abs() / (eff_minus.abs() + hundred);
        let margin = Decimal::ONE - (implied_plus + implied_minus);

        Self {
            plus_stake,
            minus_stake,
            total_investment,
            guaranteed_profit: total_investment * margin,
            profit_margin: margin * hundred,
        }
    }

    /// True when both fills together clear a positive margin.
    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.guaranteed_profit > Decimal::ZERO
    }
}

/// Position sizing limits derived from the arbitrage stakes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLimits {
    pub max_plus: Decimal,
    pub max_minus: Decimal,
    pub increment_plus: Decimal,
    pub increment_minus: Decimal,
    pub sizing: ArbitrageSizing,
}

impl PositionLimits {
    /// Derive limits from the sizing: the plus cap is the lesser of the hard
    /// cap and `base * multiplier`; the minus cap scales the arbitrage stake
    /// by the same multiplier so the book stays balanced at any fill depth.
    #[must_use]
    pub fn derive(sizing: ArbitrageSizing, config: &PricingConfig) -> Self {
        let max_plus = config
            .hard_max_plus
            .min(config.base_plus_stake * config.position_multiplier);
        let max_minus = sizing.minus_stake * config.position_multiplier;

        Self {
            max_plus,
            max_minus,
            increment_plus: config.base_plus_stake,
            increment_minus: sizing.minus_stake,
            sizing,
        }
    }
}

/// Per-line target produced by the pricing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTarget {
    pub line: LineRef,
    pub side: Side,
    /// Reference price being offered to exchange users on the other side.
    pub offered_odds: AmericanOdds,
    /// Ladder value to post our hedge wager at.
    pub odds_to_post: AmericanOdds,
    /// Unmatched stake the line should carry.
    pub target_unmatched: Decimal,
    /// Top-up step once a fill consumes liquidity.
    pub increment: Decimal,
    /// Total stake ceiling for the line.
    pub max_position: Decimal,
}

/// The two targets for one priced market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePair {
    pub kind: MarketKind,
    pub plus: PricingTarget,
    pub minus: PricingTarget,
    pub limits: PositionLimits,
}

impl QuotePair {
    pub fn targets(&self) -> impl Iterator<Item = &PricingTarget> {
        [&self.plus, &self.minus].into_iter()
    }
}

/// Tunable pricing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Commission rate the exchange takes from net winnings.
    pub commission: Decimal,
    /// Stake always placed on the plus side.
    pub base_plus_stake: Decimal,
    /// Absolute ceiling for the plus side regardless of multiplier.
    pub hard_max_plus: Decimal,
    /// Max position as a multiple of the per-side base stake.
    pub position_multiplier: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            commission: Decimal::new(3, 2),
            base_plus_stake: Decimal::ONE_HUNDRED,
            hard_max_plus: Decimal::from(500),
            position_multiplier: Decimal::from(5),
        }
    }
}

/// The pricing engine: pure functions over reference outcomes and mapped
/// exchange lines.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    pub config: PricingConfig,
    pub ladder: OddsLadder,
}

impl PricingEngine {
    #[must_use]
    pub fn new(config: PricingConfig, ladder: OddsLadder) -> Self {
        Self { config, ladder }
    }

    /// Price one two-outcome market.
    ///
    /// `outcomes` are the reference prices; `lines` are the exchange lines
    /// they mapped to, in the same order. Returns the pair of targets, or a
    /// [`SkipReason`] when the market cannot be replicated this cycle.
    pub fn price_market(
        &self,
        kind: MarketKind,
        outcomes: &[Outcome],
        lines: &[Option<LineRef>],
    ) -> Result<QuotePair, SkipReason> {
        if outcomes.len() != 2 || lines.len() != 2 {
            return Err(SkipReason::FewerThanTwoOutcomes);
        }

        let commission = self.config.commission;
        let eff_a = outcomes[0].odds.hedge().effective(commission);
        let eff_b = outcomes[1].odds.hedge().effective(commission);

        // Classify sides by post-commission sign; a market where both sides
        // land on the same side of zero cannot be arbitraged.
        let (plus_idx, minus_idx) = if eff_a > Decimal::ZERO && eff_b < Decimal::ZERO {
            (0, 1)
        } else if eff_b > Decimal::ZERO && eff_a < Decimal::ZERO {
            (1, 0)
        } else {
            return Err(SkipReason::BothSameSign);
        };

        let (eff_plus, eff_minus) = if plus_idx == 0 { (eff_a, eff_b) } else { (eff_b, eff_a) };

        let sizing = ArbitrageSizing::compute(eff_plus, eff_minus, self.config.base_plus_stake);
        if !sizing.is_profitable() {
            return Err(SkipReason::Unprofitable);
        }
        let limits = PositionLimits::derive(sizing, &self.config);

        let plus_line = lines[plus_idx].clone().ok_or(SkipReason::MissingLineId)?;
        let minus_line = lines[minus_idx].clone().ok_or(SkipReason::MissingLineId)?;

        let plus = self.target(&outcomes[plus_idx], plus_line, Side::Plus, &limits);
        let minus = self.target(&outcomes[minus_idx], minus_line, Side::Minus, &limits);

        Ok(QuotePair {
            kind,
            plus,
            minus,
            limits,
        })
    }

    fn target(
        &self,
        outcome: &Outcome,
        line: LineRef,
        side: Side,
        limits: &PositionLimits,
    ) -> PricingTarget {
        let effective = outcome.odds.hedge().effective(self.config.commission);
        let odds_to_post = self.ladder.snap(effective);

        let (target_unmatched, increment, max_position) = match side {
            Side::Plus => (
                limits.sizing.plus_stake,
                limits.increment_plus,
                limits.max_plus,
            ),
            Side::Minus => (
                limits.sizing.minus_stake,
                limits.increment_minus,
                limits.max_minus,
            ),
        };

        PricingTarget {
            line,
            side,
            offered_odds: outcome.odds,
            odds_to_post,
            target_unmatched,
            increment,
            max_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::LineId;
    use rust_decimal_macros::dec;

    fn outcome(name: &str, odds: i32) -> Outcome {
        Outcome {
            name: name.into(),
            odds: AmericanOdds::new(odds),
            point: None,
        }
    }

    fn moneyline_ref(id: &str, selection: &str) -> Option<LineRef> {
        Some(LineRef::Moneyline {
            line_id: LineId::new(id),
            selection: selection.into(),
        })
    }

    fn engine() -> PricingEngine {
        PricingEngine::default()
    }

    #[test]
    fn arbitrage_sizing_matches_reference_scenario() {
        // Home -120 / Away +110: hedge Away = -110, Home = +120.
        // Effective: +120 * 0.97 = 116.40, -110 / 0.97 ~ -113.40.
        let eff_plus = AmericanOdds::new(120).effective(dec!(0.03));
        let eff_minus = AmericanOdds::new(-110).effective(dec!(0.03));
        let sizing = ArbitrageSizing::compute(eff_plus, eff_minus, dec!(100));

        assert_eq!(sizing.plus_stake, dec!(100));
        // minus_stake = 116.40 / 1.1340... ~ 102.65
        assert!(sizing.minus_stake > dec!(102.6) && sizing.minus_stake < dec!(102.7));
        assert!(sizing.is_profitable());
    }

    #[test]
    fn price_market_emits_both_targets() {
        let outcomes = [outcome("Detroit Tigers", -120), outcome("Tampa Bay Rays", 110)];
        let lines = [
            moneyline_ref("l-home", "Detroit Tigers"),
            moneyline_ref("l-away", "Tampa Bay Rays"),
        ];

        let pair = engine()
            .price_market(MarketKind::Moneyline, &outcomes, &lines)
            .expect("profitable market");

        // Home is the plus side: hedge of -120 is +120 -> effective +116.40.
        assert_eq!(pair.plus.line.line_id().as_str(), "l-home");
        assert_eq!(pair.plus.odds_to_post, AmericanOdds::new(116));
        assert_eq!(pair.plus.offered_odds, AmericanOdds::new(-120));
        assert_eq!(pair.plus.target_unmatched, dec!(100));
        assert_eq!(pair.plus.max_position, dec!(500));

        // Away hedge -110 -> effective ~ -113.40 -> snaps to -113.
        assert_eq!(pair.minus.line.line_id().as_str(), "l-away");
        assert_eq!(pair.minus.odds_to_post, AmericanOdds::new(-113));
        assert!(pair.minus.target_unmatched > dec!(102.6));
        // Minus cap is 5x the arbitrage stake.
        assert_eq!(
            pair.minus.max_position,
            pair.limits.sizing.minus_stake * dec!(5)
        );
    }

    #[test]
    fn posted_odds_are_ladder_members() {
        let engine = engine();
        let outcomes = [outcome("Home", -145), outcome("Away", 135)];
        let lines = [moneyline_ref("h", "Home"), moneyline_ref("a", "Away")];

        let pair = engine
            .price_market(MarketKind::Moneyline, &outcomes, &lines)
            .expect("priced");
        assert!(engine.ladder.contains(pair.plus.odds_to_post));
        assert!(engine.ladder.contains(pair.minus.odds_to_post));
    }

    #[test]
    fn tight_market_is_unprofitable() {
        // -105 / +100 leaves nothing after 3% commission.
        let outcomes = [outcome("Home", -105), outcome("Away", 100)];
        let lines = [moneyline_ref("h", "Home"), moneyline_ref("a", "Away")];

        let result = engine().price_market(MarketKind::Moneyline, &outcomes, &lines);
        assert_eq!(result.unwrap_err(), SkipReason::Unprofitable);
    }

    #[test]
    fn same_sign_market_is_skipped() {
        // Both hedges positive after commission: -150 and -160 reference.
        let outcomes = [outcome("Home", -150), outcome("Away", -160)];
        let lines = [moneyline_ref("h", "Home"), moneyline_ref("a", "Away")];

        let result = engine().price_market(MarketKind::Moneyline, &outcomes, &lines);
        assert_eq!(result.unwrap_err(), SkipReason::BothSameSign);
    }

    #[test]
    fn missing_line_is_skipped() {
        let outcomes = [outcome("Home", -130), outcome("Away", 120)];
        let lines = [moneyline_ref("h", "Home"), None];

        let result = engine().price_market(MarketKind::Moneyline, &outcomes, &lines);
        assert_eq!(result.unwrap_err(), SkipReason::MissingLineId);
    }

    #[test]
    fn one_outcome_market_is_skipped() {
        let outcomes = [outcome("Home", -130)];
        let lines = [moneyline_ref("h", "Home")];

        let result = engine().price_market(MarketKind::Moneyline, &outcomes, &lines);
        assert_eq!(result.unwrap_err(), SkipReason::FewerThanTwoOutcomes);
    }

    #[test]
    fn profitability_law_holds() {
        // Accepted iff the effective prices imply probabilities summing
        // below one, i.e. the dutching margin is positive.
        let engine = engine();
        for (home, away) in [(-120, 110), (-140, 130), (-105, 100), (-110, 102)] {
            let outcomes = [outcome("Home", home), outcome("Away", away)];
            let lines = [moneyline_ref("h", "Home"), moneyline_ref("a", "Away")];

            let eff_plus = AmericanOdds::new(home).hedge().effective(dec!(0.03));
            let eff_minus = AmericanOdds::new(away).hedge().effective(dec!(0.03));
            let implied_sum = dec!(100) / (eff_plus + dec!(100))
                + eff_minus.abs() / (eff_minus.abs() + dec!(100));

            match engine.price_market(MarketKind::Moneyline, &outcomes, &lines) {
                Ok(pair) => {
                    assert!(implied_sum < Decimal::ONE);
                    assert!(pair.limits.sizing.guaranteed_profit > Decimal::ZERO);
                }
                Err(SkipReason::Unprofitable) => {
                    assert!(implied_sum >= Decimal::ONE);
                }
                Err(reason) => panic!("unexpected skip: {reason:?}"),
            }
        }
    }

    #[test]
    fn hard_cap_bounds_plus_side() {
        let config = PricingConfig {
            hard_max_plus: dec!(300),
            ..PricingConfig::default()
        };
        let engine = PricingEngine::new(config, OddsLadder::standard());
        let outcomes = [outcome("Home", -130), outcome("Away", 120)];
        let lines = [moneyline_ref("h", "Home"), moneyline_ref("a", "Away")];

        let pair = engine
            .price_market(MarketKind::Moneyline, &outcomes, &lines)
            .expect("priced");
        assert_eq!(pair.plus.max_position, dec!(300));
    }
}
