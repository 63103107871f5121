//! The exchange's allowed-odds ladder.
//!
//! The exchange only accepts placements at a discrete set of American odds.
//! The ladder is dense near even money and coarsens outward: single points
//! through 130, then steps of 2, 5, 20, 100, 250, and 500 out to 25000.
//! Both signs are present; 0 and the dead zone (-100, 100) are not.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::odds::AmericanOdds;

/// Odds ladder segments: (start, end inclusive, step) on the positive side.
/// The negative side mirrors these values.
const SEGMENTS: &[(i32, i32, i32)] = &[
    (100, 130, 1),
    (132, 200, 2),
    (205, 300, 5),
    (305, 500, 5),
    (520, 1000, 20),
    (1100, 2000, 100),
    (2250, 3000, 250),
    (3500, 25000, 500),
];

/// The discrete set of American-odds values the exchange accepts.
#[derive(Debug, Clone)]
pub struct OddsLadder {
    /// Sorted ascending, negative values first.
    values: Vec<i32>,
}

impl OddsLadder {
    /// Build the full ladder from the segment table.
    #[must_use]
    pub fn standard() -> Self {
        let mut values = Vec::new();
        for &(start, end, step) in SEGMENTS {
            let mut v = start;
            while v <= end {
                values.push(v);
                values.push(-v);
                v += step;
            }
        }
        values.sort_unstable();
        values.dedup();
        Self { values }
    }

    /// Number of allowed values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when `odds` is a value the exchange accepts.
    #[must_use]
    pub fn contains(&self, odds: AmericanOdds) -> bool {
        self.values.binary_search(&odds.value()).is_ok()
    }

    /// Snap a calculated (possibly fractional) price to the nearest allowed
    /// value. Ties break toward zero.
    #[must_use]
    pub fn snap(&self, calculated: Decimal) -> AmericanOdds {
        let target = calculated.to_f64().unwrap_or(0.0);

        let mut best = self.values[0];
        let mut best_dist = (f64::from(best) - target).abs();

        for &candidate in &self.values[1..] {
            let dist = (f64::from(candidate) - target).abs();
            let closer = dist < best_dist;
            let tie_toward_zero = (dist - best_dist).abs() < f64::EPSILON
                && candidate.abs() < best.abs();
            if closer || tie_toward_zero {
                best = candidate;
                best_dist = dist;
            }
        }

        AmericanOdds::new(best)
    }
}

impl Default for OddsLadder {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ladder_is_symmetric() {
        let ladder = OddsLadder::standard();
        for &v in &ladder.values {
            assert!(
                ladder.contains(AmericanOdds::new(-v)),
                "missing mirror of {v}"
            );
        }
    }

    #[test]
    fn ladder_excludes_dead_zone() {
        let ladder = OddsLadder::standard();
        assert!(!ladder.contains(AmericanOdds::new(0)));
        assert!(!ladder.contains(AmericanOdds::new(99)));
        assert!(!ladder.contains(AmericanOdds::new(-50)));
    }

    #[test]
    fn snap_returns_member_values() {
        let ladder = OddsLadder::standard();
        for raw in [dec!(116.4), dec!(-113.4), dec!(147.3), dec!(-2101)] {
            let snapped = ladder.snap(raw);
            assert!(ladder.contains(snapped), "snap({raw}) = {snapped} not in ladder");
        }
    }

    #[test]
    fn snap_is_idempotent() {
        let ladder = OddsLadder::standard();
        for raw in [dec!(116.4), dec!(-113.4), dec!(301), dec!(-999)] {
            let once = ladder.snap(raw);
            let twice = ladder.snap(Decimal::from(once.value()));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn snap_exact_member_is_identity() {
        let ladder = OddsLadder::standard();
        assert_eq!(ladder.snap(dec!(120)).value(), 120);
        assert_eq!(ladder.snap(dec!(-205)).value(), -205);
    }

    #[test]
    fn snap_ties_break_toward_zero() {
        let ladder = OddsLadder::standard();
        // 131 is equidistant between 130 and 132; 130 is closer to zero.
        assert_eq!(ladder.snap(dec!(131)).value(), 130);
        assert_eq!(ladder.snap(dec!(-131)).value(), -130);
        // Same in the step-20 region: 530 between 520 and 540.
        assert_eq!(ladder.snap(dec!(530)).value(), 520);
    }

    #[test]
    fn snap_in_coarse_region() {
        let ladder = OddsLadder::standard();
        assert_eq!(ladder.snap(dec!(529)).value(), 520);
        assert_eq!(ladder.snap(dec!(531)).value(), 540);
    }

    #[test]
    fn snap_fractional_effective_odds() {
        let ladder = OddsLadder::standard();
        // Scenario: effective +116.40 snaps to +116, -113.40 snaps to -113.
        assert_eq!(ladder.snap(dec!(116.40)).value(), 116);
        assert_eq!(ladder.snap(dec!(-113.40)).value(), -113);
    }
}
