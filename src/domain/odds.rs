//! American odds arithmetic.
//!
//! American odds convention: positive `p` means a stake of 100 wins `p`;
//! negative `p` means a stake of `|p|` wins 100. Commission applies to net
//! winnings of matched bets, so the effective price of a posted wager
//! differs from its face value.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An American odds value as quoted by the reference book or the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmericanOdds(i32);

impl AmericanOdds {
    /// Create a new odds value from the raw integer price.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Get the underlying integer price.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }

    /// True when the price pays more than even money.
    #[must_use]
    pub const fn is_plus(&self) -> bool {
        self.0 > 0
    }

    /// The equal-and-opposite side of this price.
    ///
    /// To offer the reference price to exchange users, the agent posts the
    /// hedge: if the reference shows Tigers +103, we bet Rays -103 so users
    /// see Tigers +103.
    #[must_use]
    pub const fn hedge(&self) -> Self {
        Self(-self.0)
    }

    /// Effective odds after the exchange's commission on net winnings.
    ///
    /// A positive-odds winner pays `p * (1 - c)`; a negative-odds winner
    /// must risk proportionally more, `p / (1 - c)`, to reach the same net.
    /// The result is fractional and feeds the arbitrage sizing, not the
    /// wire; posted odds are snapped back to the ladder separately.
    #[must_use]
    pub fn effective(&self, commission: Decimal) -> Decimal {
        let odds = Decimal::from(self.0);
        let keep = Decimal::ONE - commission;
        if self.0 > 0 {
            odds * keep
        } else {
            odds / keep
        }
    }

    /// Implied win probability of this price.
    #[must_use]
    pub fn implied_probability(&self) -> f64 {
        let p = f64::from(self.0);
        if self.0 > 0 {
            100.0 / (p + 100.0)
        } else {
            p.abs() / (p.abs() + 100.0)
        }
    }

    /// Absolute distance to another price, in American points.
    #[must_use]
    pub const fn distance(&self, other: Self) -> i32 {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for AmericanOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

impl From<i32> for AmericanOdds {
    fn from(value: i32) -> Self {
        Self(value)
    }
}
