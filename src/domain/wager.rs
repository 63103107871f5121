//! Canonical wager record.
//!
//! The exchange is authoritative for wager state. Records are never mutated
//! locally; the position store only refreshes and summarizes them. Payload
//! variant knowledge lives in the exchange adapter's DTO module; everything
//! else sees this shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::LineId;
use super::odds::AmericanOdds;

/// Lifecycle status of a wager on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Open,
    Cancelled,
    Expired,
    Settled,
    Void,
}

impl WagerStatus {
    /// True when the wager can still match additional stake.
    #[must_use]
    pub const fn can_match(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// How much of the wager's stake has been matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStatus {
    Unmatched,
    PartiallyMatched,
    FullyMatched,
}

/// One wager as reported by the exchange's wager-history API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerRecord {
    /// Server-issued wager id.
    pub wager_id: String,
    /// Client idempotency key attached at placement.
    pub external_id: String,
    pub line_id: LineId,
    pub odds: AmericanOdds,
    pub stake: Decimal,
    pub matched_stake: Decimal,
    pub status: WagerStatus,
    pub matching_status: MatchingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WagerRecord {
    /// Stake still resting in the book, able to match.
    #[must_use]
    pub fn unmatched_stake(&self) -> Decimal {
        if self.status.can_match() {
            self.stake - self.matched_stake
        } else {
            Decimal::ZERO
        }
    }

    /// True when this record is an open wager with unmatched stake.
    #[must_use]
    pub fn is_resting(&self) -> bool {
        self.status.can_match()
            && matches!(
                self.matching_status,
                MatchingStatus::Unmatched | MatchingStatus::PartiallyMatched
            )
    }

    /// True when any stake has matched.
    #[must_use]
    pub fn has_fill(&self) -> bool {
        self.matched_stake > Decimal::ZERO
    }
}
