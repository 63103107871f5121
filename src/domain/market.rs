//! Exchange market structure and resolved line references.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::LineId;
use super::odds::AmericanOdds;

/// The market kinds this agent replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
}

impl MarketKind {
    /// Stable label used in logs and the admin API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moneyline => "moneyline",
            Self::Spread => "spread",
            Self::Total => "total",
        }
    }

    /// All replicated kinds, in a stable order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Moneyline, Self::Spread, Self::Total]
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Over/Under side of a totals line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverUnder {
    Over,
    Under,
}

impl OverUnder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Over => "Over",
            Self::Under => "Under",
        }
    }
}

/// One bettable selection on an exchange market.
///
/// `odds` is nullable: a line with no current quote still carries a valid
/// `line_id` and is a market-making opportunity, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeLine {
    pub line_id: LineId,
    pub selection_name: String,
    pub odds: Option<AmericanOdds>,
    pub point: Option<f64>,
}

impl ExchangeLine {
    /// True when the exchange currently shows a quote on this line.
    #[must_use]
    pub fn is_quoted(&self) -> bool {
        self.odds.is_some()
    }
}

/// One market in the exchange's market tree for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMarket {
    pub market_id: String,
    pub name: String,
    pub kind: Option<MarketKind>,
    /// Category label from the exchange; only the main game-lines category
    /// is considered for replication.
    pub category: String,
    pub lines: Vec<ExchangeLine>,
}

/// A resolved reference to one exchange line, tagged by market kind.
///
/// Carries a point only where one exists: moneylines have none, spreads and
/// totals always do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineRef {
    Moneyline {
        line_id: LineId,
        selection: String,
    },
    Spread {
        line_id: LineId,
        selection: String,
        point: f64,
    },
    Total {
        line_id: LineId,
        side: OverUnder,
        point: f64,
    },
}

impl LineRef {
    #[must_use]
    pub fn line_id(&self) -> &LineId {
        match self {
            Self::Moneyline { line_id, .. }
            | Self::Spread { line_id, .. }
            | Self::Total { line_id, .. } => line_id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> MarketKind {
        match self {
            Self::Moneyline { .. } => MarketKind::Moneyline,
            Self::Spread { .. } => MarketKind::Spread,
            Self::Total { .. } => MarketKind::Total,
        }
    }

    #[must_use]
    pub const fn point(&self) -> Option<f64> {
        match self {
            Self::Moneyline { .. } => None,
            Self::Spread { point, .. } | Self::Total { point, .. } => Some(*point),
        }
    }

    /// Selection label for logs and the admin API.
    #[must_use]
    pub fn selection(&self) -> &str {
        match self {
            Self::Moneyline { selection, .. } | Self::Spread { selection, .. } => selection,
            Self::Total { side, .. } => side.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moneyline_ref_has_no_point() {
        let line = LineRef::Moneyline {
            line_id: LineId::new("l1"),
            selection: "Detroit Tigers".into(),
        };
        assert_eq!(line.kind(), MarketKind::Moneyline);
        assert_eq!(line.point(), None);
        assert_eq!(line.selection(), "Detroit Tigers");
    }

    #[test]
    fn spread_ref_carries_point() {
        let line = LineRef::Spread {
            line_id: LineId::new("l2"),
            selection: "Tampa Bay Rays".into(),
            point: -1.5,
        };
        assert_eq!(line.point(), Some(-1.5));
    }

    #[test]
    fn total_ref_selection_is_side_label() {
        let line = LineRef::Total {
            line_id: LineId::new("l3"),
            side: OverUnder::Under,
            point: 8.5,
        };
        assert_eq!(line.selection(), "Under");
        assert_eq!(line.point(), Some(8.5));
    }

    #[test]
    fn unquoted_line_is_not_quoted() {
        let line = ExchangeLine {
            line_id: LineId::new("l4"),
            selection_name: "Over".into(),
            odds: None,
            point: Some(8.5),
        };
        assert!(!line.is_quoted());
    }

    #[test]
    fn market_kind_labels() {
        assert_eq!(MarketKind::Moneyline.as_str(), "moneyline");
        assert_eq!(MarketKind::all().len(), 3);
    }
}
