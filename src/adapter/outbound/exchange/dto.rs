//! Wire types and tolerant parsing for the exchange's partner API.
//!
//! The exchange's payloads vary in shape: selections arrive as arrays of
//! selection groups, points may be numbers or strings, history envelopes
//! nest wagers under different keys, and timestamps mix ISO strings with
//! unix seconds. Everything is normalized to canonical domain types here;
//! nothing downstream sees a raw payload.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::domain::event::{ExchangeEvent, Tournament};
use crate::domain::id::{ExchangeEventId, LineId};
use crate::domain::market::{ExchangeLine, ExchangeMarket, MarketKind};
use crate::domain::odds::AmericanOdds;
use crate::domain::wager::{MatchingStatus, WagerRecord, WagerStatus};

/// Standard `{"data": ...}` envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub access_expire_time: i64,
    #[serde(default)]
    pub refresh_expire_time: Option<i64>,
}

// ---------------------------------------------------------------------------
// Tournaments and events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TournamentsData {
    #[serde(default)]
    pub tournaments: Vec<RawTournament>,
}

#[derive(Debug, Deserialize)]
pub struct RawTournament {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sport: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: String,
}

impl RawTournament {
    #[must_use]
    pub fn into_domain(self) -> Tournament {
        Tournament {
            id: self.id,
            name: self.name,
            sport: self.sport.map(|s| s.name).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SportEventsData {
    #[serde(default)]
    pub sport_events: Vec<RawSportEvent>,
}

/// Team names may be flat strings or nested competitor objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TeamName {
    Flat(String),
    Competitor { name: String },
}

impl TeamName {
    fn into_string(self) -> String {
        match self {
            Self::Flat(name) | Self::Competitor { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSportEvent {
    #[serde(alias = "event_id")]
    pub id: i64,
    #[serde(default)]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub home_team: Option<TeamName>,
    #[serde(default)]
    pub away_team: Option<TeamName>,
    #[serde(default)]
    pub home_competitor: Option<NamedRef>,
    #[serde(default)]
    pub away_competitor: Option<NamedRef>,
    #[serde(default)]
    pub tournament_name: String,
    #[serde(default)]
    pub status: String,
}

impl RawSportEvent {
    /// Returns `None` when the event has no usable start time.
    #[must_use]
    pub fn into_domain(self) -> Option<ExchangeEvent> {
        let commence_time = self.scheduled?;
        let home = self
            .home_team
            .map(TeamName::into_string)
            .or(self.home_competitor.map(|c| c.name))?;
        let away = self
            .away_team
            .map(TeamName::into_string)
            .or(self.away_competitor.map(|c| c.name))?;

        Some(ExchangeEvent {
            id: ExchangeEventId::new(self.id),
            home,
            away,
            commence_time,
            tournament: self.tournament_name,
            status: self.status,
        })
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MarketsData {
    #[serde(default)]
    pub markets: Vec<RawMarket>,
}

/// Points arrive as numbers or strings depending on the market.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FlexiblePoint {
    Number(f64),
    Text(String),
}

impl FlexiblePoint {
    fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSelection {
    #[serde(default)]
    pub line_id: Option<String>,
    #[serde(default, alias = "display_name")]
    pub name: String,
    #[serde(default)]
    pub odds: Option<i32>,
    #[serde(default, alias = "display_line")]
    pub line: Option<FlexiblePoint>,
}

impl RawSelection {
    fn into_line(self, default_point: Option<f64>) -> Option<ExchangeLine> {
        let line_id = self.line_id?;
        let point = self.line.as_ref().and_then(FlexiblePoint::to_f64).or(default_point);
        Some(ExchangeLine {
            line_id: LineId::new(line_id),
            selection_name: self.name,
            // Zero is the exchange's placeholder for "no quote".
            odds: self.odds.filter(|o| *o != 0).map(AmericanOdds::new),
            point: point.filter(|p| *p != 0.0),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RawMarketLine {
    #[serde(default)]
    pub line: Option<FlexiblePoint>,
    #[serde(default)]
    pub selections: Vec<Vec<RawSelection>>,
}

#[derive(Debug, Deserialize)]
pub struct RawMarket {
    pub id: serde_json::Value,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "sub_type")]
    pub r#type: String,
    #[serde(default)]
    pub category_name: String,
    /// Simple markets carry selections directly.
    #[serde(default)]
    pub selections: Vec<Vec<RawSelection>>,
    /// Complex markets nest per-point lines.
    #[serde(default)]
    pub market_lines: Vec<RawMarketLine>,
}

impl RawMarket {
    fn kind(&self) -> Option<MarketKind> {
        match self.r#type.to_lowercase().as_str() {
            "moneyline" | "h2h" => Some(MarketKind::Moneyline),
            "spread" => Some(MarketKind::Spread),
            "total" => Some(MarketKind::Total),
            _ => None,
        }
    }

    /// Flatten selection groups into lines; each group usually holds a
    /// single selection.
    #[must_use]
    pub fn into_domain(self) -> ExchangeMarket {
        let kind = self.kind();
        let mut lines = Vec::new();

        let flatten = |groups: Vec<Vec<RawSelection>>, default_point: Option<f64>, out: &mut Vec<ExchangeLine>| {
            for group in groups {
                for selection in group {
                    if let Some(line) = selection.into_line(default_point) {
                        out.push(line);
                    }
                }
            }
        };

        if self.market_lines.is_empty() {
            flatten(self.selections, None, &mut lines);
        } else {
            for market_line in self.market_lines {
                let default_point = market_line.line.as_ref().and_then(FlexiblePoint::to_f64);
                flatten(market_line.selections, default_point, &mut lines);
            }
        }

        let market_id = match self.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };

        ExchangeMarket {
            market_id,
            name: self.name,
            kind,
            category: self.category_name,
            lines,
        }
    }
}

// ---------------------------------------------------------------------------
// Wagers
// ---------------------------------------------------------------------------

/// Timestamps arrive as ISO strings or unix seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FlexibleTime {
    Iso(DateTime<Utc>),
    Unix(i64),
}

impl FlexibleTime {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Iso(at) => Some(*at),
            Self::Unix(secs) => Utc.timestamp_opt(*secs, 0).single(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawWager {
    #[serde(alias = "wager_id")]
    pub id: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub line_id: String,
    #[serde(default)]
    pub odds: i32,
    #[serde(default)]
    pub stake: Decimal,
    #[serde(default)]
    pub matched_stake: Decimal,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub matching_status: String,
    #[serde(default)]
    pub created_at: Option<FlexibleTime>,
    #[serde(default)]
    pub updated_at: Option<FlexibleTime>,
}

/// History envelopes nest the list under `wagers`, or return it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WagerHistoryData {
    Nested {
        #[serde(default)]
        wagers: Vec<RawWager>,
        #[serde(default)]
        next_cursor: Option<String>,
    },
    Bare(Vec<RawWager>),
}

impl WagerHistoryData {
    #[must_use]
    pub fn into_parts(self) -> (Vec<RawWager>, Option<String>) {
        match self {
            Self::Nested { wagers, next_cursor } => (wagers, next_cursor),
            Self::Bare(wagers) => (wagers, None),
        }
    }
}

fn parse_status(raw: &str) -> WagerStatus {
    match raw {
        "open" | "active" => WagerStatus::Open,
        "canceled" | "cancelled" | "closed" | "wiped" | "invalid" => WagerStatus::Cancelled,
        "inactive" | "expired" => WagerStatus::Expired,
        "settled" | "manually_settled" => WagerStatus::Settled,
        "void" => WagerStatus::Void,
        other => {
            warn!(status = other, "Unknown wager status; treating as cancelled");
            WagerStatus::Cancelled
        }
    }
}

fn parse_matching_status(raw: &str) -> MatchingStatus {
    match raw {
        "fully_matched" => MatchingStatus::FullyMatched,
        "partially_matched" => MatchingStatus::PartiallyMatched,
        _ => MatchingStatus::Unmatched,
    }
}

impl RawWager {
    /// Returns `None` for records without a line id; they cannot drive any
    /// per-line decision.
    #[must_use]
    pub fn into_domain(self) -> Option<WagerRecord> {
        if self.line_id.is_empty() {
            return None;
        }
        let created_at = self.created_at.as_ref().and_then(FlexibleTime::to_utc)?;
        let updated_at = self
            .updated_at
            .as_ref()
            .and_then(FlexibleTime::to_utc)
            .unwrap_or(created_at);

        Some(WagerRecord {
            wager_id: self.id,
            external_id: self.external_id,
            line_id: LineId::new(self.line_id),
            odds: AmericanOdds::new(self.odds),
            stake: self.stake,
            matched_stake: self.matched_stake,
            status: parse_status(&self.status),
            matching_status: parse_matching_status(&self.matching_status),
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn simple_market_selections_flatten() {
        let raw: RawMarket = serde_json::from_str(
            r#"{
                "id": 251,
                "name": "Moneyline",
                "type": "moneyline",
                "category_name": "Game Lines",
                "selections": [
                    [{"line_id": "l-1", "name": "Detroit Tigers", "odds": null}],
                    [{"line_id": "l-2", "name": "Tampa Bay Rays", "odds": 100}]
                ]
            }"#,
        )
        .expect("parses");

        let market = raw.into_domain();
        assert_eq!(market.kind, Some(MarketKind::Moneyline));
        assert_eq!(market.category, "Game Lines");
        assert_eq!(market.lines.len(), 2);
        assert!(market.lines[0].odds.is_none());
        assert_eq!(market.lines[1].odds, Some(AmericanOdds::new(100)));
    }

    #[test]
    fn complex_market_lines_carry_points() {
        let raw: RawMarket = serde_json::from_str(
            r#"{
                "id": 300,
                "name": "Total Runs",
                "type": "total",
                "category_name": "Game Lines",
                "market_lines": [
                    {
                        "line": 8.5,
                        "selections": [
                            [{"line_id": "t-1", "name": "Over", "odds": -105}],
                            [{"line_id": "t-2", "name": "Under", "odds": -115}]
                        ]
                    },
                    {
                        "line": "9.5",
                        "selections": [
                            [{"line_id": "t-3", "name": "Over", "odds": null}]
                        ]
                    }
                ]
            }"#,
        )
        .expect("parses");

        let market = raw.into_domain();
        assert_eq!(market.lines.len(), 3);
        assert_eq!(market.lines[0].point, Some(8.5));
        // String-typed points parse too.
        assert_eq!(market.lines[2].point, Some(9.5));
    }

    #[test]
    fn zero_odds_is_no_quote() {
        let selection = RawSelection {
            line_id: Some("l-1".into()),
            name: "Over".into(),
            odds: Some(0),
            line: None,
        };
        let line = selection.into_line(Some(8.5)).expect("line");
        assert!(line.odds.is_none());
        assert_eq!(line.point, Some(8.5));
    }

    #[test]
    fn selection_without_line_id_is_dropped() {
        let selection = RawSelection {
            line_id: None,
            name: "Over".into(),
            odds: Some(-105),
            line: None,
        };
        assert!(selection.into_line(None).is_none());
    }

    #[test]
    fn nested_history_envelope_parses() {
        let data: WagerHistoryData = serde_json::from_str(
            r#"{
                "wagers": [{
                    "id": "w-1",
                    "external_id": "ext-1",
                    "line_id": "l-1",
                    "odds": 116,
                    "stake": 100,
                    "matched_stake": 40,
                    "status": "open",
                    "matching_status": "partially_matched",
                    "created_at": "2025-06-01T18:00:00Z",
                    "updated_at": "2025-06-01T18:30:00Z"
                }],
                "next_cursor": "abc"
            }"#,
        )
        .expect("parses");

        let (wagers, cursor) = data.into_parts();
        assert_eq!(cursor.as_deref(), Some("abc"));
        let record = wagers
            .into_iter()
            .next()
            .unwrap()
            .into_domain()
            .expect("domain record");
        assert_eq!(record.stake, dec!(100));
        assert_eq!(record.matched_stake, dec!(40));
        assert_eq!(record.status, WagerStatus::Open);
        assert_eq!(record.matching_status, MatchingStatus::PartiallyMatched);
    }

    #[test]
    fn bare_history_list_parses() {
        let data: WagerHistoryData = serde_json::from_str(
            r#"[{
                "id": "w-2",
                "line_id": "l-9",
                "stake": 50,
                "status": "settled",
                "matching_status": "fully_matched",
                "created_at": 1748800000
            }]"#,
        )
        .expect("parses");

        let (wagers, cursor) = data.into_parts();
        assert!(cursor.is_none());
        let record = wagers
            .into_iter()
            .next()
            .unwrap()
            .into_domain()
            .expect("domain record");
        assert_eq!(record.status, WagerStatus::Settled);
        // Unix timestamp accepted; updated_at falls back to created_at.
        assert_eq!(record.updated_at, record.created_at);
    }

    #[test]
    fn unknown_status_degrades_to_cancelled() {
        assert_eq!(parse_status("mystery"), WagerStatus::Cancelled);
        assert_eq!(parse_status("active"), WagerStatus::Open);
    }

    #[test]
    fn event_with_competitor_objects_parses() {
        let raw: RawSportEvent = serde_json::from_str(
            r#"{
                "event_id": 42,
                "scheduled": "2025-06-01T19:00:00Z",
                "home_competitor": {"name": "Detroit Tigers"},
                "away_competitor": {"name": "Tampa Bay Rays"},
                "tournament_name": "MLB",
                "status": "not_started"
            }"#,
        )
        .expect("parses");

        let event = raw.into_domain().expect("domain event");
        assert_eq!(event.id.value(), 42);
        assert_eq!(event.home, "Detroit Tigers");
        assert_eq!(event.status, "not_started");
    }

    #[test]
    fn event_without_schedule_is_dropped() {
        let raw: RawSportEvent = serde_json::from_str(
            r#"{"id": 7, "home_team": "A", "away_team": "B"}"#,
        )
        .expect("parses");
        assert!(raw.into_domain().is_none());
    }
}
