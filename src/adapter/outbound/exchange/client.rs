//! HTTP client for the exchange's partner API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client as HttpClient, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::auth::AuthManager;
use super::dto::{
    Envelope, MarketsData, SportEventsData, TournamentsData, WagerHistoryData,
};
use crate::domain::event::{ExchangeEvent, Tournament};
use crate::domain::id::ExchangeEventId;
use crate::domain::market::ExchangeMarket;
use crate::domain::wager::WagerRecord;
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::ExchangeConfig;
use crate::port::outbound::exchange::{
    ExchangeApi, HistoryQuery, PlaceWager, PlacedWager, WagerLookup,
};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

/// Client for the exchange's partner REST API.
///
/// Holds the auth manager, retries transient failures with jittered
/// backoff, and re-authenticates once on a 401. In dry-run mode mutating
/// calls are logged and acknowledged with synthetic ids instead of being
/// dispatched.
pub struct ExchangeClient {
    http: HttpClient,
    base_url: String,
    auth: Arc<AuthManager>,
    dry_run: bool,
}

impl ExchangeClient {
    #[must_use]
    pub fn from_config(config: &ExchangeConfig, timeout: Duration, dry_run: bool) -> Self {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        let base_url = config.effective_base_url().trim_end_matches('/').to_string();
        let auth = Arc::new(AuthManager::new(
            http.clone(),
            base_url.clone(),
            config.access_key.clone(),
            config.secret_key.clone(),
        ));

        Self {
            http,
            base_url,
            auth,
            dry_run,
        }
    }

    /// Auth manager handle for the background refresh task.
    #[must_use]
    pub fn auth(&self) -> Arc<AuthManager> {
        Arc::clone(&self.auth)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    /// Send with auth, one 401-triggered re-auth, and transient retries.
    async fn send<T: DeserializeOwned>(&self, build: impl Fn() -> RequestBuilder) -> Result<T> {
        self.send_with(build, MAX_ATTEMPTS).await
    }

    /// Single-shot variant. Placements go through here: a transport retry
    /// would resend the same external id, and external ids are never
    /// reused across attempts.
    async fn send_once<T: DeserializeOwned>(&self, build: impl Fn() -> RequestBuilder) -> Result<T> {
        self.send_with(build, 1).await
    }

    async fn send_with<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> RequestBuilder,
        max_attempts: u32,
    ) -> Result<T> {
        let mut attempt = 0;
        let mut reauthed = false;

        loop {
            attempt += 1;
            let bearer = self.auth.bearer().await?;
            let result = build().bearer_auth(&bearer).send().await;

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    let err = Error::from(err);
                    if attempt < max_attempts && err.is_transient() {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            match response.status() {
                status if status.is_success() => return Ok(response.json().await?),
                StatusCode::UNAUTHORIZED if !reauthed => {
                    debug!("401 from exchange; re-authenticating once");
                    self.auth.invalidate().await;
                    reauthed = true;
                }
                StatusCode::NOT_FOUND => {
                    return Err(Error::Api {
                        status: 404,
                        body: String::new(),
                    });
                }
                status if status.is_server_error() && attempt < max_attempts => {
                    self.backoff(attempt).await;
                }
                status => {
                    return Err(Error::Api {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let base = BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
        let jitter = rand::thread_rng().gen_range(0..=BACKOFF_BASE_MS / 2);
        let delay = Duration::from_millis(base + jitter);
        warn!(attempt, delay_ms = delay.as_millis() as u64, "Retrying exchange call");
        sleep(delay).await;
    }
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    async fn tournaments(&self, sport: &str) -> Result<Vec<Tournament>> {
        let envelope: Envelope<TournamentsData> = self
            .send(|| self.request(Method::GET, "/partner/mm/get_tournaments"))
            .await?;

        let sport = sport.to_lowercase();
        Ok(envelope
            .data
            .tournaments
            .into_iter()
            .map(super::dto::RawTournament::into_domain)
            .filter(|t| t.sport.to_lowercase().contains(&sport))
            .collect())
    }

    async fn events(&self, tournament_id: i64) -> Result<Vec<ExchangeEvent>> {
        let envelope: Envelope<SportEventsData> = self
            .send(|| {
                self.request(Method::GET, "/partner/mm/get_sport_events")
                    .query(&[("tournament_id", tournament_id)])
            })
            .await?;

        Ok(envelope
            .data
            .sport_events
            .into_iter()
            .filter_map(super::dto::RawSportEvent::into_domain)
            .collect())
    }

    async fn markets(&self, event_id: ExchangeEventId) -> Result<Vec<ExchangeMarket>> {
        let envelope: Envelope<MarketsData> = self
            .send(|| {
                self.request(Method::GET, "/partner/v2/mm/get_markets")
                    .query(&[("event_id", event_id.value())])
            })
            .await?;

        Ok(envelope
            .data
            .markets
            .into_iter()
            .map(super::dto::RawMarket::into_domain)
            .collect())
    }

    async fn place_wager(&self, request: &PlaceWager) -> Result<PlacedWager> {
        if self.dry_run {
            info!(
                line_id = %request.line_id.tail(),
                odds = %request.odds,
                stake = %request.stake,
                external_id = %request.external_id,
                "[dry run] would place wager"
            );
            return Ok(PlacedWager {
                wager_id: format!("dry-{}", uuid::Uuid::new_v4()),
                external_id: request.external_id.clone(),
                dry_run: true,
            });
        }

        #[derive(serde::Deserialize)]
        struct Placed {
            id: String,
        }

        let envelope: Envelope<Placed> = self
            .send_once(|| {
                self.request(Method::POST, "/partner/mm/place_wager")
                    .json(&serde_json::json!({
                        "external_id": request.external_id,
                        "line_id": request.line_id.as_str(),
                        "odds": request.odds.value(),
                        "stake": request.stake,
                    }))
            })
            .await?;

        info!(
            line_id = %request.line_id.tail(),
            odds = %request.odds,
            stake = %request.stake,
            wager_id = %envelope.data.id,
            "Wager placed"
        );
        Ok(PlacedWager {
            wager_id: envelope.data.id,
            external_id: request.external_id.clone(),
            dry_run: false,
        })
    }

    async fn cancel_wager(&self, wager_id: &str) -> Result<()> {
        if self.dry_run {
            info!(wager_id = %wager_id, "[dry run] would cancel wager");
            return Ok(());
        }

        let _: serde_json::Value = self
            .send(|| {
                self.request(Method::POST, "/partner/mm/cancel_wager")
                    .json(&serde_json::json!({ "wager_id": wager_id }))
            })
            .await?;

        info!(wager_id = %wager_id, "Wager cancelled");
        Ok(())
    }

    async fn wager_histories(&self, query: &HistoryQuery) -> Result<Vec<WagerRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let envelope: Envelope<WagerHistoryData> = self
                .send(|| {
                    let mut request =
                        self.request(Method::GET, "/partner/v2/mm/get_wager_histories");
                    if let Some(from) = query.from {
                        request = request.query(&[("from", from.timestamp())]);
                    }
                    if let Some(to) = query.to {
                        request = request.query(&[("to", to.timestamp())]);
                    }
                    if let Some(status) = query.status {
                        request = request.query(&[(
                            "status",
                            serde_json::to_value(status)
                                .ok()
                                .and_then(|v| v.as_str().map(String::from))
                                .unwrap_or_default(),
                        )]);
                    }
                    if let Some(matching) = query.matching_status {
                        request = request.query(&[(
                            "matching_status",
                            serde_json::to_value(matching)
                                .ok()
                                .and_then(|v| v.as_str().map(String::from))
                                .unwrap_or_default(),
                        )]);
                    }
                    request = request.query(&[("limit", query.page_size.max(1))]);
                    if let Some(cursor) = &cursor {
                        request = request.query(&[("next_cursor", cursor.as_str())]);
                    }
                    request
                })
                .await?;

            let (wagers, next_cursor) = envelope.data.into_parts();
            records.extend(
                wagers
                    .into_iter()
                    .filter_map(super::dto::RawWager::into_domain),
            );

            match next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(records = records.len(), "Wager histories fetched");
        Ok(records)
    }

    async fn wager(&self, wager_id: &str) -> Result<WagerLookup> {
        let result: Result<Envelope<super::dto::RawWager>> = self
            .send(|| self.request(Method::GET, &format!("/partner/mm/get_wager/{wager_id}")))
            .await;

        match result {
            Ok(envelope) => match envelope.data.into_domain() {
                Some(record) => Ok(WagerLookup::Found(record)),
                None => Err(Error::Payload(format!(
                    "wager {wager_id} response missing required fields"
                ))),
            },
            Err(Error::Api { status: 404, .. }) => Ok(WagerLookup::NotFound),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::LineId;
    use crate::domain::odds::AmericanOdds;
    use rust_decimal_macros::dec;

    fn dry_client() -> ExchangeClient {
        let config = ExchangeConfig::default();
        ExchangeClient::from_config(&config, Duration::from_secs(5), true)
    }

    #[tokio::test]
    async fn dry_run_place_returns_synthetic_id() {
        let client = dry_client();
        let request = PlaceWager {
            external_id: "ext-1".into(),
            line_id: LineId::new("l-1"),
            odds: AmericanOdds::new(116),
            stake: dec!(100),
        };

        let placed = client.place_wager(&request).await.expect("dry run ok");
        assert!(placed.dry_run);
        assert!(placed.wager_id.starts_with("dry-"));
        assert_eq!(placed.external_id, "ext-1");
    }

    #[tokio::test]
    async fn dry_run_cancel_is_ok() {
        let client = dry_client();
        assert!(client.cancel_wager("w-1").await.is_ok());
    }

    #[test]
    fn base_url_has_no_trailing_slash() {
        let config = ExchangeConfig {
            base_url: Some("https://example.com/".into()),
            ..ExchangeConfig::default()
        };
        let client = ExchangeClient::from_config(&config, Duration::from_secs(5), true);
        assert_eq!(client.base_url, "https://example.com");
    }
}
