//! HTTP client for the odds-aggregator API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::dto::FeedEvent;
use crate::domain::event::ReferenceEvent;
use crate::domain::market::MarketKind;
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::ReferenceConfig;
use crate::port::outbound::feed::{FeedUsage, ReferenceFeed};

/// Client for the metered odds-aggregator REST API.
///
/// Enforces a minimum inter-request interval and tracks credit
/// consumption. Each snapshot request costs one credit per market kind
/// per region on the upstream plan.
pub struct OddsApiClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    sport_key: String,
    bookmaker: String,
    markets: Vec<MarketKind>,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    requests_made: AtomicU64,
    credits_used: AtomicU64,
}

impl OddsApiClient {
    #[must_use]
    pub fn from_config(config: &ReferenceConfig, timeout: Duration) -> Self {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sport_key: config.sport_key.clone(),
            bookmaker: config.bookmaker.clone(),
            markets: config.markets.clone(),
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: Mutex::new(None),
            requests_made: AtomicU64::new(0),
            credits_used: AtomicU64::new(0),
        }
    }

    /// Market kinds as the feed's comma-separated market keys.
    fn market_keys(&self) -> String {
        self.markets
            .iter()
            .map(|kind| match kind {
                MarketKind::Moneyline => "h2h",
                MarketKind::Spread => "spreads",
                MarketKind::Total => "totals",
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Sleep as needed to honor the inter-request interval.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let since = at.elapsed();
            if since < self.min_request_interval {
                sleep(self.min_request_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn retry_after(response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Duration::from_secs(60), Duration::from_secs)
    }
}

#[async_trait]
impl ReferenceFeed for OddsApiClient {
    async fn fetch_events(&self) -> Result<Vec<ReferenceEvent>> {
        self.pace().await;

        let url = format!("{}/v4/sports/{}/odds", self.base_url, self.sport_key);
        debug!(url = %url, markets = %self.market_keys(), "Fetching reference odds");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", "us"),
                ("markets", &self.market_keys()),
                ("oddsFormat", "american"),
                ("dateFormat", "iso"),
                ("bookmakers", &self.bookmaker),
            ])
            .send()
            .await?;

        self.requests_made.fetch_add(1, Ordering::Relaxed);

        match response.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::RateLimited {
                    retry_after: Self::retry_after(&response),
                });
            }
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Auth("reference feed rejected the API key".into()));
            }
            StatusCode::PAYMENT_REQUIRED => {
                return Err(Error::Auth("reference feed credits exhausted".into()));
            }
            status => {
                return Err(Error::Api {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
        }

        // One credit per requested market kind.
        self.credits_used
            .fetch_add(self.markets.len() as u64, Ordering::Relaxed);

        let raw: Vec<FeedEvent> = response.json().await?;
        let total = raw.len();
        let events: Vec<ReferenceEvent> = raw
            .into_iter()
            .filter_map(|event| event.into_reference(&self.bookmaker, &self.markets))
            .collect();

        info!(
            total,
            with_reference_odds = events.len(),
            bookmaker = %self.bookmaker,
            "Reference snapshot fetched"
        );
        Ok(events)
    }

    fn usage(&self) -> FeedUsage {
        FeedUsage {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            credits_used: self.credits_used.load(Ordering::Relaxed),
        }
    }
}
