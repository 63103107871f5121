//! Exchange authentication manager.
//!
//! Owns the access/refresh token pair. Every call path obtains a bearer
//! token through [`AuthManager::bearer`], which refreshes when inside a
//! 30 s buffer of expiry and falls back to a full login when the refresh
//! is rejected. A background task refreshes ahead of expiry so request
//! paths rarely pay the refresh latency.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client as HttpClient;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::dto::{Envelope, TokenGrant};
use crate::error::{Error, Result};

/// Refresh when an API call finds the token this close to expiry.
const EXPIRY_BUFFER: Duration = Duration::seconds(30);

/// The background task refreshes this far ahead of expiry.
const BACKGROUND_BUFFER: Duration = Duration::seconds(120);

#[derive(Debug, Clone)]
struct Tokens {
    access_token: String,
    refresh_token: Option<String>,
    access_expires_at: DateTime<Utc>,
}

impl Tokens {
    fn expires_within(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.access_expires_at
    }
}

/// Shared mutable auth state; access is serialized through one entry point.
pub struct AuthManager {
    http: HttpClient,
    base_url: String,
    access_key: String,
    secret_key: String,
    tokens: Mutex<Option<Tokens>>,
}

impl AuthManager {
    #[must_use]
    pub fn new(
        http: HttpClient,
        base_url: String,
        access_key: String,
        secret_key: String,
    ) -> Self {
        Self {
            http,
            base_url,
            access_key,
            secret_key,
            tokens: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least the expiry buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when neither a refresh nor a full login
    /// yields a token.
    pub async fn bearer(&self) -> Result<String> {
        let mut guard = self.tokens.lock().await;

        if let Some(tokens) = guard.as_ref() {
            if !tokens.expires_within(EXPIRY_BUFFER) {
                return Ok(tokens.access_token.clone());
            }
        }

        self.renew_locked(&mut guard).await?;
        guard
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| Error::Auth("no access token after renewal".into()))
    }

    /// Drop the current token; the next call re-authenticates. Used after
    /// a 401 on an API call.
    pub async fn invalidate(&self) {
        *self.tokens.lock().await = None;
    }

    async fn renew_locked(&self, guard: &mut Option<Tokens>) -> Result<()> {
        if let Some(tokens) = guard.as_ref() {
            if let Some(refresh_token) = tokens.refresh_token.clone() {
                match self.refresh(&refresh_token).await {
                    Ok(grant) => {
                        debug!("Access token refreshed");
                        let refresh_token = grant
                            .refresh_token
                            .clone()
                            .or(Some(refresh_token));
                        *guard = Some(Self::tokens_from(grant, refresh_token));
                        return Ok(());
                    }
                    Err(err) => {
                        warn!(error = %err, "Token refresh failed; re-authenticating");
                    }
                }
            }
        }

        let grant = self.login().await?;
        info!("Exchange authentication successful");
        let refresh_token = grant.refresh_token.clone();
        *guard = Some(Self::tokens_from(grant, refresh_token));
        Ok(())
    }

    fn tokens_from(grant: TokenGrant, refresh_token: Option<String>) -> Tokens {
        Tokens {
            access_token: grant.access_token,
            refresh_token,
            access_expires_at: Utc
                .timestamp_opt(grant.access_expire_time, 0)
                .single()
                .unwrap_or_else(|| Utc::now() + Duration::minutes(5)),
        }
    }

    async fn login(&self) -> Result<TokenGrant> {
        let url = format!("{}/partner/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "access_key": self.access_key,
                "secret_key": self.secret_key,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "login rejected: HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: Envelope<TokenGrant> = response.json().await?;
        Ok(envelope.data)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let url = format!("{}/partner/auth/refresh", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(refresh_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "refresh rejected: HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: Envelope<TokenGrant> = response.json().await?;
        Ok(envelope.data)
    }

    /// Background refresh loop. Wakes ahead of expiry, renews, and exits
    /// on shutdown. Cancelled last during shutdown so in-flight cycle work
    /// never loses its token source.
    pub async fn run_refresh_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let sleep_for = {
                let guard = self.tokens.lock().await;
                match guard.as_ref() {
                    Some(tokens) => {
                        let until = tokens.access_expires_at - Utc::now() - BACKGROUND_BUFFER;
                        until
                            .to_std()
                            .unwrap_or(StdDuration::from_secs(1))
                            .min(StdDuration::from_secs(300))
                    }
                    // Not authenticated yet; check back shortly.
                    None => StdDuration::from_secs(60),
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Auth refresh loop stopped");
                        return;
                    }
                }
            }

            let mut guard = self.tokens.lock().await;
            let needs_renewal = guard
                .as_ref()
                .map_or(false, |t| t.expires_within(BACKGROUND_BUFFER));
            if needs_renewal {
                if let Err(err) = self.renew_locked(&mut guard).await {
                    warn!(error = %err, "Background token renewal failed");
                }
            }
        }
    }
}
