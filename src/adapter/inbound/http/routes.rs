//! Route table and handlers for the admin surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::application::pairing::EventResolver;
use crate::application::state::AppState;
use crate::domain::id::{ExchangeEventId, LineId, ReferenceEventId};
use crate::error::Result;
use crate::port::outbound::feed::ReferenceFeed;

/// Shared handler context.
#[derive(Clone)]
pub struct AdminContext {
    pub state: Arc<AppState>,
    pub resolver: Arc<EventResolver>,
    pub feed: Arc<dyn ReferenceFeed>,
}

/// Build the admin router.
#[must_use]
pub fn router(context: AdminContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pairings", get(pairings))
        .route("/lines", get(lines))
        .route("/states", get(states))
        .route("/positions", get(positions))
        .route("/positions/:line_id", get(position))
        .route("/stats", get(stats))
        .route("/overrides", get(list_overrides).post(add_override))
        .route("/overrides/:reference_event_id", delete(remove_override))
        .route("/control/start", post(start))
        .route("/control/stop", post(stop))
        .route("/config", put(update_config))
        .with_state(context)
}

/// Bind and serve until the shutdown signal flips.
///
/// # Errors
///
/// Returns an error when the listener cannot bind.
pub async fn serve(
    bind: &str,
    context: AdminContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %bind, "Admin surface listening");

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stopped| *stopped).await;
        })
        .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    running: bool,
    cycles_completed: u64,
    timestamp: String,
}

async fn health(State(context): State<AdminContext>) -> Json<HealthResponse> {
    let stats = context.state.stats();
    Json(HealthResponse {
        status: "healthy",
        running: stats.running,
        cycles_completed: stats.cycles_completed,
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn pairings(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "outcomes": context.resolver.latest_outcomes(),
        "overrides": context
            .resolver
            .overrides()
            .into_iter()
            .map(|(reference, exchange)| serde_json::json!({
                "reference_event_id": reference,
                "exchange_event_id": exchange,
            }))
            .collect::<Vec<_>>(),
    }))
}

async fn lines(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "lines": context.state.targets() }))
}

async fn states(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "states": context.state.line_states() }))
}

async fn positions(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "positions": context.state.positions() }))
}

async fn position(
    State(context): State<AdminContext>,
    Path(line_id): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
    context
        .state
        .position(&LineId::new(line_id))
        .map(|position| Json(serde_json::json!(position)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn stats(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "stats": context.state.stats(),
        "feed_usage": context.feed.usage(),
    }))
}

async fn list_overrides(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "overrides": context
            .resolver
            .overrides()
            .into_iter()
            .map(|(reference, exchange)| serde_json::json!({
                "reference_event_id": reference,
                "exchange_event_id": exchange,
            }))
            .collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize)]
struct OverrideRequest {
    reference_event_id: String,
    exchange_event_id: i64,
}

async fn add_override(
    State(context): State<AdminContext>,
    Json(request): Json<OverrideRequest>,
) -> StatusCode {
    context.resolver.add_override(
        ReferenceEventId::new(request.reference_event_id),
        ExchangeEventId::new(request.exchange_event_id),
    );
    StatusCode::CREATED
}

async fn remove_override(
    State(context): State<AdminContext>,
    Path(reference_event_id): Path<String>,
) -> StatusCode {
    if context
        .resolver
        .remove_override(&ReferenceEventId::new(reference_event_id))
    {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn start(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    context.state.start();
    info!("Scheduler started via admin surface");
    Json(serde_json::json!({ "running": true }))
}

async fn stop(State(context): State<AdminContext>) -> Json<serde_json::Value> {
    context.state.stop();
    info!("Scheduler stopped via admin surface");
    Json(serde_json::json!({ "running": false }))
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    poll_interval_seconds: Option<u64>,
    base_plus_stake: Option<Decimal>,
    cool_down_seconds: Option<u64>,
}

async fn update_config(
    State(context): State<AdminContext>,
    Json(update): Json<ConfigUpdate>,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, String)> {
    if let Some(interval) = update.poll_interval_seconds {
        if interval < 60 {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                "poll_interval_seconds must be at least 60".into(),
            ));
        }
    }
    if let Some(stake) = update.base_plus_stake {
        if stake <= Decimal::ZERO {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                "base_plus_stake must be greater than 0".into(),
            ));
        }
    }

    let settings = context.state.update_settings(|settings| {
        if let Some(interval) = update.poll_interval_seconds {
            settings.poll_interval_seconds = interval;
        }
        if let Some(stake) = update.base_plus_stake {
            settings.base_plus_stake = stake;
        }
        if let Some(cool_down) = update.cool_down_seconds {
            settings.cool_down_seconds = cool_down;
        }
    });
    info!(
        poll_interval = settings.poll_interval_seconds,
        cool_down = settings.cool_down_seconds,
        "Runtime settings updated via admin surface"
    );

    Ok(Json(serde_json::json!({ "settings": settings })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pairing::PairingConfig;
    use crate::application::state::RuntimeSettings;
    use crate::domain::event::ReferenceEvent;
    use crate::port::outbound::feed::FeedUsage;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct StubFeed;

    #[async_trait]
    impl ReferenceFeed for StubFeed {
        async fn fetch_events(&self) -> Result<Vec<ReferenceEvent>> {
            Ok(Vec::new())
        }

        fn usage(&self) -> FeedUsage {
            FeedUsage {
                requests_made: 3,
                credits_used: 9,
            }
        }
    }

    fn context() -> AdminContext {
        AdminContext {
            state: Arc::new(AppState::new(
                RuntimeSettings {
                    poll_interval_seconds: 60,
                    base_plus_stake: dec!(100),
                    cool_down_seconds: 300,
                },
                true,
            )),
            resolver: Arc::new(EventResolver::new(PairingConfig::default())),
            feed: Arc::new(StubFeed),
        }
    }

    #[tokio::test]
    async fn health_reports_running_state() {
        let context = context();
        let response = health(State(context.clone())).await;
        assert_eq!(response.0.status, "healthy");
        assert!(response.0.running);
    }

    #[tokio::test]
    async fn start_and_stop_toggle_the_gate() {
        let context = context();
        stop(State(context.clone())).await;
        assert!(!context.state.is_running());
        start(State(context.clone())).await;
        assert!(context.state.is_running());
    }

    #[tokio::test]
    async fn override_add_and_remove() {
        let context = context();
        let status = add_override(
            State(context.clone()),
            Json(OverrideRequest {
                reference_event_id: "r1".into(),
                exchange_event_id: 42,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(context.resolver.overrides().len(), 1);

        let status = remove_override(State(context.clone()), Path("r1".into())).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let status = remove_override(State(context.clone()), Path("r1".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn config_update_validates_interval() {
        let context = context();
        let result = update_config(
            State(context.clone()),
            Json(ConfigUpdate {
                poll_interval_seconds: Some(10),
                base_plus_stake: None,
                cool_down_seconds: None,
            }),
        )
        .await;
        assert!(result.is_err());

        let result = update_config(
            State(context.clone()),
            Json(ConfigUpdate {
                poll_interval_seconds: Some(90),
                base_plus_stake: Some(dec!(150)),
                cool_down_seconds: Some(240),
            }),
        )
        .await;
        assert!(result.is_ok());
        let settings = context.state.settings();
        assert_eq!(settings.poll_interval_seconds, 90);
        assert_eq!(settings.base_plus_stake, dec!(150));
        assert_eq!(settings.cool_down_seconds, 240);
    }

    #[tokio::test]
    async fn unknown_position_is_404() {
        let context = context();
        let result = position(State(context), Path("nope".into())).await;
        assert!(matches!(result, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn stats_include_feed_usage() {
        let context = context();
        let response = stats(State(context)).await;
        assert_eq!(response.0["feed_usage"]["credits_used"], 9);
    }
}
