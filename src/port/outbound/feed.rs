//! Reference odds feed port.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::event::ReferenceEvent;
use crate::error::Result;

/// Usage accounting for the reference feed's metered API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedUsage {
    /// Requests issued since startup.
    pub requests_made: u64,
    /// API credits consumed since startup.
    pub credits_used: u64,
}

/// Source of reference odds snapshots.
///
/// One call returns the full pre-game snapshot for the configured sport,
/// already restricted to the single named reference bookmaker and
/// normalized to domain types. Implementations enforce their own
/// rate-limit pacing; callers just await.
#[async_trait]
pub trait ReferenceFeed: Send + Sync {
    /// Fetch the current snapshot of reference events.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::RateLimited`] when the feed asks us
    /// to back off, and transport/API errors otherwise.
    async fn fetch_events(&self) -> Result<Vec<ReferenceEvent>>;

    /// Cumulative usage counters for the admin surface.
    fn usage(&self) -> FeedUsage;
}
