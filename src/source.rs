//! The thin interface the engine depends on to actually talk to the
//! platform. A real implementation (HTTP/OAuth client, subreddit object
//! model — out of this crate's scope) plugs in by implementing
//! [`SubredditClient`] and [`ListingEndpoint`], the same way
//! `reddit-api::auth::Authenticator` lets `Client<A>` stay transport-
//! agnostic.

use std::sync::Arc;

use crate::item::Item;
use crate::listing::ListingName;

/// The server-reported request budget for the current cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub used: u32,
    pub remaining: u32,
    pub reset_timestamp: u64,
}

/// Parameters merged over a listing's defaults before each fetch.
///
/// `before` is always overwritten by the stream itself just before the
/// request goes out; callers only need to set `only`/`extra`.
#[derive(Debug, Clone, Default)]
pub struct FetchParams {
    pub before: Option<String>,
    /// Caller-requested content filter, in the engine's own vocabulary
    /// (`"submissions"`/`"comments"`). [`crate::stream::SubredditStream`]
    /// rewrites `"submissions"` to the wire name `"links"` right before the
    /// fetch, mirroring the source's parameter handling.
    pub only: Option<String>,
    pub extra: Vec<(String, String)>,
}

/// What went wrong trying to reach the platform.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The server rejected the request because the `before` cursor no
    /// longer exists; the engine's recovery is to forget it and refetch
    /// with no cursor.
    #[error("the server rejected the request's cursor")]
    BadCursor,
    /// Any other transport or server-side failure (network errors, 5xx).
    #[error("transport error: {0}")]
    Transport(String),
    /// The server signalled the request budget is exhausted (429-class).
    #[error("rate limited by the server")]
    RateLimited,
}

/// A single listing's fetch/refresh collaborator.
#[async_trait::async_trait]
pub trait ListingEndpoint: Send + Sync {
    /// Fetches up to `limit` items, newest-first, honoring `params`.
    async fn fetch(&self, limit: u32, params: &FetchParams) -> Result<Vec<Item>, SourceError>;

    /// Re-fetches a single item in place, used by the edited listing to wait
    /// out edit-propagation lag. The default implementation is a no-op,
    /// appropriate for every listing but `edited`.
    async fn refresh(&self, _item: &mut Item) -> Result<(), SourceError> {
        Ok(())
    }
}

/// The per-subreddit factory for listing endpoints, plus the quota
/// accessor the rate limiters read from.
#[async_trait::async_trait]
pub trait SubredditClient: Send + Sync {
    /// Builds (or hands back a cached) endpoint for `listing`.
    fn endpoint(&self, listing: ListingName) -> Arc<dyn ListingEndpoint>;

    /// The current request budget, as last reported by the platform.
    async fn quota(&self) -> Quota;
}
