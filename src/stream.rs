//! Owns one listing's dedup state and emits new items in chronological
//! order, resuming across restarts and surviving transient errors.
//!
//! Generalizes `reddit-api::subreddit::submission::stream::SubmissionStreamer`
//! (itself a thin `tokio::spawn` + mpsc wrapper) into the richer,
//! cursor-aware engine `original_source/SubredditStream.py`'s
//! `SubredditStream` class implements.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::item::{extract_attribute, is_actually_spam, Attribute, Item, StreamItem};
use crate::listing::ListingName;
use crate::rate_limit::RateLimiter;
use crate::source::{FetchParams, ListingEndpoint, SourceError};
use crate::storage::CursorStore;
use crate::BoundedSet;

/// Default capacity of a listing's dedup set, matching the source's
/// hard-coded `BoundedSet(1001)`.
const DEFAULT_SEEN_CAPACITY: usize = 1001;

/// The minimum and maximum fetch size a round randomizes within, to bust
/// upstream caches (spec.md §4.c).
const FETCH_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 90..=100;

/// What happened trying to run one round of a [`SubredditStream`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A single listing's streaming state: its injected fetch collaborator,
/// its dedup set, and the pacing/persistence it's wired to.
pub struct SubredditStream {
    listing: ListingName,
    endpoint: Arc<dyn ListingEndpoint>,
    rate_limiter: Arc<dyn RateLimiter>,
    cursor_store: Arc<dyn CursorStore>,
    seen: BoundedSet<Attribute>,
    params: FetchParams,
    edit_fetch_attempts: u32,
    max_time_before_full_fetch: Duration,
    /// How long [`Self::poll_round`] sleeps after marking the stream dead on
    /// a transport error with `raise_errors=false` (spec.md §4.c/§7).
    exception_pause: Duration,
    last_yield_time: Instant,
    /// Whether this stream is still considered healthy; set to `false` by
    /// [`Self::poll_round`] on a transport error when `raise_errors=false`,
    /// mirroring the source's dead-stream marker.
    alive: bool,
}

impl SubredditStream {
    /// Constructs a stream and loads its persisted cursor, if any.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        listing: ListingName,
        endpoint: Arc<dyn ListingEndpoint>,
        rate_limiter: Arc<dyn RateLimiter>,
        cursor_store: Arc<dyn CursorStore>,
        edit_fetch_attempts: u32,
        max_time_before_full_fetch: Duration,
        exception_pause: Duration,
        params: FetchParams,
    ) -> Self {
        let seen = cursor_store.load(listing, DEFAULT_SEEN_CAPACITY).await;
        Self {
            listing,
            endpoint,
            rate_limiter,
            cursor_store,
            seen,
            params,
            edit_fetch_attempts,
            max_time_before_full_fetch,
            exception_pause,
            last_yield_time: Instant::now(),
            alive: true,
        }
    }

    #[must_use]
    pub fn listing(&self) -> ListingName {
        self.listing
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Deletes `attribute` from the dedup set, used by cross-stream
    /// invalidation (e.g. the modlog evicting an actioned modqueue entry).
    pub fn forget(&mut self, attribute: &Attribute) {
        self.seen.remove(attribute);
    }

    /// Whether `attribute` is in this listing's dedup set. `pub(crate)` so
    /// sibling modules (e.g. `multistream`'s tests) can verify invalidation
    /// actually took effect, without exposing `seen` itself.
    #[must_use]
    pub(crate) fn contains(&self, attribute: &Attribute) -> bool {
        self.seen.contains(attribute)
    }

    /// Persists the dedup set.
    pub async fn save(&self) -> Result<(), crate::storage::PersistenceError> {
        self.cursor_store.save(self.listing, &self.seen).await
    }

    fn pick_cursor(&mut self) -> Option<String> {
        let n = self.seen.len();
        if n == 0 {
            return None;
        }
        if n == 1 {
            return Some(self.seen.at(0).expect("n == 1").cursor_value().to_owned());
        }
        if self.last_yield_time.elapsed() > self.max_time_before_full_fetch {
            self.last_yield_time = Instant::now();
            return None;
        }
        let lo = n.saturating_sub(3);
        let hi = n - 1;
        let k = if lo >= hi {
            hi
        } else {
            rand::thread_rng().gen_range(lo..=hi)
        };
        Some(
            self.seen
                .at(k)
                .expect("k < n")
                .cursor_value()
                .to_owned(),
        )
    }

    fn randomized_limit() -> u32 {
        rand::thread_rng().gen_range(FETCH_LIMIT_RANGE)
    }

    fn fetch_params(&self, before: Option<String>) -> FetchParams {
        let mut params = self.params.clone();
        params.before = before;
        if params.only.as_deref() == Some("submissions") {
            params.only = Some("links".to_owned());
        }
        params
    }

    /// Re-fetches `item` up to `edit_fetch_attempts` times, 1s apart, until
    /// it reports having been edited — bounded at exactly
    /// `edit_fetch_attempts` tries, resolving the source's off-by-one Open
    /// Question (spec.md §9).
    async fn ensure_edited(&self, item: &mut Item) {
        if item.edited().is_some() {
            return;
        }
        for attempt in 0..self.edit_fetch_attempts {
            if let Err(err) = self.endpoint.refresh(item).await {
                tracing::debug!(listing = %self.listing, attempt, error = %err, "edit refresh failed");
            }
            if item.edited().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Runs one fetch/dedup round, returning the new items in chronological
    /// order (the "zero-or-more `StreamItem`s" half of spec.md §4.c's
    /// terminator-bearing sequence — the terminator itself is just the end
    /// of this `Vec`, driven once per round by the caller).
    ///
    /// On a transport error: if `raise_errors` is `false`, marks the stream
    /// dead, logs, sleeps `exception_pause`, and returns an empty round
    /// rather than propagating. With `raise_errors=true`, the error
    /// propagates immediately and the pause is the caller's (`MultiStream`
    /// always runs with `raise_errors=true` and owns its own pause/rebuild
    /// policy instead).
    pub async fn poll_round(
        &mut self,
        raise_errors: bool,
    ) -> Result<Vec<StreamItem>, StreamError> {
        let before = self.pick_cursor();
        let limit = Self::randomized_limit();
        let params = self.fetch_params(before.clone());

        let page = match self.endpoint.fetch(limit, &params).await {
            Ok(page) => page,
            Err(SourceError::BadCursor) => {
                if let Some(before) = &before {
                    tracing::debug!(listing = %self.listing, before, "cursor rejected, forgetting and refetching");
                    self.forget_cursor_value(before);
                }
                let retry_params = self.fetch_params(None);
                match self.endpoint.fetch(limit, &retry_params).await {
                    Ok(page) => page,
                    Err(err) => return self.handle_fetch_error(err, raise_errors).await,
                }
            }
            Err(err) => return self.handle_fetch_error(err, raise_errors).await,
        };

        self.alive = true;

        let mut emitted = Vec::new();
        for mut item in page.into_iter().rev() {
            if self.listing.attribute_kind() == crate::listing::AttributeKind::EditedFullname {
                self.ensure_edited(&mut item).await;
            }

            let Some(attribute) = extract_attribute(self.listing, &item) else {
                continue;
            };
            if self.seen.contains(&attribute) {
                continue;
            }
            if self.listing == ListingName::Spam && !is_actually_spam(&item) {
                continue;
            }

            self.seen.add(attribute);
            self.last_yield_time = Instant::now();
            emitted.push(StreamItem::new(self.listing, item));
        }

        if emitted.is_empty() {
            self.rate_limiter.increment();
        } else {
            self.rate_limiter.reset();
        }

        Ok(emitted)
    }

    fn forget_cursor_value(&mut self, value: &str) {
        // The cursor value alone doesn't carry enough shape to reconstruct
        // the exact Attribute variant it came from; match on the listing's
        // attribute kind to build the right one.
        let attribute = match self.listing.attribute_kind() {
            crate::listing::AttributeKind::Fullname => Attribute::Fullname(value.to_owned()),
            crate::listing::AttributeKind::Id => Attribute::Id(value.to_owned()),
            crate::listing::AttributeKind::EditedFullname => {
                // The edited listing anchors on the fullname half only; any
                // edited-timestamp pairing sharing that fullname is forgotten.
                let stale: Vec<Attribute> = self
                    .seen
                    .iter()
                    .filter(|a| a.cursor_value() == value)
                    .cloned()
                    .collect();
                for attribute in stale {
                    self.seen.remove(&attribute);
                }
                return;
            }
        };
        self.seen.remove(&attribute);
    }

    async fn handle_fetch_error(
        &mut self,
        err: SourceError,
        raise_errors: bool,
    ) -> Result<Vec<StreamItem>, StreamError> {
        if raise_errors {
            return Err(err.into());
        }
        self.alive = false;
        tracing::error!(listing = %self.listing, error = %err, "stream marked dead after fetch error");
        tokio::time::sleep(self.exception_pause).await;
        Ok(Vec::new())
    }
}
