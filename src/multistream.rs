//! Polls every configured listing round-robin, forwards new items to the
//! consumer, and owns the shared pacer and cross-stream invalidation.
//!
//! Generalizes `reddit-api::subreddit::multistream::{StreamBuilder, MultiStream}`'s
//! builder shape to the richer multi-listing engine
//! `original_source/SubredditStream.py`'s `MultiStream` class implements.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, Stream};

use crate::item::{Attribute, ItemKind, StreamItem};
use crate::listing::ListingName;
use crate::rate_limit::{AdaptivePacer, RateLimiter};
use crate::source::{FetchParams, SubredditClient};
use crate::storage::CursorStore;
use crate::stream::SubredditStream;
use crate::Config;

/// Modlog actions that, once observed, mean the targeted fullname has
/// dropped out of the mod queue and should stop being tracked there.
const INVALIDATING_ACTIONS: [&str; 6] = [
    "approvelink",
    "removelink",
    "spamlink",
    "approvecomment",
    "removecomment",
    "spamcomment",
];

/// What went wrong building a [`MultiStream`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum BuildError {
    #[error("no listings were added to stream from")]
    MissingListings,
}

/// Builds a [`MultiStream`], generalizing `StreamBuilder`'s
/// `add_sub`/`add_subs` shape to `add_listing`/`add_listings`.
pub struct MultiStreamBuilder {
    client: Arc<dyn SubredditClient>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    cursor_store: Arc<dyn CursorStore>,
    config: Config,
    listings: Vec<ListingName>,
    params: HashMap<ListingName, FetchParams>,
}

impl MultiStreamBuilder {
    #[must_use]
    pub fn new(client: Arc<dyn SubredditClient>, cursor_store: Arc<dyn CursorStore>) -> Self {
        Self {
            client,
            rate_limiter: None,
            cursor_store,
            config: Config::default(),
            listings: Vec::new(),
            params: HashMap::new(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    #[must_use]
    pub fn add_listing(mut self, listing: ListingName) -> Self {
        self.listings.push(listing);
        self
    }

    #[must_use]
    pub fn add_listings<I>(mut self, listings: I) -> Self
    where
        I: IntoIterator<Item = ListingName>,
    {
        self.listings.extend(listings);
        self
    }

    /// Overrides the default fetch params for one listing (e.g. `only`).
    #[must_use]
    pub fn params_for(mut self, listing: ListingName, params: FetchParams) -> Self {
        self.params.insert(listing, params);
        self
    }

    /// Builds the [`MultiStream`], constructing one [`SubredditStream`] per
    /// requested listing and loading each one's persisted cursor.
    ///
    /// # Errors
    /// Fails if no listing was added.
    pub async fn build(self) -> Result<MultiStream, BuildError> {
        if self.listings.is_empty() {
            return Err(BuildError::MissingListings);
        }

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(AdaptivePacer::new(&self.config)));

        let streams = build_streams(
            &self.client,
            &self.cursor_store,
            &self.config,
            &rate_limiter,
            &self.listings,
            &self.params,
        )
        .await;

        Ok(MultiStream {
            client: self.client,
            cursor_store: self.cursor_store,
            config: self.config,
            rate_limiter,
            listings: self.listings,
            params: self.params,
            streams,
        })
    }
}

async fn build_streams(
    client: &Arc<dyn SubredditClient>,
    cursor_store: &Arc<dyn CursorStore>,
    config: &Config,
    rate_limiter: &Arc<dyn RateLimiter>,
    listings: &[ListingName],
    params: &HashMap<ListingName, FetchParams>,
) -> HashMap<ListingName, SubredditStream> {
    let mut streams = HashMap::with_capacity(listings.len());
    for &listing in listings {
        let endpoint = client.endpoint(listing);
        let stream = SubredditStream::new(
            listing,
            endpoint,
            Arc::clone(rate_limiter),
            Arc::clone(cursor_store),
            config.edit_fetch_attempts,
            Duration::from_secs(config.max_time_before_full_fetch_secs),
            Duration::from_secs(config.exception_pause_secs),
            params.get(&listing).cloned().unwrap_or_default(),
        )
        .await;
        streams.insert(listing, stream);
    }
    streams
}

/// Round-robins every configured listing, forwards new items, performs
/// cross-stream invalidation, and recovers from transient errors by pausing
/// and rebuilding — consumers see neither fetch errors nor pacing decisions
/// (spec.md §7).
pub struct MultiStream {
    client: Arc<dyn SubredditClient>,
    cursor_store: Arc<dyn CursorStore>,
    config: Config,
    rate_limiter: Arc<dyn RateLimiter>,
    listings: Vec<ListingName>,
    params: HashMap<ListingName, FetchParams>,
    streams: HashMap<ListingName, SubredditStream>,
}

impl MultiStream {
    #[must_use]
    pub fn builder(
        client: Arc<dyn SubredditClient>,
        cursor_store: Arc<dyn CursorStore>,
    ) -> MultiStreamBuilder {
        MultiStreamBuilder::new(client, cursor_store)
    }

    /// `save()`s, discards, and recreates every stream, preserving names,
    /// params, and the shared pacer — the source's `rebuild_streams`.
    async fn rebuild_streams(&mut self) {
        for stream in self.streams.values() {
            if let Err(err) = stream.save().await {
                tracing::warn!(error = %err, "failed to persist cursor before rebuild");
            }
        }
        self.streams = build_streams(
            &self.client,
            &self.cursor_store,
            &self.config,
            &self.rate_limiter,
            &self.listings,
            &self.params,
        )
        .await;
    }

    /// Applies cross-stream invalidation: a `log` entry whose action is in
    /// the invalidating set evicts the targeted fullname from `modqueue`'s
    /// dedup set, so a later full fetch doesn't replay an already-actioned
    /// entry (spec.md §4.d).
    fn invalidate_from_log(&mut self, item: &StreamItem) {
        let ItemKind::Listing(ListingName::Log) = item.kind else {
            return;
        };
        let crate::item::Item::ModLogEntry(entry) = &item.item else {
            return;
        };
        if !INVALIDATING_ACTIONS.contains(&entry.action.as_str()) {
            return;
        }
        let Some(target) = &entry.target_fullname else {
            return;
        };
        if let Some(modqueue) = self.streams.get_mut(&ListingName::Modqueue) {
            modqueue.forget(&Attribute::Fullname(target.clone()));
            tracing::debug!(target, action = %entry.action, "invalidated modqueue entry from log action");
        }
    }

    /// Runs one round across every listing, returning the items emitted
    /// this round, in round-robin order. Performs cross-stream invalidation
    /// as modlog items are produced, and recovers from a transport error by
    /// sleeping and rebuilding every stream rather than propagating.
    async fn run_round(&mut self) -> Vec<StreamItem> {
        let mut emitted = Vec::new();
        let listings: Vec<ListingName> = self.listings.clone();

        for listing in listings {
            let Some(stream) = self.streams.get_mut(&listing) else {
                continue;
            };
            match stream.poll_round(true).await {
                Ok(items) => {
                    for item in items {
                        self.invalidate_from_log(&item);
                        emitted.push(item);
                    }
                }
                Err(err) => {
                    tracing::error!(
                        listing = %listing,
                        error = %err,
                        "transport error, pausing and rebuilding streams"
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.exception_pause_secs))
                        .await;
                    self.rebuild_streams().await;
                    return emitted;
                }
            }
        }

        emitted
    }

    /// The consumer-facing surface: a plain [`Stream`] of [`StreamItem`],
    /// built with `stream::unfold` exactly as `reddit-api`'s `stream_inner`
    /// does, rather than implementing a bespoke nightly async `Stream`
    /// trait. Consumer-visible items are only ever `StreamItem`s — fetch
    /// errors and pacing sleeps never surface here.
    ///
    /// `last_run_duration` handed to the pacer spans from the end of the
    /// previous `end_loop()` call to the start of this one — it includes
    /// not just this round's own fetch time but also however long the
    /// consumer took between `.next()` calls draining the previous round's
    /// queue, per spec.md §5: the consumer's own processing time counts
    /// against the budget the adaptive pacer paces against.
    #[must_use]
    pub fn streams(self) -> impl Stream<Item = StreamItem> {
        stream::unfold(
            UnfoldState {
                multi: self,
                queue: Vec::new(),
                last_tick: Instant::now(),
            },
            |mut state| async move {
                loop {
                    if let Some(item) = state.queue.pop() {
                        return Some((item, state));
                    }

                    let mut emitted = state.multi.run_round().await;
                    emitted.reverse(); // so `pop()` yields in round order
                    state.queue = emitted;

                    let quota = state.multi.client.quota().await;
                    let last_run_duration = state.last_tick.elapsed();
                    state
                        .multi
                        .rate_limiter
                        .end_loop(quota, last_run_duration)
                        .await;
                    state.last_tick = Instant::now();

                    if let Some(item) = state.queue.pop() {
                        return Some((item, state));
                    }
                    // An empty round with no items still loops back around
                    // after the pacer's sleep, rather than ending the stream.
                }
            },
        )
    }

    /// Persists every stream's cursor. Idempotent.
    pub async fn shutdown(&self) {
        for stream in self.streams.values() {
            if let Err(err) = stream.save().await {
                tracing::warn!(error = %err, "failed to persist cursor during shutdown");
            }
        }
    }
}

struct UnfoldState {
    multi: MultiStream,
    queue: Vec<StreamItem>,
    last_tick: Instant,
}
