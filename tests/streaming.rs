//! End-to-end scenarios against a stub collaborator, implementing the six
//! scenarios named in the crate's testable-properties section. No network:
//! the stub stands in for the HTTP/OAuth client a real caller would supply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reddit_streams::item::{Comment, ModLogEntry, Submission};
use reddit_streams::{
    Attribute, BoundedSet, CursorStore, FetchParams, Item, ListingEndpoint, ListingName,
    MultiStream, Quota, SourceError, SubredditClient, SubredditStream,
};

/// A [`ListingEndpoint`] that hands back a scripted sequence of results, one
/// per call, optionally erroring before it starts returning pages.
struct ScriptedEndpoint {
    results: Mutex<Vec<Result<Vec<Item>, SourceError>>>,
    calls: AtomicUsize,
    last_before: Mutex<Option<String>>,
}

impl ScriptedEndpoint {
    fn new(results: Vec<Result<Vec<Item>, SourceError>>) -> Self {
        Self {
            results: Mutex::new(results),
            calls: AtomicUsize::new(0),
            last_before: Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_before(&self) -> Option<String> {
        self.last_before.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingEndpoint for ScriptedEndpoint {
    async fn fetch(&self, _limit: u32, params: &FetchParams) -> Result<Vec<Item>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_before.lock().unwrap() = params.before.clone();
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(Vec::new())
        } else {
            results.remove(0)
        }
    }
}

/// An endpoint that refreshes an item's `edited` timestamp after a fixed
/// number of `refresh` calls, to exercise the edit-propagation retry.
struct EditPropagationEndpoint {
    page: Mutex<Option<Vec<Item>>>,
    propagate_after: u32,
    attempts: Mutex<u32>,
}

#[async_trait]
impl ListingEndpoint for EditPropagationEndpoint {
    async fn fetch(&self, _limit: u32, _params: &FetchParams) -> Result<Vec<Item>, SourceError> {
        Ok(self.page.lock().unwrap().take().unwrap_or_default())
    }

    async fn refresh(&self, item: &mut Item) -> Result<(), SourceError> {
        let mut attempts = self.attempts.lock().unwrap();
        *attempts += 1;
        if *attempts >= self.propagate_after {
            if let Item::Comment(comment) = item {
                comment.edited = Some(1500.0);
            }
        }
        Ok(())
    }
}

struct NullCursorStore;

#[async_trait]
impl CursorStore for NullCursorStore {
    async fn load(&self, _listing: ListingName, max_items: usize) -> BoundedSet<Attribute> {
        BoundedSet::new(max_items)
    }
    async fn save(
        &self,
        _listing: ListingName,
        _seen: &BoundedSet<Attribute>,
    ) -> Result<(), reddit_streams::storage::PersistenceError> {
        Ok(())
    }
}

/// A [`CursorStore`] preloaded with one listing's dedup set, standing in
/// for a restart that resumed with a prior seen-set.
struct SeededCursorStore {
    listing: ListingName,
    seeded: Mutex<Option<Vec<Attribute>>>,
}

#[async_trait]
impl CursorStore for SeededCursorStore {
    async fn load(&self, listing: ListingName, max_items: usize) -> BoundedSet<Attribute> {
        if listing == self.listing {
            if let Some(items) = self.seeded.lock().unwrap().take() {
                return BoundedSet::from_iter_ordered(max_items, items);
            }
        }
        BoundedSet::new(max_items)
    }
    async fn save(
        &self,
        _listing: ListingName,
        _seen: &BoundedSet<Attribute>,
    ) -> Result<(), reddit_streams::storage::PersistenceError> {
        Ok(())
    }
}

fn submission(fullname: &str, edited: Option<f64>, ban_note: Option<&str>) -> Item {
    Item::Submission(Submission {
        id: fullname.trim_start_matches("t3_").to_owned(),
        fullname: fullname.to_owned(),
        author: "someone".to_owned(),
        permalink: "/r/test/comments/abc".to_owned(),
        created_utc: 100.0,
        edited,
        ban_note: ban_note.map(str::to_owned),
    })
}

async fn stream_over(
    listing: ListingName,
    endpoint: Arc<dyn ListingEndpoint>,
    cursor_store: Arc<dyn CursorStore>,
) -> SubredditStream {
    SubredditStream::new(
        listing,
        endpoint,
        Arc::new(NoopPacer),
        cursor_store,
        3,
        Duration::from_secs(60),
        Duration::ZERO,
        FetchParams::default(),
    )
    .await
}

struct NoopPacer;

#[async_trait]
impl reddit_streams::RateLimiter for NoopPacer {
    fn increment(&self) {}
    fn reset(&self) {}
    async fn end_loop(&self, _quota: Quota, _last_run_duration: Duration) {}
}

/// Scenario 1: cold start, empty listing.
#[tokio::test]
async fn cold_start_empty_listing_yields_nothing() {
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(Vec::new())]));
    let mut stream = stream_over(
        ListingName::Submissions,
        endpoint,
        Arc::new(NullCursorStore),
    )
    .await;

    let round = stream.poll_round(true).await.unwrap();
    assert!(round.is_empty());
}

/// Scenario 2: two new submissions, newest-first on the wire, emitted
/// chronologically with the seen set ending oldest-first.
#[tokio::test]
async fn two_new_submissions_emit_in_chronological_order() {
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(vec![
        submission("t3_b", None, None),
        submission("t3_a", None, None),
    ])]));
    let mut stream = stream_over(
        ListingName::Submissions,
        endpoint,
        Arc::new(NullCursorStore),
    )
    .await;

    let round = stream.poll_round(true).await.unwrap();
    let fullnames: Vec<_> = round.iter().map(|s| s.item.fullname().unwrap()).collect();
    assert_eq!(fullnames, vec!["t3_a", "t3_b"]);
}

/// Scenario 3: a stale cursor is rejected, forgotten, and the round
/// refetches with no `before`.
#[tokio::test]
async fn deleted_anchor_recovers_with_a_full_refetch() {
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![
        Err(SourceError::BadCursor),
        Ok(vec![submission("t3_y", None, None)]),
    ]));
    let cursor_store = Arc::new(SeededCursorStore {
        listing: ListingName::Submissions,
        seeded: Mutex::new(Some(vec![Attribute::Fullname("t3_x".to_owned())])),
    });
    let mut stream = stream_over(ListingName::Submissions, endpoint.clone(), cursor_store).await;

    let round = stream.poll_round(true).await.unwrap();

    assert_eq!(endpoint.calls(), 2);
    assert_eq!(round.len(), 1);
    assert_eq!(round[0].item.fullname(), Some("t3_y"));
    assert_eq!(endpoint.last_before(), None, "the retry refetches with no cursor");
}

/// The edited listing's edit-propagation-lag retry: an item that reports
/// "not edited" yet is re-fetched until the refresh reports an edit, bounded
/// at `edit_fetch_attempts` tries.
#[tokio::test(start_paused = true)]
async fn edited_listing_retries_until_the_edit_propagates() {
    let not_yet_edited = Item::Comment(Comment {
        id: "k".to_owned(),
        fullname: "t1_k".to_owned(),
        parent_id: "t3_parent".to_owned(),
        author: "someone".to_owned(),
        permalink: "/r/test/comments/abc/k".to_owned(),
        created_utc: 100.0,
        edited: None,
        ban_note: None,
    });
    let endpoint = Arc::new(EditPropagationEndpoint {
        page: Mutex::new(Some(vec![not_yet_edited])),
        propagate_after: 2,
        attempts: Mutex::new(0),
    });
    let mut stream = stream_over(ListingName::Edited, endpoint, Arc::new(NullCursorStore)).await;

    let round = stream.poll_round(true).await.unwrap();
    assert_eq!(round.len(), 1);
    assert_eq!(round[0].item.edited(), Some(1500.0));
}

/// Scenario 4: an item re-appears with a later edit timestamp; both
/// captures are distinct dedup entries, emitted as two separate items.
#[tokio::test]
async fn edited_listing_captures_each_distinct_edit() {
    let comment_at = |edited: f64| {
        Item::Comment(Comment {
            id: "k".to_owned(),
            fullname: "t1_k".to_owned(),
            parent_id: "t3_parent".to_owned(),
            author: "someone".to_owned(),
            permalink: "/r/test/comments/abc/k".to_owned(),
            created_utc: 100.0,
            edited: Some(edited),
            ban_note: None,
        })
    };

    let endpoint = Arc::new(ScriptedEndpoint::new(vec![
        Ok(vec![comment_at(1000.0)]),
        Ok(vec![comment_at(1500.0)]),
    ]));
    let mut stream = stream_over(ListingName::Edited, endpoint, Arc::new(NullCursorStore)).await;

    let first_round = stream.poll_round(true).await.unwrap();
    assert_eq!(first_round.len(), 1);

    let second_round = stream.poll_round(true).await.unwrap();
    assert_eq!(second_round.len(), 1, "the later edit is a distinct capture");
}

/// Scenario 5: the spam listing's "actually spam" filter.
#[tokio::test]
async fn spam_filter_emits_only_actual_spam() {
    let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(vec![
        submission("t3_spam", None, Some("removed as spam")),
        submission("t3_clean", None, Some("not spam")),
    ])]));
    let mut stream =
        stream_over(ListingName::Spam, endpoint, Arc::new(NullCursorStore)).await;

    let round = stream.poll_round(true).await.unwrap();
    let fullnames: Vec<_> = round.iter().map(|s| s.item.fullname().unwrap()).collect();
    assert_eq!(fullnames, vec!["t3_spam"]);
}

struct ModlogInvalidationClient {
    endpoints: Mutex<HashMap<ListingName, Arc<dyn ListingEndpoint>>>,
}

#[async_trait]
impl SubredditClient for ModlogInvalidationClient {
    fn endpoint(&self, listing: ListingName) -> Arc<dyn ListingEndpoint> {
        Arc::clone(self.endpoints.lock().unwrap().get(&listing).unwrap())
    }

    async fn quota(&self) -> Quota {
        Quota {
            used: 1,
            remaining: 999,
            reset_timestamp: u64::MAX,
        }
    }
}

/// Scenario 6: a modlog action invalidates a targeted fullname out of the
/// modqueue's dedup set.
#[tokio::test]
async fn modlog_action_invalidates_modqueue_attribute() {
    let log_endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(vec![Item::ModLogEntry(
        ModLogEntry {
            id: "ModAction_1".to_owned(),
            created_utc: 1.0,
            action: "removelink".to_owned(),
            target_fullname: Some("t3_z".to_owned()),
            target_permalink: None,
            target_author: None,
            details: None,
            description: None,
            mod_name: "a_mod".to_owned(),
        },
    )])]));
    let modqueue_endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(Vec::new())]));

    let mut endpoints: HashMap<ListingName, Arc<dyn ListingEndpoint>> = HashMap::new();
    endpoints.insert(ListingName::Log, log_endpoint);
    endpoints.insert(ListingName::Modqueue, modqueue_endpoint);

    let client: Arc<dyn SubredditClient> = Arc::new(ModlogInvalidationClient {
        endpoints: Mutex::new(endpoints),
    });

    let multi = MultiStream::builder(client, Arc::new(NullCursorStore))
        .rate_limiter(Arc::new(NoopPacer))
        .add_listings([ListingName::Log, ListingName::Modqueue])
        .build()
        .await
        .unwrap();

    use futures_util::StreamExt;
    let mut stream = Box::pin(multi.streams());
    let first = stream.next().await;
    assert!(first.is_some());
    assert_eq!(first.unwrap().stream, ListingName::Log);
    // Whether `t3_z` was actually evicted from modqueue's dedup set can't be
    // checked from here: `SubredditStream::contains` is `pub(crate)`, and
    // `MultiStream` doesn't expose a per-listing accessor. That assertion is
    // made directly, with its own seed/invalidate/verify round pair, in
    // `modlog_action_invalidates_modqueue_entry` in `src/multistream.rs`'s
    // own test module.
}
