#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! A transport-agnostic streaming engine for paginated, newest-first
//! subreddit listings: dedup, pacing, cursor recovery, and cross-stream
//! invalidation, generalized from `bocanada-reddit-api`'s `Subreddit<A>`
//! and its `submission::StreamBuilder`/`multistream` module.
//!
//! This crate has no HTTP client, no OAuth, and no wire format of its own —
//! callers implement [`SubredditClient`]/[`ListingEndpoint`] against
//! whatever transport they already use, the same way `reddit-api` callers
//! supply an `Authenticator`-shaped type. `lib.rs` only wires the modules
//! together and re-exports the public surface.

pub mod bounded_set;
pub mod config;
pub mod item;
pub mod listing;
pub mod multistream;
pub mod rate_limit;
pub mod source;
pub mod storage;
pub mod stream;

pub use bounded_set::BoundedSet;
pub use config::Config;
pub use item::{Attribute, Item, ItemKind, StreamItem};
pub use listing::ListingName;
pub use multistream::{BuildError, MultiStream, MultiStreamBuilder};
pub use rate_limit::{AdaptivePacer, ExponentialPacer, RateLimiter};
pub use source::{FetchParams, ListingEndpoint, Quota, SourceError, SubredditClient};
pub use storage::{CursorStore, FileCursorStore};
pub use stream::{StreamError, SubredditStream};
