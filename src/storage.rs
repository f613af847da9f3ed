//! Persistence for a listing's [`BoundedSet`], so a stream's position
//! survives a restart.
//!
//! Generalizes the `Storage` abstraction `reddit-api::subreddit::mod`
//! references (`stream_inner`'s `S: Storage` bound) from "did we see this
//! submission" to "here is the whole ordered seen-set for a listing",
//! persisted in a versioned, self-describing format rather than the
//! source's language-specific pickle.

use std::path::PathBuf;

use crate::bounded_set::BoundedSet;
use crate::item::Attribute;
use crate::listing::ListingName;

/// An error saving or loading a [`BoundedSet`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[cfg(feature = "sqlite-store")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

/// Where a listing's dedup set is durably kept between restarts.
#[async_trait::async_trait]
pub trait CursorStore: Send + Sync {
    /// Loads the persisted seen-set for `listing`, or a fresh empty set of
    /// the given capacity if nothing was persisted or the load failed —
    /// a load never fails the caller, it only ever yields a worse starting
    /// point.
    async fn load(&self, listing: ListingName, max_items: usize) -> BoundedSet<Attribute>;

    /// Persists `seen` for `listing`.
    async fn save(
        &self,
        listing: ListingName,
        seen: &BoundedSet<Attribute>,
    ) -> Result<(), PersistenceError>;
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Envelope {
    version: u8,
    attributes: Vec<Attribute>,
}

const ENVELOPE_VERSION: u8 = 1;

/// Default [`CursorStore`]: one JSON file per listing, under
/// `<cache_root>/cache-<subreddit>/<listing>.json`.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    cache_root: PathBuf,
    subreddit: String,
}

impl FileCursorStore {
    #[must_use]
    pub fn new(cache_root: impl Into<PathBuf>, subreddit: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            subreddit: subreddit.into(),
        }
    }

    fn path(&self, listing: ListingName) -> PathBuf {
        self.cache_root
            .join(format!("cache-{}", self.subreddit))
            .join(format!("{}.json", listing.as_str()))
    }
}

#[async_trait::async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self, listing: ListingName, max_items: usize) -> BoundedSet<Attribute> {
        let path = self.path(listing);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(listing = %listing, error = %err, "no persisted cursor, starting fresh");
                return BoundedSet::new(max_items);
            }
        };
        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => BoundedSet::from_iter_ordered(max_items, envelope.attributes),
            Err(err) => {
                tracing::warn!(listing = %listing, error = %err, "corrupt cursor file, starting fresh");
                BoundedSet::new(max_items)
            }
        }
    }

    async fn save(
        &self,
        listing: ListingName,
        seen: &BoundedSet<Attribute>,
    ) -> Result<(), PersistenceError> {
        let path = self.path(listing);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            attributes: seen.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteCursorStore;

#[cfg(feature = "sqlite-store")]
mod sqlite {
    use super::{Attribute, BoundedSet, CursorStore, ListingName, PersistenceError};
    use sqlx::SqlitePool;

    /// A [`CursorStore`] backed by sqlite, for deployments that already run
    /// one instead of wanting per-listing JSON files — grounded in
    /// `reddit-api`'s own optional `sqlx`/`stream` feature, which persists
    /// stream dedup state the same way.
    #[derive(Debug, Clone)]
    pub struct SqliteCursorStore {
        pool: SqlitePool,
        subreddit: String,
    }

    impl SqliteCursorStore {
        /// Connects to `database_url` and ensures the backing table exists.
        pub async fn connect(
            database_url: &str,
            subreddit: impl Into<String>,
        ) -> Result<Self, PersistenceError> {
            let pool = SqlitePool::connect(database_url).await?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS stream_cursors (
                    subreddit TEXT NOT NULL,
                    listing TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    attribute TEXT NOT NULL,
                    PRIMARY KEY (subreddit, listing, position)
                )",
            )
            .execute(&pool)
            .await?;
            Ok(Self {
                pool,
                subreddit: subreddit.into(),
            })
        }
    }

    #[async_trait::async_trait]
    impl CursorStore for SqliteCursorStore {
        async fn load(&self, listing: ListingName, max_items: usize) -> BoundedSet<Attribute> {
            let rows: Result<Vec<(String,)>, sqlx::Error> = sqlx::query_as(
                "SELECT attribute FROM stream_cursors
                 WHERE subreddit = ? AND listing = ?
                 ORDER BY position ASC",
            )
            .bind(&self.subreddit)
            .bind(listing.as_str())
            .fetch_all(&self.pool)
            .await;

            let rows = match rows {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::warn!(listing = %listing, error = %err, "failed to load cursor from sqlite, starting fresh");
                    return BoundedSet::new(max_items);
                }
            };

            let attributes = rows.into_iter().filter_map(|(json,)| {
                serde_json::from_str::<Attribute>(&json)
                    .inspect_err(|err| {
                        tracing::warn!(listing = %listing, error = %err, "dropping corrupt persisted attribute");
                    })
                    .ok()
            });

            BoundedSet::from_iter_ordered(max_items, attributes)
        }

        async fn save(
            &self,
            listing: ListingName,
            seen: &BoundedSet<Attribute>,
        ) -> Result<(), PersistenceError> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM stream_cursors WHERE subreddit = ? AND listing = ?")
                .bind(&self.subreddit)
                .bind(listing.as_str())
                .execute(&mut *tx)
                .await?;

            for (position, attribute) in seen.to_vec().into_iter().enumerate() {
                let json = serde_json::to_string(&attribute)?;
                sqlx::query(
                    "INSERT INTO stream_cursors (subreddit, listing, position, attribute)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&self.subreddit)
                .bind(listing.as_str())
                .bind(i64::try_from(position).unwrap_or(i64::MAX))
                .bind(json)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CursorStore, FileCursorStore};
    use crate::item::Attribute;
    use crate::listing::ListingName;
    use crate::BoundedSet;

    #[tokio::test]
    async fn round_trips_through_a_temp_directory() {
        let dir = tempdir();
        let store = FileCursorStore::new(dir.clone(), "rust");

        let mut seen: BoundedSet<Attribute> = BoundedSet::new(1001);
        seen.add(Attribute::Fullname("t3_a".to_owned()));
        seen.add(Attribute::Fullname("t3_b".to_owned()));

        store.save(ListingName::Submissions, &seen).await.unwrap();
        let loaded = store.load(ListingName::Submissions, 1001).await;

        assert_eq!(loaded.to_vec(), seen.to_vec());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempdir();
        let store = FileCursorStore::new(dir.clone(), "rust");
        let loaded = store.load(ListingName::Comments, 1001).await;
        assert!(loaded.is_empty());
        std::fs::remove_dir_all(dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("reddit-streams-test-{}", std::process::id()));
        dir.push(uniquifier());
        dir
    }

    fn uniquifier() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
    }
}
