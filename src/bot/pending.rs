//! Per-user pending links
//!
//! Holds the link a user sent until they pick a format. There is at most one
//! entry per user, a new link replaces the old one, and taking an entry
//! removes it. Entries expire on their own so abandoned keyboards do not
//! accumulate.

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Ephemeral `user_id -> url` store
#[derive(Clone)]
pub struct PendingLinks {
    cache: Cache<i64, String>,
}

impl PendingLinks {
    /// Creates a store whose entries live for `ttl_secs`
    ///
    /// # Examples
    ///
    /// ```
    /// use media_fetch_bot::bot::PendingLinks;
    ///
    /// let pending = PendingLinks::new(
    ///     600,    // 10 minutes to pick a format
    ///     10_000  // max 10k users waiting at once
    /// );
    /// ```
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { cache }
    }

    /// Remember `url` as the user's pending link, replacing any previous one
    pub async fn put(&self, user_id: i64, url: String) {
        debug!(user_id, "Storing pending link");
        self.cache.insert(user_id, url).await;
    }

    /// Remove and return the user's pending link, `None` once it has expired
    pub async fn take(&self, user_id: i64) -> Option<String> {
        // `remove` hands back entries past their TTL until housekeeping runs; `get` does not
        let url = self.cache.get(&user_id).await;
        self.cache.invalidate(&user_id).await;
        url
    }

    /// Number of users with a pending link (approximate, see moka docs)
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether no links are pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
