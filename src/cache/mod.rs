//! Response caching with explicit invalidation.
//!
//! [`ResponseCache`] is the primitive: a concurrent key/value map with per-entry
//! TTL, compute-on-miss, single-key eviction and prefix eviction.
//! [`CartCache`] layers the cart policy on top of it: key layout, the default
//! TTL, and which keys a write must evict.
//!
//! | Resource        | Key                          | Evicted by                          |
//! |-----------------|------------------------------|-------------------------------------|
//! | One cart        | `cart_<id>`                  | any write to that cart              |
//! | Cart list page  | `cart_list_<page>_<limit>`   | any cart write, any cart creation   |
//!
//! Concurrent misses on the same key may each run their compute function; the
//! last store wins. Values are re-derivations of persisted state, so this is
//! harmless.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

mod cart;

pub use cart::{CartCache, DEFAULT_TTL, keys};

// A stored value and its lifetime.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A concurrent in-memory cache with per-entry TTL.
///
/// Cheap clones of `V` are expected; callers typically store
/// [`Bytes`](bytes::Bytes) or an `Arc`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cartd::cache::ResponseCache;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: ResponseCache<u32> = ResponseCache::new();
/// let ttl = Duration::from_secs(60);
///
/// let first = cache.get_or_compute("answer", ttl, || async { Ok::<_, ()>(42) }).await;
/// let second = cache.get_or_compute("answer", ttl, || async { Ok::<_, ()>(7) }).await;
/// assert_eq!(first, Ok(42));
/// assert_eq!(second, Ok(42));
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V> Default for ResponseCache<V>
where
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResponseCache<V>
where
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the live value under `key`, or runs `compute`, stores its
    /// result for `ttl`, and returns it.
    ///
    /// `compute` runs at most once per call and only on a miss. Its error is
    /// returned unchanged and nothing is stored.
    ///
    /// # Arguments
    ///
    /// - `key`: full cache key.
    /// - `ttl`: lifetime of a freshly computed entry.
    /// - `compute`: produces the value on a miss.
    ///
    /// # Errors
    ///
    /// Whatever `compute` fails with.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            trace!(key, "cache hit");
            return Ok(value);
        }

        debug!(key, "cache miss");
        let value = compute().await?;
        self.entries
            .insert(key.to_owned(), CacheEntry::new(value.clone(), ttl));
        Ok(value)
    }

    /// Returns the live value under `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }

        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    /// Removes `key`. Absent keys are ignored.
    pub fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!(key, "cache entry invalidated");
        }
    }

    /// Removes every key starting with `prefix` and returns how many went.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        debug!(prefix, removed, "cache prefix invalidated");
        removed
    }

    /// Drops every expired entry and returns how many went.
    ///
    /// Expired entries are otherwise only dropped when their own key is read
    /// again, so long-running processes call this periodically.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "expired cache entries purged");
        }
        purged
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
