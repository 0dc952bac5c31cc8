//! Cart cache policy: key layout, TTL, and invalidation rules.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::ResponseCache;

/// Lifetime of a cached cart response when no invalidation evicts it first.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache key builders. These strings are an external contract.
pub mod keys {
    /// Prefix of single-cart keys.
    pub const CART: &str = "cart_";

    /// Prefix shared by every list key.
    pub const CART_LIST: &str = "cart_list_";

    /// Key for one cart: `cart_<id>`.
    pub fn cart(cart_id: &str) -> String {
        format!("{CART}{cart_id}")
    }

    /// Key for one list page: `cart_list_<page>_<limit>`.
    pub fn cart_list(page: u32, limit: u32) -> String {
        format!("{CART_LIST}{page}_{limit}")
    }

    /// Key for one list page with items expanded. Lives under the list prefix
    /// so list invalidation covers it.
    pub fn cart_list_expanded(page: u32, limit: u32) -> String {
        format!("{}_items", cart_list(page, limit))
    }
}

/// Serialized cart responses, keyed per cart and per list page.
///
/// Every write to a cart must call [`invalidate_cart`](Self::invalidate_cart)
/// and every cart creation [`invalidate_all_lists`](Self::invalidate_all_lists)
/// before the write is acknowledged.
#[derive(Debug)]
pub struct CartCache {
    inner: ResponseCache<Bytes>,
    ttl: Duration,
}

impl Default for CartCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CartCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ResponseCache::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached body for one cart, or the result of `compute`.
    ///
    /// # Errors
    ///
    /// Whatever `compute` fails with; failures are not cached.
    pub async fn get_cart<F, Fut, E>(&self, cart_id: &str, compute: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        self.inner
            .get_or_compute(&keys::cart(cart_id), self.ttl, compute)
            .await
    }

    /// Cached body for one list page, or the result of `compute`.
    ///
    /// # Errors
    ///
    /// Whatever `compute` fails with; failures are not cached.
    pub async fn get_cart_list<F, Fut, E>(
        &self,
        page: u32,
        limit: u32,
        expanded: bool,
        compute: F,
    ) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let key = if expanded {
            keys::cart_list_expanded(page, limit)
        } else {
            keys::cart_list(page, limit)
        };
        self.inner.get_or_compute(&key, self.ttl, compute).await
    }

    /// Evicts the cart's own entry and every list page.
    pub fn invalidate_cart(&self, cart_id: &str) {
        self.inner.invalidate(&keys::cart(cart_id));
        self.invalidate_all_lists();
        debug!(cart = cart_id, "cart cache invalidated");
    }

    /// Evicts every list page.
    pub fn invalidate_all_lists(&self) {
        self.inner.invalidate_prefix(keys::CART_LIST);
    }

    /// Drops entries past their TTL; see [`ResponseCache::purge_expired`].
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    /// The underlying primitive, for inspection.
    pub fn responses(&self) -> &ResponseCache<Bytes> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn body(s: &'static str) -> Result<Bytes, ()> {
        Ok(Bytes::from_static(s.as_bytes()))
    }

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(keys::cart("0b6f"), "cart_0b6f");
        assert_eq!(keys::cart_list(1, 9999), "cart_list_1_9999");
        assert_eq!(keys::cart_list_expanded(2, 10), "cart_list_2_10_items");
        assert!(keys::cart_list_expanded(2, 10).starts_with(keys::CART_LIST));
    }

    #[tokio::test]
    async fn get_cart_uses_cart_key() {
        let cache = CartCache::default();
        cache.get_cart("abc", || async { body("{}") }).await.unwrap();

        assert!(cache.responses().contains("cart_abc"));
        assert_eq!(cache.ttl(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn invalidate_cart_evicts_cart_and_lists_only() {
        let cache = CartCache::default();
        cache.get_cart("a", || async { body("a") }).await.unwrap();
        cache.get_cart("b", || async { body("b") }).await.unwrap();
        cache.get_cart_list(1, 10, false, || async { body("[]") }).await.unwrap();
        cache.get_cart_list(2, 10, true, || async { body("[]") }).await.unwrap();

        cache.invalidate_cart("a");

        let cached = cache.responses();
        assert!(!cached.contains("cart_a"));
        assert!(cached.contains("cart_b"));
        assert!(!cached.contains("cart_list_1_10"));
        assert!(!cached.contains("cart_list_2_10_items"));
    }

    #[tokio::test]
    async fn invalidate_all_lists_keeps_carts() {
        let cache = CartCache::default();
        cache.get_cart("a", || async { body("a") }).await.unwrap();
        cache.get_cart_list(1, 9999, false, || async { body("[]") }).await.unwrap();

        cache.invalidate_all_lists();

        assert!(cache.responses().contains("cart_a"));
        assert!(!cache.responses().contains("cart_list_1_9999"));
    }

    #[tokio::test]
    async fn list_is_recomputed_after_invalidation() {
        let cache = CartCache::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let compute = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            body("[]")
        };

        cache.get_cart_list(1, 9999, false, compute).await.unwrap();
        cache.get_cart_list(1, 9999, false, compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate_all_lists();
        cache.get_cart_list(1, 9999, false, compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
