//! Per-cart write serialization.
//!
//! Item writes load a cart, change it and save it back. Two such writes to
//! the same cart must not interleave, or the later save drops the earlier
//! change. [`CartLocks`] hands out one async lock per cart id; entries only
//! exist while some request holds or waits on them.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CartLocks {
    locks: DashMap<Uuid, Weak<Mutex<()>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `cart_id`'s lock remains.
    pub async fn acquire(&self, cart_id: Uuid) -> CartGuard<'_> {
        let mutex = {
            let mut slot = self.locks.entry(cart_id).or_default();
            match slot.upgrade() {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(Mutex::new(()));
                    *slot = Arc::downgrade(&mutex);
                    mutex
                }
            }
        };

        let guard = mutex.lock_owned().await;
        trace!(cart = %cart_id, "cart lock acquired");
        CartGuard {
            locks: self,
            cart_id,
            guard: Some(guard),
        }
    }

    /// Number of carts with a live lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds one cart's lock until dropped.
#[derive(Debug)]
pub struct CartGuard<'a> {
    locks: &'a CartLocks,
    cart_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CartGuard<'_> {
    fn drop(&mut self) {
        // Releasing drops this holder's strong reference. The entry goes once
        // nobody else holds or waits on it; a waiter keeps it alive.
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.cart_id, |_, lock| lock.strong_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn released_locks_leave_no_entry() {
        let locks = CartLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        assert_eq!(locks.len(), 1);
        drop(guard);

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_carts_do_not_block_each_other() {
        let locks = CartLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_cart_holders_never_overlap() {
        let locks = Arc::new(CartLocks::new());
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.acquire(id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
