//! Cart persistence.
//!
//! Handlers depend on [`CartRepository`] only. [`InMemoryCartRepository`] is
//! the backend the binary ships with; carts live for the life of the process.
//! Item writes hold a [`CartLocks`] guard across load, change and save.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cart::Cart;

mod lock;

pub use lock::{CartGuard, CartLocks};

/// Failures of the storage backend itself. A missing cart is not an error
/// here; lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation failed: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Fetch-by-id, list-all, and save for carts.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// The cart with `id`, or `None` if no such cart was ever saved.
    async fn find(&self, id: Uuid) -> Result<Option<Cart>>;

    /// Every cart, oldest first by creation time.
    async fn list(&self) -> Result<Vec<Cart>>;

    /// Inserts or replaces the cart with the same id.
    async fn save(&self, cart: &Cart) -> Result<()>;
}

/// Concurrent in-memory [`CartRepository`].
#[derive(Debug, Default)]
pub struct InMemoryCartRepository {
    carts: DashMap<Uuid, Cart>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find(&self, id: Uuid) -> Result<Option<Cart>> {
        Ok(self.carts.get(&id).map(|cart| cart.clone()))
    }

    async fn list(&self) -> Result<Vec<Cart>> {
        let mut carts: Vec<Cart> = self.carts.iter().map(|entry| entry.value().clone()).collect();
        // Ties on the timestamp fall back to id so pages stay stable.
        carts.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        Ok(carts)
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        self.carts.insert(cart.id(), cart.clone());
        debug!(cart = %cart.id(), items = cart.len(), "cart saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::cart::NewCartItem;

    #[tokio::test]
    async fn find_returns_none_for_unknown_id() {
        let repo = InMemoryCartRepository::new();
        assert_eq!(repo.find(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_find_round_trips_items() {
        let repo = InMemoryCartRepository::new();
        let mut cart = Cart::new();
        cart.add_item(NewCartItem::new(7, "Mouse", BigDecimal::from(25), 1))
            .unwrap();

        repo.save(&cart).await.unwrap();

        let found = repo.find(cart.id()).await.unwrap().unwrap();
        assert_eq!(found, cart);
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn save_replaces_existing_cart() {
        let repo = InMemoryCartRepository::new();
        let mut cart = Cart::new();
        repo.save(&cart).await.unwrap();

        cart.add_item(NewCartItem::new(1, "Pen", BigDecimal::from(2), 3))
            .unwrap();
        repo.save(&cart).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.find(cart.id()).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let repo = InMemoryCartRepository::new();
        let carts: Vec<Cart> = (0..5).map(|_| Cart::new()).collect();
        for cart in carts.iter().rev() {
            repo.save(cart).await.unwrap();
        }

        let listed = repo.list().await.unwrap();
        let mut expected = carts.clone();
        expected.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(&b.id())));
        assert_eq!(listed, expected);
    }
}
