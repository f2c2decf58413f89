// src/cart_storage.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::cart::{CartAction, CartItem, CartState};

/// Every cart snapshot lives under this key, suffixed with the session id.
pub const CART_STORAGE_KEY: &str = "coffee-cart";

pub fn cart_storage_key(session_id: Uuid) -> String {
    format!("{}:{}", CART_STORAGE_KEY, session_id)
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// String key/value storage for cart snapshots, in the spirit of browser `localStorage`.
#[async_trait]
pub trait CartStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct PgCartStorage {
    pool: PgPool,
}

impl PgCartStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStorage for PgCartStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM cart_storage WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
                INSERT INTO cart_storage (key, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

const CART_LOCK_IDLE: Duration = Duration::from_secs(10 * 60);

/// One async mutex per storage key. Requests on the same cart run one at a
/// time, from hydration to the last write.
#[derive(Clone)]
pub struct CartLocks {
    locks: Cache<String, Arc<Mutex<()>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self {
            locks: Cache::builder().time_to_idle(CART_LOCK_IDLE).build(),
        }
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get_with(key.to_string(), async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }
}

impl Default for CartLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// A cart bound to a storage key. Each dispatched action is applied to the
/// in-memory state and then the item list is written back, replacing the
/// previous snapshot.
pub struct CartStore<'a> {
    storage: &'a dyn CartStorage,
    key: String,
    state: CartState,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> CartStore<'a> {
    /// Waits for exclusive access to the cart under `key`, then hydrates it.
    /// The lock is released when the store is dropped.
    pub async fn open(
        storage: &'a dyn CartStorage,
        locks: &CartLocks,
        key: String,
    ) -> CartStore<'a> {
        let guard = locks.acquire(&key).await;
        let mut store = Self::hydrate(storage, key).await;
        store._guard = Some(guard);
        store
    }

    /// Loads the snapshot stored under `key`. Missing, unreadable or corrupt
    /// data gives an empty cart.
    pub async fn hydrate(storage: &'a dyn CartStorage, key: String) -> CartStore<'a> {
        let mut state = CartState::new();

        match storage.get_item(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CartItem>>(&raw) {
                Ok(items) => state.load(items),
                Err(e) => {
                    tracing::warn!("Discarding corrupt cart snapshot '{}': {}", key, e);
                }
            },
            Ok(None) => {
                tracing::debug!("No cart snapshot under '{}', starting empty", key);
            }
            Err(e) => {
                tracing::warn!("Could not read cart snapshot '{}': {}", key, e);
            }
        }

        CartStore {
            storage,
            key,
            state,
            _guard: None,
        }
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn into_state(self) -> CartState {
        self.state
    }

    pub async fn dispatch(&mut self, action: CartAction) -> &CartState {
        self.state.apply(action);
        self.persist().await;
        &self.state
    }

    async fn persist(&self) {
        let snapshot = match serde_json::to_string(self.state.items()) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Could not serialize cart '{}': {}", self.key, e);
                return;
            }
        };
        if let Err(e) = self.storage.set_item(&self.key, &snapshot).await {
            // the transition already happened, only the snapshot is lost
            tracing::warn!("Could not persist cart '{}': {}", self.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::tests::item;
    use rust_decimal::Decimal;

    struct BrokenStorage;

    #[async_trait]
    impl CartStorage for BrokenStorage {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Backend(sqlx::Error::PoolTimedOut))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn every_dispatch_overwrites_the_snapshot() {
        let storage = MemoryCartStorage::new();
        let key = cart_storage_key(Uuid::new_v4());

        let mut store = CartStore::hydrate(&storage, key.clone()).await;
        store
            .dispatch(CartAction::Add {
                item: item(1, 10),
                quantity: 2,
            })
            .await;
        store
            .dispatch(CartAction::SetQuantity {
                product_id: 1,
                quantity: 3,
            })
            .await;

        let raw = storage.get_item(&key).await.unwrap().unwrap();
        let saved: Vec<CartItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].quantity, 3);

        let rehydrated = CartStore::hydrate(&storage, key).await;
        assert_eq!(rehydrated.state().total(), Decimal::from(30));
        assert_eq!(rehydrated.state().item_count(), 3);
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let storage = MemoryCartStorage::new();
        storage.set_item("coffee-cart:x", "{not json").await.unwrap();
        let store = CartStore::hydrate(&storage, "coffee-cart:x".to_string()).await;
        assert!(store.state().is_empty());
    }

    #[tokio::test]
    async fn snapshot_totals_are_not_trusted() {
        let storage = MemoryCartStorage::new();
        let json = r#"[{"product_id":4,"sku":"A","name_es":"A","name_en":"A","price":"2.5",
            "currency":"USD","weight_grams":250,"image_url":"x","quantity":4,
            "total":"999"}]"#;
        storage.set_item("k", json).await.unwrap();
        let store = CartStore::hydrate(&storage, "k".to_string()).await;
        assert_eq!(store.state().total(), Decimal::from(10));
        assert_eq!(store.state().item_count(), 4);
    }

    #[tokio::test]
    async fn broken_storage_is_not_fatal() {
        let storage = BrokenStorage;
        let mut store = CartStore::hydrate(&storage, "k".to_string()).await;
        let state = store
            .dispatch(CartAction::Add {
                item: item(2, 4),
                quantity: 1,
            })
            .await;
        assert_eq!(state.item_count(), 1);
    }

    #[tokio::test]
    async fn overlapping_requests_on_one_cart_keep_both_adds() {
        let storage = MemoryCartStorage::new();
        let locks = CartLocks::new();
        let key = cart_storage_key(Uuid::new_v4());

        let first = CartStore::open(&storage, &locks, key.clone()).await;
        let (_, lines) = tokio::join!(
            async move {
                let mut first = first;
                first
                    .dispatch(CartAction::Add {
                        item: item(1, 10),
                        quantity: 1,
                    })
                    .await;
            },
            async {
                let mut second = CartStore::open(&storage, &locks, key.clone()).await;
                second
                    .dispatch(CartAction::Add {
                        item: item(2, 10),
                        quantity: 1,
                    })
                    .await
                    .items()
                    .len()
            }
        );
        assert_eq!(lines, 2);

        let raw = storage.get_item(&key).await.unwrap().unwrap();
        let saved: Vec<CartItem> = serde_json::from_str(&raw).unwrap();
        let ids: Vec<i32> = saved.iter().map(|i| i.product_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn locks_are_per_cart() {
        let storage = MemoryCartStorage::new();
        let locks = CartLocks::new();
        let _held = CartStore::open(&storage, &locks, "coffee-cart:a".to_string()).await;
        let other = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            CartStore::open(&storage, &locks, "coffee-cart:b".to_string()),
        )
        .await;
        assert!(other.is_ok());
    }

    #[test]
    fn keys_share_the_fixed_prefix() {
        let id = Uuid::nil();
        assert_eq!(
            cart_storage_key(id),
            "coffee-cart:00000000-0000-0000-0000-000000000000"
        );
    }
}
