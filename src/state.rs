// src/state.rs

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::cache::{CachedResource, TtlCache};
use crate::cart_storage::{CartLocks, CartStorage, PgCartStorage};
use crate::config::AppConfig;
use crate::models::{Province, Variety};
use crate::pagination::PaginatedProducts;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub whatsapp_number: String,
    pub public_base_url: String,
    pub catalog_ttl: Duration,
    pub product_cache: TtlCache<PaginatedProducts>,
    pub varieties: CachedResource<Vec<Variety>>,
    pub provinces: CachedResource<Vec<Province>>,
    pub cart_storage: Arc<dyn CartStorage>,
    pub cart_locks: CartLocks,
}

impl AppState {
    pub fn new(config: &AppConfig, db_pool: PgPool) -> Self {
        let cart_storage = Arc::new(PgCartStorage::new(db_pool.clone()));
        Self::with_cart_storage(config, db_pool, cart_storage)
    }

    pub fn with_cart_storage(
        config: &AppConfig,
        db_pool: PgPool,
        cart_storage: Arc<dyn CartStorage>,
    ) -> Self {
        Self {
            db_pool,
            jwt_secret: config.jwt_secret.clone(),
            jwt_expiration_hours: config.jwt_expiration_hours,
            whatsapp_number: config.whatsapp_number.clone(),
            public_base_url: config.public_base_url.clone(),
            catalog_ttl: Duration::from_secs(
                config.catalog_cache_ttl_minutes.saturating_mul(60),
            ),
            product_cache: TtlCache::new(),
            varieties: CachedResource::new(TtlCache::new()),
            provinces: CachedResource::new(TtlCache::new()),
            cart_storage,
            cart_locks: CartLocks::new(),
        }
    }
}
