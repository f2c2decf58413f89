// src/services.rs

//! Read paths shared by the JSON API and the server-rendered pages.

use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::cache::{CachedResource, FetchState};
use crate::errors::AppError;
use crate::filters::ProductListingParams;
use crate::models::{
    Farm, Farmer, FarmerMedia, Product, ProductListItem, ProductWithTotalCount, Province,
    TraceabilityRecord, Variety,
};
use crate::pagination::{PaginatedProducts, Pagination};
use crate::state::AppState;

pub const VARIETIES_CACHE_KEY: &str = "reference:varieties";
pub const PROVINCES_CACHE_KEY: &str = "reference:provinces";

const TRACEABILITY_SELECT: &str = r#"
    SELECT
        b.id AS batch_id, b.code, b.process_method, b.harvest_date, b.processing_date,
        b.roast_date, b.roast_level, b.cupping_score, b.weight_kg, b.notes_es, b.notes_en,
        v.name AS variety_name,
        f.id AS farm_id, f.name AS farm_name, f.municipality, f.altitude_masl,
        pr.name AS province_name,
        fr.id AS farmer_id, fr.name AS farmer_name, fr.slug AS farmer_slug,
        fr.photo_url AS farmer_photo_url
    FROM coffee_batches b
    JOIN farms f ON f.id = b.farm_id
    JOIN farmers fr ON fr.id = f.farmer_id
    LEFT JOIN varieties v ON v.id = b.variety_id
    LEFT JOIN provinces pr ON pr.id = f.province_id
"#;

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variety_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmerProfile {
    pub farmer: Farmer,
    pub province_name: Option<String>,
    pub farms: Vec<Farm>,
    pub media: Vec<FarmerMedia>,
}

fn fetch_state_into_result<V>(state: FetchState<V>, what: &str) -> Result<V, AppError> {
    match state {
        FetchState { data: Some(data), .. } => Ok(data),
        FetchState { error, .. } => Err(AppError::InternalServerError(format!(
            "could not load {}: {}",
            what,
            error.unwrap_or_else(|| "no data".to_string())
        ))),
    }
}

async fn query_varieties(pool: PgPool) -> Result<Vec<Variety>, sqlx::Error> {
    sqlx::query_as::<_, Variety>("SELECT * FROM varieties ORDER BY name ASC")
        .fetch_all(&pool)
        .await
}

async fn query_provinces(pool: PgPool) -> Result<Vec<Province>, sqlx::Error> {
    sqlx::query_as::<_, Province>("SELECT * FROM provinces ORDER BY name ASC")
        .fetch_all(&pool)
        .await
}

pub async fn list_varieties(app_state: &AppState) -> Result<Vec<Variety>, AppError> {
    let pool = app_state.db_pool.clone();
    let state = app_state
        .varieties
        .load(VARIETIES_CACHE_KEY, app_state.catalog_ttl, move || {
            query_varieties(pool)
        })
        .await;
    fetch_state_into_result(state, "varieties")
}

pub async fn list_provinces(app_state: &AppState) -> Result<Vec<Province>, AppError> {
    let pool = app_state.db_pool.clone();
    let state = app_state
        .provinces
        .load(PROVINCES_CACHE_KEY, app_state.catalog_ttl, move || {
            query_provinces(pool)
        })
        .await;
    fetch_state_into_result(state, "provinces")
}

/// Reloads the varieties list after a CMS write. A failed reload only leaves
/// the cache empty; the next read retries.
pub async fn refresh_varieties(app_state: &AppState) {
    let pool = app_state.db_pool.clone();
    let state = app_state
        .varieties
        .refetch(VARIETIES_CACHE_KEY, app_state.catalog_ttl, move || {
            query_varieties(pool)
        })
        .await;
    if let Some(error) = state.error {
        tracing::warn!("Varieties refresh failed: {}", error);
    }
}

pub async fn refresh_provinces(app_state: &AppState) {
    let pool = app_state.db_pool.clone();
    let state = app_state
        .provinces
        .refetch(PROVINCES_CACHE_KEY, app_state.catalog_ttl, move || {
            query_provinces(pool)
        })
        .await;
    if let Some(error) = state.error {
        tracing::warn!("Provinces refresh failed: {}", error);
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub items: Option<usize>,
    pub cached_entries: u64,
}

impl ResourceStatus {
    fn of<T: Clone + Send + Sync + 'static>(resource: &CachedResource<Vec<T>>) -> Self {
        let state = resource.current();
        Self {
            loading: state.loading,
            error: state.error,
            items: state.data.as_ref().map(Vec::len),
            cached_entries: resource.cache().entry_count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub varieties: ResourceStatus,
    pub provinces: ResourceStatus,
    pub catalog_pages: u64,
}

pub fn cache_status(app_state: &AppState) -> CacheStatus {
    CacheStatus {
        varieties: ResourceStatus::of(&app_state.varieties),
        provinces: ResourceStatus::of(&app_state.provinces),
        catalog_pages: app_state.product_cache.entry_count(),
    }
}

/// Drops every cached catalog page. Called after any product or batch write.
pub fn invalidate_catalog(app_state: &AppState) {
    app_state.product_cache.clear_all();
    tracing::debug!("Catalog listing cache cleared");
}

pub async fn list_catalog_page(
    app_state: &AppState,
    params: &ProductListingParams,
) -> Result<PaginatedProducts, AppError> {
    let cache_key = params.cache_key();
    if let Some(page) = app_state.product_cache.get(&cache_key).await {
        tracing::info!("Cache HIT for catalog page '{}'", cache_key);
        return Ok(page);
    }
    tracing::info!("Cache MISS for catalog page '{}'", cache_key);

    let limit = params.limit();
    let offset = params.offset();

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
            SELECT p.*, v.name AS variety_name, COUNT(*) OVER() AS total_count
            FROM products p
            LEFT JOIN varieties v ON v.id = p.variety_id
            WHERE p.is_active = TRUE
        "#,
    );

    if let Some(roast) = params.roast() {
        query_builder.push(" AND p.roast_level = ").push_bind(roast);
    }
    if let Some(variety_id) = params.variety_id() {
        query_builder.push(" AND p.variety_id = ").push_bind(variety_id);
    }
    if let Some(search_term) = params.search() {
        let like_pattern = format!("%{}%", search_term);
        query_builder
            .push(" AND (p.name_es ILIKE ")
            .push_bind(like_pattern.clone())
            .push(" OR p.name_en ILIKE ")
            .push_bind(like_pattern.clone())
            .push(" OR p.sku ILIKE ")
            .push_bind(like_pattern.clone())
            .push(" OR v.name ILIKE ")
            .push_bind(like_pattern)
            .push(")");
    }

    query_builder.push(format!(
        " ORDER BY {} {} NULLS LAST, p.id ASC",
        params.sort_column(),
        params.order()
    ));
    query_builder.push(" LIMIT ").push_bind(limit);
    query_builder.push(" OFFSET ").push_bind(offset);

    let rows: Vec<ProductWithTotalCount> = query_builder
        .build_query_as()
        .fetch_all(&app_state.db_pool)
        .await?;

    let total_items = rows.first().map_or(0, |row| row.total_count.unwrap_or(0));
    let products = rows
        .into_iter()
        .map(|row| ProductListItem {
            product: row.product,
            variety_name: row.variety_name,
        })
        .collect();

    let page = PaginatedProducts {
        products,
        pagination: Pagination::new(total_items, limit, offset),
    };

    app_state
        .product_cache
        .set_with_ttl(cache_key, page.clone(), app_state.catalog_ttl)
        .await;

    Ok(page)
}

pub async fn find_product_by_slug(pool: &PgPool, slug: &str) -> Result<ProductDetail, AppError> {
    let row = sqlx::query_as::<_, ProductWithTotalCount>(
        r#"
            SELECT p.*, v.name AS variety_name, NULL::BIGINT AS total_count
            FROM products p
            LEFT JOIN varieties v ON v.id = p.variety_id
            WHERE p.slug = $1 AND p.is_active = TRUE
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        tracing::warn!("Product with slug '{}' not found", slug);
        AppError::not_found("Producto")
    })?;

    Ok(ProductDetail {
        product: row.product,
        variety_name: row.variety_name,
    })
}

/// Active batches linked to a product, newest harvest first.
pub async fn batches_for_product(
    pool: &PgPool,
    product_id: i32,
) -> Result<Vec<TraceabilityRecord>, AppError> {
    let sql = format!(
        "{} JOIN product_batches pb ON pb.batch_id = b.id \
         WHERE pb.product_id = $1 AND b.is_active = TRUE \
         ORDER BY b.harvest_date DESC NULLS LAST, b.id DESC",
        TRACEABILITY_SELECT
    );
    let batches = sqlx::query_as::<_, TraceabilityRecord>(&sql)
        .bind(product_id)
        .fetch_all(pool)
        .await?;
    Ok(batches)
}

/// Batch lookup by printed code. Unknown and deactivated codes are both "not found".
pub async fn find_traceability(pool: &PgPool, code: &str) -> Result<TraceabilityRecord, AppError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::not_found("Lote"));
    }

    let sql = format!(
        "{} WHERE UPPER(b.code) = UPPER($1) AND b.is_active = TRUE",
        TRACEABILITY_SELECT
    );
    sqlx::query_as::<_, TraceabilityRecord>(&sql)
        .bind(code)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Traceability lookup for unknown batch code '{}'", code);
            AppError::not_found("Lote")
        })
}

pub async fn list_active_farmers(pool: &PgPool) -> Result<Vec<Farmer>, AppError> {
    let farmers = sqlx::query_as::<_, Farmer>(
        "SELECT * FROM farmers WHERE is_active = TRUE ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(farmers)
}

pub async fn find_farmer_profile(pool: &PgPool, slug: &str) -> Result<FarmerProfile, AppError> {
    let farmer = sqlx::query_as::<_, Farmer>(
        "SELECT * FROM farmers WHERE slug = $1 AND is_active = TRUE",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Productor"))?;

    let province_name = match farmer.province_id {
        Some(province_id) => {
            sqlx::query_scalar::<_, String>("SELECT name FROM provinces WHERE id = $1")
                .bind(province_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let farms = sqlx::query_as::<_, Farm>(
        "SELECT * FROM farms WHERE farmer_id = $1 ORDER BY name ASC",
    )
    .bind(farmer.id)
    .fetch_all(pool)
    .await?;

    let media = sqlx::query_as::<_, FarmerMedia>(
        "SELECT * FROM farmer_media WHERE farmer_id = $1 ORDER BY sort_order ASC, id ASC",
    )
    .bind(farmer.id)
    .fetch_all(pool)
    .await?;

    Ok(FarmerProfile {
        farmer,
        province_name,
        farms,
        media,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_state_becomes_data() {
        let state = FetchState {
            data: Some(vec![1, 2]),
            loading: false,
            error: None,
        };
        assert_eq!(fetch_state_into_result(state, "numbers").unwrap(), vec![1, 2]);
    }

    #[test]
    fn error_state_becomes_internal_error() {
        let state: FetchState<Vec<i32>> = FetchState {
            data: None,
            loading: false,
            error: Some("pool timed out".into()),
        };
        let err = fetch_state_into_result(state, "varieties").unwrap_err();
        assert!(matches!(err, AppError::InternalServerError(ref m) if m.contains("pool timed out")));
    }

    // Needs a Postgres reachable through DATABASE_URL.
    #[ignore]
    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_batch_code_is_not_found(pool: PgPool) {
        let err = find_traceability(&pool, "NO-EXISTE-001").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[ignore]
    #[sqlx::test(migrations = "./migrations")]
    async fn inactive_batch_is_not_found(pool: PgPool) {
        let farmer_id: i32 = sqlx::query_scalar(
            "INSERT INTO farmers (name, slug) VALUES ('Rosa Muñoz', 'rosa-munoz') RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let farm_id: i32 = sqlx::query_scalar(
            "INSERT INTO farms (farmer_id, name) VALUES ($1, 'La Esperanza') RETURNING id",
        )
        .bind(farmer_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO coffee_batches (code, farm_id, is_active) VALUES ('LE-01', $1, FALSE)")
            .bind(farm_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = find_traceability(&pool, "le-01").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        sqlx::query("UPDATE coffee_batches SET is_active = TRUE WHERE code = 'LE-01'")
            .execute(&pool)
            .await
            .unwrap();
        let record = find_traceability(&pool, " le-01 ").await.unwrap();
        assert_eq!(record.farm_name, "La Esperanza");
        assert_eq!(record.farmer_slug, "rosa-munoz");
    }
}
