// src/cms_handlers.rs

//! Authenticated CMS API under `/api/cms`.
//!
//! Farmers, batches and products are archived (`is_active = false`) rather
//! than deleted, so printed batch codes and old links keep resolving to a 404
//! instead of someone else's record. Farms, varieties, provinces and media are
//! deleted outright; a foreign key still pointing at them turns into a 400.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::WithRejection;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use validator::Validate;

use crate::auth::hash_password;
use crate::auth_models::CreateUserPayload;
use crate::config::AdminBootstrap;
use crate::errors::AppError;
use crate::middleware::{AdminUser, CmsUser};
use crate::models::*;
use crate::patch::{Patch, PatchSchema};
use crate::response::{ApiResult, CreatedResult, JsonBody, created, ok};
use crate::services;
use crate::slugs::{derive_slug, slug_candidates};
use crate::state::AppState;

const FARMER_NOT_FOUND: &str = "Productor no encontrado";
const FARM_NOT_FOUND: &str = "Finca no encontrada";
const BATCH_NOT_FOUND: &str = "Lote no encontrado";
const PRODUCT_NOT_FOUND: &str = "Producto no encontrado";
const VARIETY_NOT_FOUND: &str = "Variedad no encontrada";
const PROVINCE_NOT_FOUND: &str = "Provincia no encontrada";
const MEDIA_NOT_FOUND: &str = "Archivo multimedia no encontrado";

static FARMER_PATCH: PatchSchema = PatchSchema {
    table: "farmers",
    columns: &[
        "name", "slug", "bio_es", "bio_en", "photo_url", "province_id", "phone", "is_active",
    ],
    touches_updated_at: true,
};

static FARM_PATCH: PatchSchema = PatchSchema {
    table: "farms",
    columns: &[
        "farmer_id",
        "name",
        "province_id",
        "municipality",
        "altitude_masl",
        "area_hectares",
    ],
    touches_updated_at: true,
};

static BATCH_PATCH: PatchSchema = PatchSchema {
    table: "coffee_batches",
    columns: &[
        "code",
        "farm_id",
        "variety_id",
        "process_method",
        "harvest_date",
        "processing_date",
        "roast_date",
        "roast_level",
        "cupping_score",
        "weight_kg",
        "notes_es",
        "notes_en",
        "is_active",
    ],
    touches_updated_at: true,
};

static PRODUCT_PATCH: PatchSchema = PatchSchema {
    table: "products",
    columns: &[
        "sku",
        "slug",
        "name_es",
        "name_en",
        "description_es",
        "description_en",
        "price",
        "currency",
        "price_usd",
        "weight_grams",
        "image_url",
        "roast_level",
        "variety_id",
        "is_active",
    ],
    touches_updated_at: true,
};

static VARIETY_PATCH: PatchSchema = PatchSchema {
    table: "varieties",
    columns: &["name", "description_es", "description_en"],
    touches_updated_at: false,
};

static PROVINCE_PATCH: PatchSchema = PatchSchema {
    table: "provinces",
    columns: &["name"],
    touches_updated_at: false,
};

static MEDIA_PATCH: PatchSchema = PatchSchema {
    table: "farmer_media",
    columns: &["media_type", "url", "caption_es", "caption_en", "sort_order"],
    touches_updated_at: false,
};

// --- SHARED HELPERS ---

async fn fetch_by_id<'c, T, E>(
    executor: E,
    table: &'static str,
    id: i32,
    not_found: &'static str,
) -> Result<T, AppError>
where
    E: PgExecutor<'c>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = $1", table);
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound(not_found.to_string()))
}

/// Runs a sparse update. An empty patch is a no-op that returns the current row.
async fn run_patch<'c, T, E>(
    executor: E,
    patch: Patch<'_>,
    id: i32,
    not_found: &'static str,
) -> Result<T, AppError>
where
    E: PgExecutor<'c>,
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let table = patch.table();
    match patch.build(id)? {
        Some(mut builder) => builder
            .build_query_as::<T>()
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::NotFound(not_found.to_string())),
        None => {
            tracing::debug!("Empty update for {} {}, returning current row", table, id);
            fetch_by_id(executor, table, id, not_found).await
        }
    }
}

async fn delete_by_id(
    pool: &PgPool,
    table: &'static str,
    id: i32,
    not_found: &'static str,
) -> Result<(), AppError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", table);
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(not_found.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum SlugOwner {
    Farmers,
    Products,
}

impl SlugOwner {
    fn taken_sql(self) -> &'static str {
        match self {
            SlugOwner::Farmers => {
                "SELECT EXISTS(SELECT 1 FROM farmers WHERE slug = $1)"
            }
            SlugOwner::Products => {
                "SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1)"
            }
        }
    }
}

async fn unique_slug(
    pool: &PgPool,
    owner: SlugOwner,
    source: &str,
) -> Result<String, AppError> {
    let base = derive_slug(source)?;
    for candidate in slug_candidates(&base) {
        let taken = sqlx::query_scalar::<_, bool>(owner.taken_sql())
            .bind(&candidate)
            .fetch_one(pool)
            .await?;
        if !taken {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(format!(
        "No hay un slug libre para '{}'",
        base
    )))
}

/// A slug typed by an editor is normalized, not trusted. Blank means "derive it".
fn explicit_slug(raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Some(derive_slug(raw)?)),
        None => Ok(None),
    }
}

fn ensure_non_negative(value: Option<Decimal>, message: &str) -> Result<(), AppError> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => {
            Err(AppError::Validation(message.to_string()))
        }
        _ => Ok(()),
    }
}

fn ensure_cupping_score(score: Option<Decimal>) -> Result<(), AppError> {
    match score {
        Some(s) if s < Decimal::ZERO || s > Decimal::ONE_HUNDRED => Err(AppError::Validation(
            "El puntaje de taza debe estar entre 0 y 100".to_string(),
        )),
        _ => Ok(()),
    }
}

fn normalize_currency(currency: &str) -> String {
    currency.trim().to_uppercase()
}

// --- FARMERS ---

pub async fn cms_list_farmers(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<Value> {
    let farmers = sqlx::query_as::<_, Farmer>("SELECT * FROM farmers ORDER BY name ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(ok(json!({ "farmers": farmers })))
}

pub async fn cms_get_farmer(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let farmer: Farmer = fetch_by_id(&app_state.db_pool, "farmers", id, FARMER_NOT_FOUND).await?;
    Ok(ok(json!({ "farmer": farmer })))
}

pub async fn cms_create_farmer(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateFarmerPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;

    let slug = match explicit_slug(payload.slug.as_deref())? {
        Some(slug) => slug,
        None => unique_slug(&app_state.db_pool, SlugOwner::Farmers, &payload.name).await?,
    };

    let farmer = sqlx::query_as::<_, Farmer>(
        r#"
            INSERT INTO farmers (name, slug, bio_es, bio_en, photo_url, province_id, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&slug)
    .bind(&payload.bio_es)
    .bind(&payload.bio_en)
    .bind(&payload.photo_url)
    .bind(payload.province_id)
    .bind(&payload.phone)
    .fetch_one(&app_state.db_pool)
    .await?;

    tracing::info!("Farmer {} ('{}') created by {}", farmer.id, farmer.slug, user.email);
    Ok(created(json!({ "farmer": farmer })))
}

pub async fn cms_update_farmer(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateFarmerPayload>,
) -> ApiResult<Value> {
    payload.validate()?;
    let slug = explicit_slug(payload.slug.as_deref())?;

    let mut patch = Patch::new(&FARMER_PATCH);
    patch
        .set("name", payload.name.map(|n| n.trim().to_string()))
        .set("slug", slug)
        .set("bio_es", payload.bio_es)
        .set("bio_en", payload.bio_en)
        .set("photo_url", payload.photo_url)
        .set("province_id", payload.province_id)
        .set("phone", payload.phone)
        .set("is_active", payload.is_active);

    let farmer: Farmer = run_patch(&app_state.db_pool, patch, id, FARMER_NOT_FOUND).await?;
    tracing::info!("Farmer {} updated by {}", id, user.email);
    Ok(ok(json!({ "farmer": farmer })))
}

pub async fn cms_archive_farmer(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let farmer = sqlx::query_as::<_, Farmer>(
        "UPDATE farmers SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(FARMER_NOT_FOUND.to_string()))?;

    tracing::info!("Farmer {} archived by {}", id, user.email);
    Ok(ok(json!({ "farmer": farmer })))
}

// --- FARMS ---

#[derive(Debug, Default, Deserialize)]
pub struct FarmListParams {
    pub farmer_id: Option<i32>,
}

pub async fn cms_list_farms(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Query(params): Query<FarmListParams>,
) -> ApiResult<Value> {
    let farms = sqlx::query_as::<_, Farm>(
        "SELECT * FROM farms WHERE ($1::INT IS NULL OR farmer_id = $1) ORDER BY name ASC",
    )
    .bind(params.farmer_id)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(ok(json!({ "farms": farms })))
}

pub async fn cms_get_farm(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let farm: Farm = fetch_by_id(&app_state.db_pool, "farms", id, FARM_NOT_FOUND).await?;
    Ok(ok(json!({ "farm": farm })))
}

pub async fn cms_create_farm(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateFarmPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;
    ensure_non_negative(payload.area_hectares, "El área no puede ser negativa")?;

    let farm = sqlx::query_as::<_, Farm>(
        r#"
            INSERT INTO farms (farmer_id, name, province_id, municipality, altitude_masl, area_hectares)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        "#,
    )
    .bind(payload.farmer_id)
    .bind(payload.name.trim())
    .bind(payload.province_id)
    .bind(&payload.municipality)
    .bind(payload.altitude_masl)
    .bind(payload.area_hectares)
    .fetch_one(&app_state.db_pool)
    .await?;

    tracing::info!("Farm {} created for farmer {} by {}", farm.id, farm.farmer_id, user.email);
    Ok(created(json!({ "farm": farm })))
}

pub async fn cms_update_farm(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateFarmPayload>,
) -> ApiResult<Value> {
    payload.validate()?;
    ensure_non_negative(payload.area_hectares.flatten(), "El área no puede ser negativa")?;

    let mut patch = Patch::new(&FARM_PATCH);
    patch
        .set("farmer_id", payload.farmer_id)
        .set("name", payload.name.map(|n| n.trim().to_string()))
        .set("province_id", payload.province_id)
        .set("municipality", payload.municipality)
        .set("altitude_masl", payload.altitude_masl)
        .set("area_hectares", payload.area_hectares);

    let farm: Farm = run_patch(&app_state.db_pool, patch, id, FARM_NOT_FOUND).await?;
    tracing::info!("Farm {} updated by {}", id, user.email);
    Ok(ok(json!({ "farm": farm })))
}

pub async fn cms_delete_farm(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    delete_by_id(&app_state.db_pool, "farms", id, FARM_NOT_FOUND).await?;
    tracing::info!("Farm {} deleted by {}", id, user.email);
    Ok(ok(json!({ "deleted_id": id })))
}

// --- BATCHES ---

pub async fn cms_list_batches(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<Value> {
    let batches = sqlx::query_as::<_, CoffeeBatch>(
        "SELECT * FROM coffee_batches ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(ok(json!({ "batches": batches })))
}

pub async fn cms_get_batch(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let batch: CoffeeBatch =
        fetch_by_id(&app_state.db_pool, "coffee_batches", id, BATCH_NOT_FOUND).await?;
    Ok(ok(json!({ "batch": batch })))
}

pub async fn cms_create_batch(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateBatchPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;
    ensure_cupping_score(payload.cupping_score)?;
    ensure_non_negative(payload.weight_kg, "El peso del lote no puede ser negativo")?;

    let batch = sqlx::query_as::<_, CoffeeBatch>(
        r#"
            INSERT INTO coffee_batches (
                code, farm_id, variety_id, process_method, harvest_date, processing_date,
                roast_date, roast_level, cupping_score, weight_kg, notes_es, notes_en
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
        "#,
    )
    .bind(payload.code.trim())
    .bind(payload.farm_id)
    .bind(payload.variety_id)
    .bind(payload.process_method)
    .bind(payload.harvest_date)
    .bind(payload.processing_date)
    .bind(payload.roast_date)
    .bind(payload.roast_level)
    .bind(payload.cupping_score)
    .bind(payload.weight_kg)
    .bind(&payload.notes_es)
    .bind(&payload.notes_en)
    .fetch_one(&app_state.db_pool)
    .await?;

    services::invalidate_catalog(&app_state);
    tracing::info!("Batch {} ('{}') created by {}", batch.id, batch.code, user.email);
    Ok(created(json!({ "batch": batch })))
}

pub async fn cms_update_batch(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateBatchPayload>,
) -> ApiResult<Value> {
    payload.validate()?;
    ensure_cupping_score(payload.cupping_score.flatten())?;
    ensure_non_negative(payload.weight_kg.flatten(), "El peso del lote no puede ser negativo")?;

    let mut patch = Patch::new(&BATCH_PATCH);
    patch
        .set("code", payload.code.map(|c| c.trim().to_string()))
        .set("farm_id", payload.farm_id)
        .set("variety_id", payload.variety_id)
        .set("process_method", payload.process_method)
        .set("harvest_date", payload.harvest_date)
        .set("processing_date", payload.processing_date)
        .set("roast_date", payload.roast_date)
        .set("roast_level", payload.roast_level)
        .set("cupping_score", payload.cupping_score)
        .set("weight_kg", payload.weight_kg)
        .set("notes_es", payload.notes_es)
        .set("notes_en", payload.notes_en)
        .set("is_active", payload.is_active);

    let batch: CoffeeBatch = run_patch(&app_state.db_pool, patch, id, BATCH_NOT_FOUND).await?;
    services::invalidate_catalog(&app_state);
    tracing::info!("Batch {} updated by {}", id, user.email);
    Ok(ok(json!({ "batch": batch })))
}

pub async fn cms_archive_batch(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let batch = sqlx::query_as::<_, CoffeeBatch>(
        "UPDATE coffee_batches SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(BATCH_NOT_FOUND.to_string()))?;

    services::invalidate_catalog(&app_state);
    tracing::info!("Batch {} archived by {}", id, user.email);
    Ok(ok(json!({ "batch": batch })))
}

// --- PRODUCTS ---

async fn replace_batch_links(
    tx: &mut Transaction<'_, Postgres>,
    product_id: i32,
    batch_ids: &[i32],
) -> Result<Vec<i32>, AppError> {
    let mut ids = batch_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    sqlx::query("DELETE FROM product_batches WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut **tx)
        .await?;

    if !ids.is_empty() {
        sqlx::query(
            "INSERT INTO product_batches (product_id, batch_id) SELECT $1, UNNEST($2::INT[])",
        )
        .bind(product_id)
        .bind(ids.clone())
        .execute(&mut **tx)
        .await?;
    }

    Ok(ids)
}

async fn linked_batch_ids(pool: &PgPool, product_id: i32) -> Result<Vec<i32>, AppError> {
    let ids = sqlx::query_scalar::<_, i32>(
        "SELECT batch_id FROM product_batches WHERE product_id = $1 ORDER BY batch_id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn cms_list_products(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<Value> {
    let products =
        sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at DESC, id DESC")
            .fetch_all(&app_state.db_pool)
            .await?;
    Ok(ok(json!({ "products": products })))
}

pub async fn cms_get_product(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let product: Product =
        fetch_by_id(&app_state.db_pool, "products", id, PRODUCT_NOT_FOUND).await?;
    let batch_ids = linked_batch_ids(&app_state.db_pool, id).await?;
    Ok(ok(json!({ "product": product, "batch_ids": batch_ids })))
}

pub async fn cms_create_product(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateProductPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;
    ensure_non_negative(payload.price, "El precio no puede ser negativo")?;
    ensure_non_negative(payload.price_usd, "El precio en USD no puede ser negativo")?;

    let slug = match explicit_slug(payload.slug.as_deref())? {
        Some(slug) => slug,
        None => {
            unique_slug(&app_state.db_pool, SlugOwner::Products, &payload.name_es).await?
        }
    };
    let currency = payload
        .currency
        .as_deref()
        .map(normalize_currency)
        .unwrap_or_else(|| "COP".to_string());

    let mut tx = app_state.db_pool.begin().await?;

    let product = sqlx::query_as::<_, Product>(
        r#"
            INSERT INTO products (
                sku, slug, name_es, name_en, description_es, description_en, price, currency,
                price_usd, weight_grams, image_url, roast_level, variety_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
        "#,
    )
    .bind(payload.sku.trim())
    .bind(&slug)
    .bind(payload.name_es.trim())
    .bind(payload.name_en.trim())
    .bind(&payload.description_es)
    .bind(&payload.description_en)
    .bind(payload.price)
    .bind(&currency)
    .bind(payload.price_usd)
    .bind(payload.weight_grams.unwrap_or(0))
    .bind(&payload.image_url)
    .bind(payload.roast_level)
    .bind(payload.variety_id)
    .fetch_one(&mut *tx)
    .await?;

    let batch_ids = replace_batch_links(&mut tx, product.id, &payload.batch_ids).await?;
    tx.commit().await?;

    services::invalidate_catalog(&app_state);
    tracing::info!(
        "Product {} ('{}') created by {} with {} batch link(s)",
        product.id,
        product.sku,
        user.email,
        batch_ids.len()
    );
    Ok(created(json!({ "product": product, "batch_ids": batch_ids })))
}

pub async fn cms_update_product(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateProductPayload>,
) -> ApiResult<Value> {
    payload.validate()?;
    ensure_non_negative(payload.price.flatten(), "El precio no puede ser negativo")?;
    ensure_non_negative(
        payload.price_usd.flatten(),
        "El precio en USD no puede ser negativo",
    )?;
    let slug = explicit_slug(payload.slug.as_deref())?;

    let mut patch = Patch::new(&PRODUCT_PATCH);
    patch
        .set("sku", payload.sku.map(|s| s.trim().to_string()))
        .set("slug", slug)
        .set("name_es", payload.name_es.map(|n| n.trim().to_string()))
        .set("name_en", payload.name_en.map(|n| n.trim().to_string()))
        .set("description_es", payload.description_es)
        .set("description_en", payload.description_en)
        .set("price", payload.price)
        .set("currency", payload.currency.as_deref().map(normalize_currency))
        .set("price_usd", payload.price_usd)
        .set("weight_grams", payload.weight_grams)
        .set("image_url", payload.image_url)
        .set("roast_level", payload.roast_level)
        .set("variety_id", payload.variety_id)
        .set("is_active", payload.is_active);

    let mut tx = app_state.db_pool.begin().await?;
    let product: Product = run_patch(&mut *tx, patch, id, PRODUCT_NOT_FOUND).await?;
    let batch_ids = match payload.batch_ids {
        Some(batch_ids) => Some(replace_batch_links(&mut tx, id, &batch_ids).await?),
        None => None,
    };
    tx.commit().await?;

    let batch_ids = match batch_ids {
        Some(ids) => ids,
        None => linked_batch_ids(&app_state.db_pool, id).await?,
    };

    services::invalidate_catalog(&app_state);
    tracing::info!("Product {} updated by {}", id, user.email);
    Ok(ok(json!({ "product": product, "batch_ids": batch_ids })))
}

pub async fn cms_set_product_batches(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<ProductBatchesPayload>,
) -> ApiResult<Value> {
    let mut tx = app_state.db_pool.begin().await?;
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    if !exists {
        return Err(AppError::NotFound(PRODUCT_NOT_FOUND.to_string()));
    }

    let batch_ids = replace_batch_links(&mut tx, id, &payload.batch_ids).await?;
    tx.commit().await?;

    services::invalidate_catalog(&app_state);
    tracing::info!(
        "Product {} batch links replaced by {}: {:?}",
        id,
        user.email,
        batch_ids
    );
    Ok(ok(json!({ "product_id": id, "batch_ids": batch_ids })))
}

pub async fn cms_archive_product(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(PRODUCT_NOT_FOUND.to_string()))?;

    services::invalidate_catalog(&app_state);
    tracing::info!("Product {} archived by {}", id, user.email);
    Ok(ok(json!({ "product": product })))
}

// --- VARIETIES ---

pub async fn cms_list_varieties(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<Value> {
    let varieties = sqlx::query_as::<_, Variety>("SELECT * FROM varieties ORDER BY name ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(ok(json!({ "varieties": varieties })))
}

pub async fn cms_get_variety(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let variety: Variety =
        fetch_by_id(&app_state.db_pool, "varieties", id, VARIETY_NOT_FOUND).await?;
    Ok(ok(json!({ "variety": variety })))
}

pub async fn cms_create_variety(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateVarietyPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;

    let variety = sqlx::query_as::<_, Variety>(
        r#"
            INSERT INTO varieties (name, description_es, description_en)
            VALUES ($1, $2, $3)
            RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description_es)
    .bind(&payload.description_en)
    .fetch_one(&app_state.db_pool)
    .await?;

    services::refresh_varieties(&app_state).await;
    tracing::info!("Variety {} created by {}", variety.id, user.email);
    Ok(created(json!({ "variety": variety })))
}

pub async fn cms_update_variety(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateVarietyPayload>,
) -> ApiResult<Value> {
    payload.validate()?;

    let mut patch = Patch::new(&VARIETY_PATCH);
    patch
        .set("name", payload.name.map(|n| n.trim().to_string()))
        .set("description_es", payload.description_es)
        .set("description_en", payload.description_en);

    let variety: Variety = run_patch(&app_state.db_pool, patch, id, VARIETY_NOT_FOUND).await?;

    services::refresh_varieties(&app_state).await;
    services::invalidate_catalog(&app_state);
    tracing::info!("Variety {} updated by {}", id, user.email);
    Ok(ok(json!({ "variety": variety })))
}

pub async fn cms_delete_variety(
    State(app_state): State<AppState>,
    AdminUser(user): AdminUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    delete_by_id(&app_state.db_pool, "varieties", id, VARIETY_NOT_FOUND).await?;

    services::refresh_varieties(&app_state).await;
    services::invalidate_catalog(&app_state);
    tracing::info!("Variety {} deleted by {}", id, user.email);
    Ok(ok(json!({ "deleted_id": id })))
}

// --- PROVINCES ---

pub async fn cms_list_provinces(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<Value> {
    let provinces = sqlx::query_as::<_, Province>("SELECT * FROM provinces ORDER BY name ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(ok(json!({ "provinces": provinces })))
}

pub async fn cms_get_province(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let province: Province =
        fetch_by_id(&app_state.db_pool, "provinces", id, PROVINCE_NOT_FOUND).await?;
    Ok(ok(json!({ "province": province })))
}

pub async fn cms_create_province(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    WithRejection(Json(payload), _): JsonBody<CreateProvincePayload>,
) -> CreatedResult<Value> {
    payload.validate()?;

    let province = sqlx::query_as::<_, Province>(
        "INSERT INTO provinces (name) VALUES ($1) RETURNING *",
    )
    .bind(payload.name.trim())
    .fetch_one(&app_state.db_pool)
    .await?;

    services::refresh_provinces(&app_state).await;
    tracing::info!("Province {} created by {}", province.id, user.email);
    Ok(created(json!({ "province": province })))
}

pub async fn cms_update_province(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateProvincePayload>,
) -> ApiResult<Value> {
    payload.validate()?;

    let mut patch = Patch::new(&PROVINCE_PATCH);
    patch.set("name", payload.name.map(|n| n.trim().to_string()));

    let province: Province =
        run_patch(&app_state.db_pool, patch, id, PROVINCE_NOT_FOUND).await?;

    services::refresh_provinces(&app_state).await;
    tracing::info!("Province {} updated by {}", id, user.email);
    Ok(ok(json!({ "province": province })))
}

pub async fn cms_delete_province(
    State(app_state): State<AppState>,
    AdminUser(user): AdminUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    delete_by_id(&app_state.db_pool, "provinces", id, PROVINCE_NOT_FOUND).await?;

    services::refresh_provinces(&app_state).await;
    tracing::info!("Province {} deleted by {}", id, user.email);
    Ok(ok(json!({ "deleted_id": id })))
}

// --- FARMER MEDIA ---

pub async fn cms_list_farmer_media(
    State(app_state): State<AppState>,
    _user: CmsUser,
    Path(farmer_id): Path<i32>,
) -> ApiResult<Value> {
    let media = sqlx::query_as::<_, FarmerMedia>(
        "SELECT * FROM farmer_media WHERE farmer_id = $1 ORDER BY sort_order ASC, id ASC",
    )
    .bind(farmer_id)
    .fetch_all(&app_state.db_pool)
    .await?;
    Ok(ok(json!({ "media": media })))
}

pub async fn cms_create_farmer_media(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(farmer_id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<CreateMediaPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;
    let _farmer: Farmer =
        fetch_by_id(&app_state.db_pool, "farmers", farmer_id, FARMER_NOT_FOUND).await?;

    let media = sqlx::query_as::<_, FarmerMedia>(
        r#"
            INSERT INTO farmer_media (farmer_id, media_type, url, caption_es, caption_en, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        "#,
    )
    .bind(farmer_id)
    .bind(payload.media_type.unwrap_or(MediaType::Image))
    .bind(&payload.url)
    .bind(&payload.caption_es)
    .bind(&payload.caption_en)
    .bind(payload.sort_order.unwrap_or(0))
    .fetch_one(&app_state.db_pool)
    .await?;

    tracing::info!("Media {} added to farmer {} by {}", media.id, farmer_id, user.email);
    Ok(created(json!({ "media": media })))
}

pub async fn cms_update_media(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<UpdateMediaPayload>,
) -> ApiResult<Value> {
    payload.validate()?;

    let mut patch = Patch::new(&MEDIA_PATCH);
    patch
        .set("media_type", payload.media_type)
        .set("url", payload.url)
        .set("caption_es", payload.caption_es)
        .set("caption_en", payload.caption_en)
        .set("sort_order", payload.sort_order);

    let media: FarmerMedia = run_patch(&app_state.db_pool, patch, id, MEDIA_NOT_FOUND).await?;
    tracing::info!("Media {} updated by {}", id, user.email);
    Ok(ok(json!({ "media": media })))
}

pub async fn cms_delete_media(
    State(app_state): State<AppState>,
    CmsUser(user): CmsUser,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    delete_by_id(&app_state.db_pool, "farmer_media", id, MEDIA_NOT_FOUND).await?;
    tracing::info!("Media {} deleted by {}", id, user.email);
    Ok(ok(json!({ "deleted_id": id })))
}

// --- CACHE ---

pub async fn cms_cache_status(
    State(app_state): State<AppState>,
    _user: CmsUser,
) -> ApiResult<services::CacheStatus> {
    Ok(ok(services::cache_status(&app_state)))
}

/// Drops cached catalog pages and reloads the reference lists.
pub async fn cms_flush_cache(
    State(app_state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<services::CacheStatus> {
    services::invalidate_catalog(&app_state);
    services::refresh_varieties(&app_state).await;
    services::refresh_provinces(&app_state).await;

    tracing::info!("Caches flushed by {}", admin.email);
    Ok(ok(services::cache_status(&app_state)))
}

// --- USERS ---

async fn insert_user(
    pool: &PgPool,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
) -> Result<User, AppError> {
    let password_hash = hash_password(password)?;
    let user = sqlx::query_as::<_, User>(
        r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        "#,
    )
    .bind(email.trim().to_lowercase())
    .bind(password_hash)
    .bind(name.trim())
    .bind(role)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn cms_create_user(
    State(app_state): State<AppState>,
    AdminUser(admin): AdminUser,
    WithRejection(Json(payload), _): JsonBody<CreateUserPayload>,
) -> CreatedResult<Value> {
    payload.validate()?;

    let user = insert_user(
        &app_state.db_pool,
        &payload.email,
        &payload.password,
        &payload.name,
        payload.role,
    )
    .await?;

    tracing::info!("User {} ({}) created by {}", user.email, user.role, admin.email);
    let user: UserPublic = user.into();
    Ok(created(json!({ "user": user })))
}

/// Creates the first administrator when the users table is empty.
pub async fn bootstrap_admin(pool: &PgPool, bootstrap: &AdminBootstrap) -> Result<(), AppError> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        tracing::debug!("Users already present, skipping admin bootstrap");
        return Ok(());
    }

    let admin = insert_user(
        pool,
        &bootstrap.email,
        &bootstrap.password,
        "Administrador",
        Role::Admin,
    )
    .await?;
    tracing::info!("Bootstrapped administrator account {}", admin.email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_slug_means_derive() {
        assert_eq!(explicit_slug(None).unwrap(), None);
        assert_eq!(explicit_slug(Some("   ")).unwrap(), None);
        assert_eq!(
            explicit_slug(Some("Finca El Mirador")).unwrap().as_deref(),
            Some("finca-el-mirador")
        );
        assert!(matches!(explicit_slug(Some("¡¡")), Err(AppError::Validation(_))));
    }

    #[test]
    fn cupping_score_must_be_a_percentage() {
        assert!(ensure_cupping_score(Some(Decimal::new(865, 1))).is_ok());
        assert!(ensure_cupping_score(None).is_ok());
        assert!(ensure_cupping_score(Some(Decimal::from(101))).is_err());
        assert!(ensure_cupping_score(Some(Decimal::from(-1))).is_err());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(ensure_non_negative(Some(Decimal::ZERO), "x").is_ok());
        assert!(ensure_non_negative(Some(Decimal::new(-1, 2)), "x").is_err());
    }

    #[test]
    fn currency_codes_are_upper_case() {
        assert_eq!(normalize_currency(" usd "), "USD");
    }

    #[test]
    fn every_patch_schema_accepts_the_columns_its_handler_sets() {
        let mut patch = Patch::new(&PRODUCT_PATCH);
        for column in PRODUCT_PATCH.columns {
            patch.set(*column, Some(true));
        }
        assert!(patch.build(1).is_ok());

        let mut patch = Patch::new(&MEDIA_PATCH);
        patch.set("sort_order", Some(2)).set("url", Some("https://x.co/a.jpg".to_string()));
        let sql = patch.build(4).unwrap().unwrap().sql().to_string();
        assert_eq!(
            sql,
            "UPDATE farmer_media SET sort_order = $1, url = $2 WHERE id = $3 RETURNING *"
        );
    }
}
