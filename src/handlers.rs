// src/handlers.rs
use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};
use validator::Validate;

use crate::auth::{create_jwt, verify_password};
use crate::auth_models::{LoginPayload, TokenClaims};
use crate::errors::AppError;
use crate::filters::ProductListingParams;
use crate::models::{User, UserPublic};
use crate::pagination::PaginatedProducts;
use crate::response::{ApiResult, JsonBody, ok};
use crate::services;
use crate::state::AppState;

// --- CATALOG ---

pub async fn list_products(
    State(app_state): State<AppState>,
    Query(params): Query<ProductListingParams>,
) -> ApiResult<PaginatedProducts> {
    tracing::info!("GET /api/products with params: {:?}", params);
    let page = services::list_catalog_page(&app_state, &params).await?;
    Ok(ok(page))
}

pub async fn get_product_details(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Value> {
    tracing::info!("GET /api/products/{}", slug);
    let product = services::find_product_by_slug(&app_state.db_pool, &slug).await?;
    let batches = services::batches_for_product(&app_state.db_pool, product.product.id).await?;
    Ok(ok(json!({ "product": product, "batches": batches })))
}

// --- PRODUCERS & TRACEABILITY ---

pub async fn list_farmers(State(app_state): State<AppState>) -> ApiResult<Value> {
    let farmers = services::list_active_farmers(&app_state.db_pool).await?;
    Ok(ok(json!({ "farmers": farmers })))
}

pub async fn get_farmer_profile(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<services::FarmerProfile> {
    tracing::info!("GET /api/farmers/{}", slug);
    let profile = services::find_farmer_profile(&app_state.db_pool, &slug).await?;
    Ok(ok(profile))
}

pub async fn get_batch_traceability(
    State(app_state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Value> {
    tracing::info!("GET /api/batches/{}", code);
    let batch = services::find_traceability(&app_state.db_pool, &code).await?;
    Ok(ok(json!({ "batch": batch })))
}

// --- REFERENCE DATA ---

pub async fn list_varieties(State(app_state): State<AppState>) -> ApiResult<Value> {
    let varieties = services::list_varieties(&app_state).await?;
    Ok(ok(json!({ "varieties": varieties })))
}

pub async fn list_provinces(State(app_state): State<AppState>) -> ApiResult<Value> {
    let provinces = services::list_provinces(&app_state).await?;
    Ok(ok(json!({ "provinces": provinces })))
}

// --- AUTH ---

pub async fn login_handler(
    State(app_state): State<AppState>,
    WithRejection(Json(payload), _): JsonBody<LoginPayload>,
) -> ApiResult<Value> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Failed login attempt: user {} not found", email);
            AppError::InvalidLoginCredentials
        })?;

    if !verify_password(&user.password_hash, &payload.password)? {
        tracing::warn!("Failed login attempt for {}: wrong password", email);
        return Err(AppError::InvalidLoginCredentials);
    }

    if !user.is_active {
        tracing::warn!("Login refused for deactivated user {}", email);
        return Err(AppError::Forbidden("La cuenta está desactivada".into()));
    }

    let token = create_jwt(
        user.id,
        &user.email,
        user.role,
        &app_state.jwt_secret,
        app_state.jwt_expiration_hours,
    )?;

    tracing::info!("User {} ({}) logged in", user.email, user.id);
    let user: UserPublic = user.into();
    Ok(ok(json!({ "token": token, "user": user })))
}

pub async fn me_handler(
    State(app_state): State<AppState>,
    claims: TokenClaims,
) -> ApiResult<Value> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = TRUE")
        .bind(claims.sub)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Usuario"))?;

    let user: UserPublic = user.into();
    Ok(ok(json!({ "user": user, "expires_at": claims.exp })))
}
