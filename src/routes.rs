// src/routes.rs

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cart_handlers::*;
use crate::cms_handlers::*;
use crate::handlers::*;
use crate::pages::{catalog_page, farmer_page, product_page, traceability_page};
use crate::sitemap_generator::sitemap_handler;
use crate::state::AppState;

fn public_api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{slug}", get(get_product_details))
        .route("/farmers", get(list_farmers))
        .route("/farmers/{slug}", get(get_farmer_profile))
        .route("/batches/{code}", get(get_batch_traceability))
        .route("/varieties", get(list_varieties))
        .route("/provinces", get(list_provinces))
        .route("/auth/login", post(login_handler))
        .route("/auth/me", get(me_handler))
}

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(get_cart_handler)
                .put(load_cart_handler)
                .delete(clear_cart_handler),
        )
        .route("/items", post(add_cart_item_handler))
        .route(
            "/items/{product_id}",
            put(set_cart_item_quantity_handler).delete(remove_cart_item_handler),
        )
        .route("/checkout", post(checkout_handler))
}

fn cms_routes() -> Router<AppState> {
    Router::new()
        .route("/farmers", get(cms_list_farmers).post(cms_create_farmer))
        .route(
            "/farmers/{id}",
            get(cms_get_farmer)
                .put(cms_update_farmer)
                .delete(cms_archive_farmer),
        )
        .route(
            "/farmers/{id}/media",
            get(cms_list_farmer_media).post(cms_create_farmer_media),
        )
        .route("/media/{id}", put(cms_update_media).delete(cms_delete_media))
        .route("/farms", get(cms_list_farms).post(cms_create_farm))
        .route(
            "/farms/{id}",
            get(cms_get_farm).put(cms_update_farm).delete(cms_delete_farm),
        )
        .route("/batches", get(cms_list_batches).post(cms_create_batch))
        .route(
            "/batches/{id}",
            get(cms_get_batch)
                .put(cms_update_batch)
                .delete(cms_archive_batch),
        )
        .route("/products", get(cms_list_products).post(cms_create_product))
        .route(
            "/products/{id}",
            get(cms_get_product)
                .put(cms_update_product)
                .delete(cms_archive_product),
        )
        .route("/products/{id}/batches", put(cms_set_product_batches))
        .route("/varieties", get(cms_list_varieties).post(cms_create_variety))
        .route(
            "/varieties/{id}",
            get(cms_get_variety)
                .put(cms_update_variety)
                .delete(cms_delete_variety),
        )
        .route("/provinces", get(cms_list_provinces).post(cms_create_province))
        .route(
            "/provinces/{id}",
            get(cms_get_province)
                .put(cms_update_province)
                .delete(cms_delete_province),
        )
        .route("/cache", get(cms_cache_status).delete(cms_flush_cache))
        .route("/users", post(cms_create_user))
}

fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog_page))
        .route("/productos/{slug}", get(product_page))
        .route("/productores/{slug}", get(farmer_page))
        .route("/trazabilidad/{code}", get(traceability_page))
        .route("/sitemap.xml", get(sitemap_handler))
}

/// Without a configured origin no cross-origin request is allowed.
fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let Some(origin) = allowed_origin else {
        return CorsLayer::new();
    };
    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, CART_SESSION_HEADER.clone()])
            .expose_headers([CART_SESSION_HEADER.clone()])
            .allow_credentials(true),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
            CorsLayer::new()
        }
    }
}

pub fn build_router(app_state: AppState, static_dir: &str, cors_origin: Option<&str>) -> Router {
    Router::new()
        .nest("/api", public_api_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/cms", cms_routes())
        .merge(page_routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(app_state)
}
