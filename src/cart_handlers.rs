// src/cart_handlers.rs

//! Cart endpoints. The cart lives server side, keyed by a session id that the
//! client sends back in `X-Cart-Session` (or the `cart_session` cookie). A
//! request without a usable id starts a new, empty cart.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::{HeaderName, HeaderValue, header, request::Parts};
use axum::response::{IntoResponseParts, ResponseParts};
use axum::{Json, RequestPartsExt};
use axum_extra::TypedHeader;
use axum_extra::extract::WithRejection;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::{self, HeaderMapExt};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::{CartAction, CartItem, CartState, MAX_LINE_QUANTITY};
use crate::cart_storage::{CartStore, cart_storage_key};
use crate::checkout::{build_order_message, whatsapp_link};
use crate::errors::AppError;
use crate::models::{Lang, Product};
use crate::response::{Envelope, JsonBody, ok};
use crate::state::AppState;

pub const CART_SESSION_COOKIE: &str = "cart_session";
const CART_SESSION_DAYS: i64 = 30;

pub static CART_SESSION_HEADER: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-cart-session"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XCartSession(pub Uuid);

impl headers::Header for XCartSession {
    fn name() -> &'static HeaderName {
        &CART_SESSION_HEADER
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let uuid = Uuid::parse_str(value.to_str().map_err(|_| headers::Error::invalid())?)
            .map_err(|_| headers::Error::invalid())?;
        Ok(XCartSession(uuid))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0.to_string()) {
            values.extend(std::iter::once(value));
        }
    }
}

/// The cart session of the current request. Echoed back on every response
/// as both the header and the cookie.
#[derive(Debug, Clone, Copy)]
pub struct CartSession {
    pub id: Uuid,
    pub is_new: bool,
}

impl<S: Send + Sync> FromRequestParts<S> for CartSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(TypedHeader(XCartSession(id))) = parts.extract::<TypedHeader<XCartSession>>().await
        {
            return Ok(CartSession { id, is_new: false });
        }

        let from_cookie = CookieJar::from_headers(&parts.headers)
            .get(CART_SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok());
        if let Some(id) = from_cookie {
            return Ok(CartSession { id, is_new: false });
        }

        let id = Uuid::new_v4();
        tracing::debug!("Starting new cart session {}", id);
        Ok(CartSession { id, is_new: true })
    }
}

impl IntoResponseParts for CartSession {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut().typed_insert(XCartSession(self.id));

        let cookie = Cookie::build((CART_SESSION_COOKIE, self.id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(CART_SESSION_DAYS))
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
        Ok(res)
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub session_id: Uuid,
    pub new_session: bool,
    pub cart: CartState,
    pub totals_by_currency: BTreeMap<String, Decimal>,
    pub total_weight_grams: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CartResponse {
    fn new(session: CartSession, cart: &CartState) -> Self {
        Self {
            session_id: session.id,
            new_session: session.is_new,
            cart: cart.clone(),
            totals_by_currency: cart.totals_by_currency(),
            total_weight_grams: cart.total_weight_grams(),
            message: None,
        }
    }

    fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }
}

type CartResult<T> = Result<(CartSession, Json<Envelope<T>>), AppError>;

#[derive(Debug, Deserialize)]
pub struct AddToCartPayload {
    pub product_id: i32,
    pub quantity: Option<i64>,
    #[serde(default)]
    pub lang: Lang,
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityPayload {
    pub quantity: i64,
}

/// A line as the client remembers it. Prices and names are always re-read
/// from the catalog, anything else the client sends is ignored.
#[derive(Debug, Deserialize)]
pub struct CartLine {
    pub product_id: i32,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoadCartPayload {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutPayload {
    #[serde(default)]
    pub lang: Lang,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: Uuid,
    pub whatsapp_url: String,
    pub message: String,
    pub cart: CartState,
}

#[derive(Debug, sqlx::FromRow)]
struct CartProductRow {
    #[sqlx(flatten)]
    product: Product,
    variety_name: Option<String>,
    batch_code: Option<String>,
}

impl CartProductRow {
    fn to_cart_item(&self, quantity: i64) -> CartItem {
        let mut item = CartItem::from_product(
            &self.product,
            self.variety_name.clone(),
            self.batch_code.clone(),
        );
        item.quantity = quantity;
        item
    }
}

const CART_PRODUCT_SELECT: &str = r#"
    SELECT p.*, v.name AS variety_name,
        (
            SELECT b.code
            FROM product_batches pb
            JOIN coffee_batches b ON b.id = pb.batch_id
            WHERE pb.product_id = p.id AND b.is_active = TRUE
            ORDER BY b.harvest_date DESC NULLS LAST, b.id DESC
            LIMIT 1
        ) AS batch_code
    FROM products p
    LEFT JOIN varieties v ON v.id = p.variety_id
"#;

async fn load_cart_products(
    app_state: &AppState,
    product_ids: &[i32],
) -> Result<HashMap<i32, CartProductRow>, AppError> {
    let sql = format!(
        "{} WHERE p.id = ANY($1) AND p.is_active = TRUE",
        CART_PRODUCT_SELECT
    );
    let rows = sqlx::query_as::<_, CartProductRow>(&sql)
        .bind(product_ids.to_vec())
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(rows.into_iter().map(|row| (row.product.id, row)).collect())
}

fn added_message(item: &CartItem, lang: Lang) -> String {
    match lang {
        Lang::Es => format!("{} añadido al carrito", item.name(lang)),
        Lang::En => format!("{} added to cart", item.name(lang)),
    }
}

fn check_quantity_limit(quantity: i64) -> Result<(), AppError> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(AppError::Validation(format!(
            "La cantidad máxima por producto es {}",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

async fn open_store(app_state: &AppState, session: CartSession) -> CartStore<'_> {
    CartStore::open(
        app_state.cart_storage.as_ref(),
        &app_state.cart_locks,
        cart_storage_key(session.id),
    )
    .await
}

// --- HANDLERS ---

pub async fn get_cart_handler(
    State(app_state): State<AppState>,
    session: CartSession,
) -> CartResult<CartResponse> {
    let store = open_store(&app_state, session).await;
    let response = CartResponse::new(session, store.state());
    Ok((session, ok(response)))
}

pub async fn add_cart_item_handler(
    State(app_state): State<AppState>,
    session: CartSession,
    WithRejection(Json(payload), _): JsonBody<AddToCartPayload>,
) -> CartResult<CartResponse> {
    let quantity = payload.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(AppError::Validation(
            "La cantidad debe ser mayor que cero".to_string(),
        ));
    }
    check_quantity_limit(quantity)?;

    let mut products = load_cart_products(&app_state, &[payload.product_id]).await?;
    let row = products.remove(&payload.product_id).ok_or_else(|| {
        tracing::warn!(
            "Cart {} tried to add unknown or inactive product {}",
            session.id,
            payload.product_id
        );
        AppError::not_found("Producto")
    })?;
    let item = row.to_cart_item(1);
    let message = added_message(&item, payload.lang);

    let mut store = open_store(&app_state, session).await;
    let cart = store.dispatch(CartAction::Add { item, quantity }).await;

    tracing::info!(
        "Cart {}: added {} x product {} (items: {})",
        session.id,
        quantity,
        payload.product_id,
        cart.item_count()
    );
    let response = CartResponse::new(session, cart).with_message(message);
    Ok((session, ok(response)))
}

pub async fn set_cart_item_quantity_handler(
    State(app_state): State<AppState>,
    session: CartSession,
    Path(product_id): Path<i32>,
    WithRejection(Json(payload), _): JsonBody<SetQuantityPayload>,
) -> CartResult<CartResponse> {
    check_quantity_limit(payload.quantity)?;
    let mut store = open_store(&app_state, session).await;
    let cart = store
        .dispatch(CartAction::SetQuantity {
            product_id,
            quantity: payload.quantity,
        })
        .await;

    tracing::info!(
        "Cart {}: product {} set to quantity {}",
        session.id,
        product_id,
        payload.quantity
    );
    Ok((session, ok(CartResponse::new(session, cart))))
}

pub async fn remove_cart_item_handler(
    State(app_state): State<AppState>,
    session: CartSession,
    Path(product_id): Path<i32>,
) -> CartResult<CartResponse> {
    let mut store = open_store(&app_state, session).await;
    let cart = store.dispatch(CartAction::Remove { product_id }).await;

    tracing::info!("Cart {}: removed product {}", session.id, product_id);
    Ok((session, ok(CartResponse::new(session, cart))))
}

pub async fn clear_cart_handler(
    State(app_state): State<AppState>,
    session: CartSession,
) -> CartResult<CartResponse> {
    let mut store = open_store(&app_state, session).await;
    let cart = store.dispatch(CartAction::Clear).await;

    tracing::info!("Cart {} cleared", session.id);
    Ok((session, ok(CartResponse::new(session, cart))))
}

/// Replaces the whole cart with a client-side snapshot.
pub async fn load_cart_handler(
    State(app_state): State<AppState>,
    session: CartSession,
    WithRejection(Json(payload), _): JsonBody<LoadCartPayload>,
) -> CartResult<CartResponse> {
    let ids: Vec<i32> = payload.items.iter().map(|line| line.product_id).collect();
    let products = if ids.is_empty() {
        HashMap::new()
    } else {
        load_cart_products(&app_state, &ids).await?
    };

    // non-positive quantities and repeated ids are normalized by the reducer
    let mut items = Vec::with_capacity(payload.items.len());
    for line in payload.items {
        match products.get(&line.product_id) {
            Some(row) => items.push(row.to_cart_item(line.quantity)),
            None => tracing::debug!(
                "Cart {}: dropping unavailable product {} from snapshot",
                session.id,
                line.product_id
            ),
        }
    }

    let mut store = open_store(&app_state, session).await;
    let cart = store.dispatch(CartAction::Load { items }).await;

    tracing::info!(
        "Cart {} loaded from snapshot ({} lines)",
        session.id,
        cart.items().len()
    );
    Ok((session, ok(CartResponse::new(session, cart))))
}

pub async fn checkout_handler(
    State(app_state): State<AppState>,
    session: CartSession,
    WithRejection(Json(payload), _): JsonBody<CheckoutPayload>,
) -> CartResult<CheckoutResponse> {
    let store = open_store(&app_state, session).await;
    let cart = store.into_state();

    if cart.is_empty() {
        return Err(AppError::BadRequest("El carrito está vacío".to_string()));
    }

    let message = build_order_message(
        &cart,
        payload.lang,
        payload.customer_name.as_deref(),
        payload.notes.as_deref(),
    );
    let whatsapp_url = whatsapp_link(&app_state.whatsapp_number, &message);

    tracing::info!(
        "Cart {} checked out via WhatsApp: {} item(s), total {}",
        session.id,
        cart.item_count(),
        cart.total()
    );
    let response = CheckoutResponse {
        session_id: session.id,
        whatsapp_url,
        message,
        cart,
    };
    Ok((session, ok(response)))
}
