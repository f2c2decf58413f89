// src/cart.rs

//! Shopping cart reducer.
//!
//! `CartState` is a plain value transformed by [`CartAction`]s. Every
//! transition is total: no action can fail, quantities of zero or below
//! collapse into removal. `total` and `item_count` are never edited directly,
//! they are recomputed from `items` at the end of each transition. Line
//! quantities are capped at [`MAX_LINE_QUANTITY`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Lang, Product, RoastLevel};

pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder-coffee.svg";
const FALLBACK_CURRENCY: &str = "USD";

/// Upper bound for a single line; larger quantities are clamped to it.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// One product line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i32,
    pub sku: String,
    pub name_es: String,
    pub name_en: String,
    pub price: Decimal,
    pub currency: String,
    pub weight_grams: i32,
    pub image_url: String,
    pub quantity: i64,
    #[serde(default)]
    pub variety: Option<String>,
    #[serde(default)]
    pub roast_level: Option<RoastLevel>,
    #[serde(default)]
    pub batch_code: Option<String>,
}

impl CartItem {
    /// Snapshot of a catalog product. The localized price wins over the USD
    /// price; a product with neither is added at zero.
    pub fn from_product(
        product: &Product,
        variety: Option<String>,
        batch_code: Option<String>,
    ) -> Self {
        let (price, currency) = match (product.price, product.price_usd) {
            (Some(price), _) => (price, product.currency.clone()),
            (None, Some(price_usd)) => (price_usd, FALLBACK_CURRENCY.to_string()),
            (None, None) => (Decimal::ZERO, FALLBACK_CURRENCY.to_string()),
        };

        CartItem {
            product_id: product.id,
            sku: product.sku.clone(),
            name_es: product.name_es.clone(),
            name_en: product.name_en.clone(),
            price,
            currency,
            weight_grams: product.weight_grams,
            image_url: product
                .image_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            quantity: 1,
            variety,
            roast_level: product.roast_level,
            batch_code,
        }
    }

    pub fn name(&self, lang: Lang) -> &str {
        lang.pick(&self.name_es, &self.name_en)
    }

    pub fn line_total(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    Add { item: CartItem, quantity: i64 },
    Remove { product_id: i32 },
    SetQuantity { product_id: i32, quantity: i64 },
    Clear,
    ToggleVisibility,
    Load { items: Vec<CartItem> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartState {
    items: Vec<CartItem>,
    total: Decimal,
    item_count: i64,
    is_open: bool,
}

impl CartState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn item_count(&self) -> i64 {
        self.item_count
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight_grams(&self) -> i64 {
        self.items
            .iter()
            .map(|item| i64::from(item.weight_grams).saturating_mul(item.quantity))
            .fold(0, i64::saturating_add)
    }

    /// Subtotals per currency, for carts mixing local and USD prices.
    pub fn totals_by_currency(&self) -> BTreeMap<String, Decimal> {
        let mut totals = BTreeMap::new();
        for item in &self.items {
            let subtotal = totals.entry(item.currency.clone()).or_insert(Decimal::ZERO);
            *subtotal = subtotal.saturating_add(item.line_total());
        }
        totals
    }

    pub fn apply(&mut self, action: CartAction) {
        match action {
            CartAction::Add { item, quantity } => self.apply_add(item, quantity),
            CartAction::Remove { product_id } => {
                self.items.retain(|item| item.product_id != product_id);
            }
            CartAction::SetQuantity {
                product_id,
                quantity,
            } => {
                if quantity <= 0 {
                    self.items.retain(|item| item.product_id != product_id);
                } else if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|item| item.product_id == product_id)
                {
                    item.quantity = quantity.min(MAX_LINE_QUANTITY);
                }
            }
            CartAction::Clear => self.items.clear(),
            CartAction::ToggleVisibility => self.is_open = !self.is_open,
            CartAction::Load { items } => {
                self.items.clear();
                for item in items {
                    let quantity = item.quantity;
                    self.apply_add(item, quantity);
                }
            }
        }
        self.recompute();
    }

    pub fn add(&mut self, item: CartItem, quantity: i64) {
        self.apply(CartAction::Add { item, quantity });
    }

    pub fn remove(&mut self, product_id: i32) {
        self.apply(CartAction::Remove { product_id });
    }

    pub fn set_quantity(&mut self, product_id: i32, quantity: i64) {
        self.apply(CartAction::SetQuantity {
            product_id,
            quantity,
        });
    }

    pub fn clear(&mut self) {
        self.apply(CartAction::Clear);
    }

    pub fn toggle_visibility(&mut self) {
        self.apply(CartAction::ToggleVisibility);
    }

    pub fn load(&mut self, items: Vec<CartItem>) {
        self.apply(CartAction::Load { items });
    }

    fn apply_add(&mut self, mut item: CartItem, quantity: i64) {
        if quantity <= 0 {
            return;
        }
        match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .saturating_add(quantity)
                    .min(MAX_LINE_QUANTITY);
            }
            None => {
                item.quantity = quantity.min(MAX_LINE_QUANTITY);
                self.items.push(item);
            }
        }
    }

    fn recompute(&mut self) {
        self.total = self
            .items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        self.item_count = self
            .items
            .iter()
            .map(|item| item.quantity)
            .fold(0, i64::saturating_add);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn item(product_id: i32, price: i64) -> CartItem {
        CartItem {
            product_id,
            sku: format!("SKU-{product_id}"),
            name_es: format!("Café {product_id}"),
            name_en: format!("Coffee {product_id}"),
            price: Decimal::from(price),
            currency: "USD".to_string(),
            weight_grams: 250,
            image_url: PLACEHOLDER_IMAGE.to_string(),
            quantity: 1,
            variety: None,
            roast_level: None,
            batch_code: None,
        }
    }

    fn product() -> Product {
        Product {
            id: 5,
            sku: "HUI-250".to_string(),
            slug: "huila-250".to_string(),
            name_es: "Huila Especial".to_string(),
            name_en: "Huila Specialty".to_string(),
            description_es: None,
            description_en: None,
            price: Some(Decimal::from(42000)),
            currency: "COP".to_string(),
            price_usd: Some(Decimal::new(1150, 2)),
            weight_grams: 250,
            image_url: None,
            roast_level: Some(RoastLevel::Medium),
            variety_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn assert_consistent(state: &CartState) {
        let total: Decimal = state.items().iter().map(|i| i.price * Decimal::from(i.quantity)).sum();
        let count: i64 = state.items().iter().map(|i| i.quantity).sum();
        assert_eq!(state.total(), total);
        assert_eq!(state.item_count(), count);
        assert!(state.items().iter().all(|i| i.quantity > 0));
    }

    #[test]
    fn add_update_remove_scenario() {
        let mut cart = CartState::new();

        cart.add(item(1, 10), 2);
        assert_eq!(cart.total(), Decimal::from(20));
        assert_eq!(cart.item_count(), 2);

        cart.add(item(1, 10), 3);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total(), Decimal::from(50));
        assert_eq!(cart.item_count(), 5);

        cart.set_quantity(1, 1);
        assert_eq!(cart.total(), Decimal::from(10));
        assert_eq!(cart.item_count(), 1);

        cart.remove(1);
        assert_eq!(cart.total(), Decimal::ZERO);
        assert_eq!(cart.item_count(), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn same_id_twice_merges_into_one_line() {
        let mut cart = CartState::new();
        cart.add(item(3, 7), 4);
        cart.add(item(3, 7), 6);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 10);
    }

    #[test]
    fn non_positive_quantity_removes_item() {
        for quantity in [0, -1] {
            let mut cart = CartState::new();
            cart.add(item(1, 10), 2);
            cart.add(item(2, 5), 1);
            cart.set_quantity(1, quantity);
            assert_eq!(cart.items().len(), 1);
            assert_eq!(cart.items()[0].product_id, 2);
            assert_consistent(&cart);
        }
    }

    #[test]
    fn removing_unknown_id_is_a_no_op() {
        let mut cart = CartState::new();
        cart.add(item(1, 10), 2);
        let before = cart.clone();
        cart.remove(99);
        assert_eq!(cart, before);
        cart.set_quantity(99, 4);
        assert_eq!(cart, before);
    }

    #[test]
    fn load_empty_then_add_matches_fresh_cart() {
        let mut loaded = CartState::new();
        loaded.load(vec![]);
        loaded.add(item(1, 10), 2);

        let mut fresh = CartState::new();
        fresh.add(item(1, 10), 2);

        assert_eq!(loaded, fresh);
    }

    #[test]
    fn load_recomputes_instead_of_trusting_input() {
        let mut bad = item(1, 10);
        bad.quantity = 3;
        let mut zero = item(2, 10);
        zero.quantity = 0;
        let mut dup = item(1, 10);
        dup.quantity = 2;

        let mut cart = CartState::new();
        cart.add(item(9, 1), 1);
        cart.load(vec![bad, zero, dup]);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
        assert_eq!(cart.total(), Decimal::from(50));
        assert_consistent(&cart);
    }

    #[test]
    fn clear_and_toggle() {
        let mut cart = CartState::new();
        cart.add(item(1, 10), 1);
        cart.toggle_visibility();
        assert!(cart.is_open());
        assert_eq!(cart.item_count(), 1);

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
        assert!(cart.is_open());
    }

    #[test]
    fn non_positive_add_changes_nothing() {
        let mut cart = CartState::new();
        cart.add(item(1, 10), 0);
        cart.add(item(1, 10), -3);
        assert_eq!(cart, CartState::new());
    }

    #[test]
    fn insertion_order_is_display_order() {
        let mut cart = CartState::new();
        cart.add(item(3, 1), 1);
        cart.add(item(1, 1), 1);
        cart.add(item(2, 1), 1);
        cart.add(item(3, 1), 1);
        let ids: Vec<i32> = cart.items().iter().map(|i| i.product_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn totals_stay_consistent_over_long_sequences() {
        // fixed-seed LCG
        let mut seed: u64 = 0x5eed_cafe;
        let mut next = move |bound: u64| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) % bound
        };

        let mut cart = CartState::new();
        for _ in 0..2_000 {
            let id = next(6) as i32;
            let quantity = next(9) as i64 - 3;
            match next(4) {
                0 => cart.add(item(id, 3 + i64::from(id)), quantity),
                1 => cart.remove(id),
                2 => cart.set_quantity(id, quantity),
                _ => cart.add(item(id, 3 + i64::from(id)), 1),
            }
            assert_consistent(&cart);
        }
    }

    #[test]
    fn product_snapshot_prefers_local_price() {
        let line = CartItem::from_product(&product(), Some("Caturra".into()), None);
        assert_eq!(line.price, Decimal::from(42000));
        assert_eq!(line.currency, "COP");
        assert_eq!(line.image_url, PLACEHOLDER_IMAGE);
        assert_eq!(line.roast_level, Some(RoastLevel::Medium));
        assert_eq!(line.variety.as_deref(), Some("Caturra"));
    }

    #[test]
    fn product_snapshot_falls_back_to_usd() {
        let mut p = product();
        p.price = None;
        p.image_url = Some("https://cdn.example.co/huila.jpg".into());
        let line = CartItem::from_product(&p, None, Some("L-2024-07".into()));
        assert_eq!(line.price, Decimal::new(1150, 2));
        assert_eq!(line.currency, "USD");
        assert_eq!(line.image_url, "https://cdn.example.co/huila.jpg");

        p.price_usd = None;
        let free = CartItem::from_product(&p, None, None);
        assert_eq!(free.price, Decimal::ZERO);
    }

    #[test]
    fn totals_by_currency_split_mixed_carts() {
        let mut cart = CartState::new();
        let mut cop = item(1, 42000);
        cop.currency = "COP".into();
        cart.add(cop, 2);
        cart.add(item(2, 12), 1);
        let totals = cart.totals_by_currency();
        assert_eq!(totals["COP"], Decimal::from(84000));
        assert_eq!(totals["USD"], Decimal::from(12));
        assert_eq!(cart.total_weight_grams(), 750);
    }

    #[test]
    fn huge_quantities_are_clamped_per_line() {
        let mut cart = CartState::new();
        cart.add(item(1, 10), 2);
        cart.set_quantity(1, 40_000_000_000_000_000);
        assert_eq!(cart.items()[0].quantity, MAX_LINE_QUANTITY);
        assert_eq!(cart.total_weight_grams(), 250 * MAX_LINE_QUANTITY);

        cart.add(item(1, 10), i64::MAX);
        cart.add(item(2, 10), i64::MAX);
        assert_eq!(cart.item_count(), 2 * MAX_LINE_QUANTITY);
        assert_eq!(cart.total(), Decimal::from(20 * MAX_LINE_QUANTITY));
        assert_consistent(&cart);
    }

    #[test]
    fn loaded_snapshot_quantities_are_clamped() {
        let mut big = item(1, 10);
        big.quantity = i64::MAX;
        let mut cart = CartState::new();
        cart.load(vec![big]);
        assert_eq!(cart.item_count(), MAX_LINE_QUANTITY);
    }

    #[test]
    fn totals_saturate_at_extreme_prices() {
        let mut costly = item(1, 0);
        costly.price = Decimal::MAX;
        let mut cart = CartState::new();
        cart.add(costly, 5);
        cart.add(item(2, 10), 1);
        assert_eq!(cart.total(), Decimal::MAX);
        assert_eq!(cart.totals_by_currency()["USD"], Decimal::MAX);
    }
}
