// src/checkout.rs

//! WhatsApp checkout handoff. No order is stored: the cart is turned into a
//! pre-filled chat message and the client is sent to `wa.me`.

use std::fmt::Write;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::cart::CartState;
use crate::models::Lang;

const WHATSAPP_BASE_URL: &str = "https://wa.me";

/// Formats an amount the way Colombian shoppers read it: pesos without
/// decimals, other currencies with two, `.` as thousands separator and `,`
/// for decimals in Spanish; the reverse in English.
pub fn format_money(amount: Decimal, currency: &str, lang: Lang) -> String {
    let decimals = if currency.eq_ignore_ascii_case("COP") { 0 } else { 2 };
    let rounded = amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let (thousands, decimal_mark) = match lang {
        Lang::Es => ('.', ','),
        Lang::En => (',', '.'),
    };

    let text = format!("{:.*}", decimals as usize, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(thousands);
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    match frac_part {
        Some(frac) => format!("{sign}{grouped}{decimal_mark}{frac} {currency}"),
        None => format!("{sign}{grouped} {currency}"),
    }
}

/// Builds the chat message summarising the cart.
pub fn build_order_message(
    cart: &CartState,
    lang: Lang,
    customer_name: Option<&str>,
    notes: Option<&str>,
) -> String {
    let (greeting, header, total_label, items_label, name_label, notes_label) = match lang {
        Lang::Es => (
            "¡Hola! Quisiera hacer el siguiente pedido:",
            "Pedido",
            "Total",
            "Unidades",
            "Nombre",
            "Notas",
        ),
        Lang::En => (
            "Hi! I would like to place the following order:",
            "Order",
            "Total",
            "Items",
            "Name",
            "Notes",
        ),
    };

    let mut message = String::new();
    let _ = writeln!(message, "{greeting}");
    let _ = writeln!(message);
    let _ = writeln!(message, "*{header}*");
    for item in cart.items() {
        let _ = write!(
            message,
            "- {} x {} ({}) - {}",
            item.quantity,
            item.name(lang),
            item.sku,
            format_money(item.line_total(), &item.currency, lang)
        );
        if let Some(batch) = &item.batch_code {
            let _ = write!(message, " [{batch}]");
        }
        let _ = writeln!(message);
    }
    let _ = writeln!(message);

    let totals = cart.totals_by_currency();
    let total_text = totals
        .iter()
        .map(|(currency, amount)| format_money(*amount, currency, lang))
        .collect::<Vec<_>>()
        .join(" + ");
    let _ = writeln!(message, "*{total_label}:* {total_text}");
    let _ = writeln!(message, "*{items_label}:* {}", cart.item_count());

    if let Some(name) = customer_name.map(str::trim).filter(|n| !n.is_empty()) {
        let _ = writeln!(message, "*{name_label}:* {name}");
    }
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        let _ = writeln!(message, "*{notes_label}:* {notes}");
    }

    message.trim_end().to_string()
}

pub fn whatsapp_link(phone_digits: &str, message: &str) -> String {
    format!(
        "{}/{}?text={}",
        WHATSAPP_BASE_URL,
        phone_digits,
        urlencoding::encode(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::tests::item;

    #[test]
    fn money_formatting_follows_language_and_currency() {
        assert_eq!(format_money(Decimal::from(1_234_567), "COP", Lang::Es), "1.234.567 COP");
        assert_eq!(format_money(Decimal::new(123456, 2), "USD", Lang::En), "1,234.56 USD");
        assert_eq!(format_money(Decimal::new(995, 2), "USD", Lang::Es), "9,95 USD");
        assert_eq!(format_money(Decimal::ZERO, "COP", Lang::Es), "0 COP");
    }

    #[test]
    fn message_lists_lines_and_total() {
        let mut cart = CartState::new();
        let mut line = item(1, 10);
        line.batch_code = Some("HU-2024-031".into());
        cart.add(line, 2);
        cart.add(item(2, 5), 1);

        let message = build_order_message(&cart, Lang::En, Some("  Ana "), None);
        assert!(message.starts_with("Hi! I would like to place the following order:"));
        assert!(message.contains("- 2 x Coffee 1 (SKU-1) - 20.00 USD [HU-2024-031]"));
        assert!(message.contains("- 1 x Coffee 2 (SKU-2) - 5.00 USD"));
        assert!(message.contains("*Total:* 25.00 USD"));
        assert!(message.contains("*Items:* 3"));
        assert!(message.ends_with("*Name:* Ana"));
    }

    #[test]
    fn spanish_message_uses_spanish_names() {
        let mut cart = CartState::new();
        cart.add(item(1, 10), 1);
        let message = build_order_message(&cart, Lang::Es, None, Some("Entregar en la tarde"));
        assert!(message.contains("1 x Café 1"));
        assert!(message.contains("*Notas:* Entregar en la tarde"));
    }

    #[test]
    fn link_is_url_encoded() {
        let link = whatsapp_link("573001234567", "Hola & adiós\n");
        assert_eq!(
            link,
            "https://wa.me/573001234567?text=Hola%20%26%20adi%C3%B3s%0A"
        );
    }
}
