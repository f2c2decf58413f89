// src/pages.rs

//! Server-rendered storefront pages. Same data as the public API, rendered
//! with maud. `?lang=en` switches every page to English.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use maud::{DOCTYPE, Markup, html};
use strum::IntoEnumIterator;

use crate::cart::PLACEHOLDER_IMAGE;
use crate::checkout::{format_money, whatsapp_link};
use crate::errors::AppError;
use crate::filters::{LangParams, ProductListingParams};
use crate::models::{Lang, MediaType, Product, RoastLevel, TraceabilityRecord};
use crate::services;
use crate::state::AppState;

fn other_lang(lang: Lang) -> Lang {
    match lang {
        Lang::Es => Lang::En,
        Lang::En => Lang::Es,
    }
}

fn lang_switch_href(path: &str, lang: Lang) -> String {
    format!("{}?lang={}", path, other_lang(lang))
}

fn catalog_href(lang: Lang, roast: Option<RoastLevel>, search: Option<&str>, offset: i64) -> String {
    let mut href = format!("/?lang={}", lang);
    if let Some(roast) = roast {
        href.push_str(&format!("&roast={}", roast));
    }
    if let Some(search) = search {
        href.push_str(&format!("&search={}", urlencoding::encode(search)));
    }
    if offset > 0 {
        href.push_str(&format!("&offset={}", offset));
    }
    href
}

fn price_label(product: &Product, lang: Lang) -> String {
    match product.price {
        Some(price) => format_money(price, &product.currency, lang),
        None => lang.pick("Precio a consultar", "Price on request").to_string(),
    }
}

fn layout(lang: Lang, path: &str, title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang=(lang.to_string()) {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | Café de Origen" }
                link rel="stylesheet" href="/static/css/site.css";
            }
            body {
                header .site-header {
                    a .brand href=(format!("/?lang={}", lang)) { "Café de Origen" }
                    a .lang-switch href=(lang_switch_href(path, lang)) {
                        (lang.pick("English", "Español"))
                    }
                }
                main #content { (content) }
                footer .site-footer {
                    p { (lang.pick(
                        "Café de especialidad con trazabilidad de la finca a tu taza.",
                        "Specialty coffee traced from the farm to your cup.",
                    )) }
                }
            }
        }
    }
}

fn not_found_page(lang: Lang, path: &str, message: &str) -> Response {
    let title = lang.pick("No encontrado", "Not found");
    let markup = layout(
        lang,
        path,
        title,
        html! {
            section .not-found {
                h1 { (title) }
                p { (message) }
                a href=(format!("/?lang={}", lang)) { (lang.pick("Volver al catálogo", "Back to the catalog")) }
            }
        },
    );
    (StatusCode::NOT_FOUND, markup).into_response()
}

// --- CATALOG ---

pub async fn catalog_page(
    State(app_state): State<AppState>,
    Query(params): Query<ProductListingParams>,
) -> Result<Markup, AppError> {
    tracing::info!("PAGE: / with params: {:?}", params);
    let lang = params.lang();
    let roast = params.roast();
    let search = params.search();
    let page = services::list_catalog_page(&app_state, &params).await?;
    let pagination = &page.pagination;
    let limit = params.limit();

    let content = html! {
        section .catalog {
            h1 { (lang.pick("Nuestros cafés", "Our coffees")) }
            nav .roast-filter {
                a.active[roast.is_none()] href=(catalog_href(lang, None, search, 0)) {
                    (lang.pick("Todos", "All"))
                }
                @for level in RoastLevel::iter() {
                    a.active[roast == Some(level)] href=(catalog_href(lang, Some(level), search, 0)) {
                        (level.label(lang))
                    }
                }
            }
            @if page.products.is_empty() {
                p .empty { (lang.pick(
                    "No hay productos que coincidan con la búsqueda.",
                    "No products match your search.",
                )) }
            } @else {
                div .product-grid {
                    @for item in &page.products {
                        @let product = &item.product;
                        @let name = lang.pick(&product.name_es, &product.name_en);
                        article .product-card {
                            a href=(format!("/productos/{}?lang={}", product.slug, lang)) {
                                img src=(product.image_url.as_deref().unwrap_or(PLACEHOLDER_IMAGE))
                                    alt=(name) loading="lazy";
                                h2 { (name) }
                            }
                            @if let Some(variety) = &item.variety_name {
                                p .variety { (variety) }
                            }
                            @if let Some(level) = product.roast_level {
                                p .roast { (level.label(lang)) }
                            }
                            p .price { (price_label(product, lang)) }
                            button .add-to-cart type="button" data-product-id=(product.id) {
                                (lang.pick("Añadir al carrito", "Add to cart"))
                            }
                        }
                    }
                }
            }
            @if pagination.total_pages > 1 {
                nav .pagination {
                    @if pagination.current_page > 1 {
                        a href=(catalog_href(lang, roast, search, (pagination.current_page - 2) * limit)) {
                            (lang.pick("Anterior", "Previous"))
                        }
                    }
                    span { (pagination.current_page) " / " (pagination.total_pages) }
                    @if pagination.current_page < pagination.total_pages {
                        a href=(catalog_href(lang, roast, search, pagination.current_page * limit)) {
                            (lang.pick("Siguiente", "Next"))
                        }
                    }
                }
            }
        }
    };

    Ok(layout(lang, "/", lang.pick("Catálogo", "Catalog"), content))
}

pub async fn product_page(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<LangParams>,
    uri: Uri,
) -> Result<Response, AppError> {
    tracing::info!("PAGE: /productos/{}", slug);
    let lang = params.lang();
    let detail = match services::find_product_by_slug(&app_state.db_pool, &slug).await {
        Ok(detail) => detail,
        Err(AppError::NotFound(_)) => {
            let message = lang.pick("Este café no existe o ya no está disponible.", "This coffee does not exist or is no longer available.");
            return Ok(not_found_page(lang, uri.path(), message));
        }
        Err(e) => return Err(e),
    };
    let batches = services::batches_for_product(&app_state.db_pool, detail.product.id).await?;

    let product = &detail.product;
    let name = lang.pick(&product.name_es, &product.name_en);
    let description = lang.pick_opt(product.description_es.as_deref(), product.description_en.as_deref());
    let enquiry = format!(
        "{} {} ({})",
        lang.pick("Hola, me interesa el café", "Hi, I am interested in the coffee"),
        name,
        product.sku
    );

    let content = html! {
        article .product-detail {
            img src=(product.image_url.as_deref().unwrap_or(PLACEHOLDER_IMAGE)) alt=(name);
            h1 { (name) }
            p .price { (price_label(product, lang)) }
            @if let Some(variety) = &detail.variety_name {
                p .variety { (lang.pick("Variedad", "Variety")) ": " (variety) }
            }
            @if let Some(level) = product.roast_level {
                p .roast { (level.label(lang)) }
            }
            p .weight { (product.weight_grams) " g" }
            @if let Some(text) = description {
                p .description { (text) }
            }
            button .add-to-cart type="button" data-product-id=(product.id) {
                (lang.pick("Añadir al carrito", "Add to cart"))
            }
            a .whatsapp href=(whatsapp_link(&app_state.whatsapp_number, &enquiry)) {
                (lang.pick("Preguntar por WhatsApp", "Ask on WhatsApp"))
            }
            @if !batches.is_empty() {
                section .batches {
                    h2 { (lang.pick("Lotes", "Batches")) }
                    ul {
                        @for batch in &batches {
                            li {
                                a href=(format!("/trazabilidad/{}?lang={}", batch.code, lang)) { (batch.code) }
                            }
                        }
                    }
                }
            }
        }
    };

    Ok(layout(lang, uri.path(), name, content).into_response())
}

// --- PRODUCERS ---

pub async fn farmer_page(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<LangParams>,
    uri: Uri,
) -> Result<Response, AppError> {
    tracing::info!("PAGE: /productores/{}", slug);
    let lang = params.lang();
    let profile = match services::find_farmer_profile(&app_state.db_pool, &slug).await {
        Ok(profile) => profile,
        Err(AppError::NotFound(_)) => {
            let message = lang.pick("No encontramos a este productor.", "We could not find this producer.");
            return Ok(not_found_page(lang, uri.path(), message));
        }
        Err(e) => return Err(e),
    };

    let farmer = &profile.farmer;
    let bio = lang.pick_opt(farmer.bio_es.as_deref(), farmer.bio_en.as_deref());

    let content = html! {
        article .farmer-profile {
            img .portrait src=(farmer.photo_url.as_deref().unwrap_or(PLACEHOLDER_IMAGE)) alt=(farmer.name);
            h1 { (farmer.name) }
            @if let Some(province) = &profile.province_name {
                p .province { (province) }
            }
            @if let Some(text) = bio {
                p .bio { (text) }
            }
            @if !profile.farms.is_empty() {
                section .farms {
                    h2 { (lang.pick("Fincas", "Farms")) }
                    ul {
                        @for farm in &profile.farms {
                            li {
                                strong { (farm.name) }
                                @if let Some(municipality) = &farm.municipality {
                                    ", " (municipality)
                                }
                                @if let Some(altitude) = farm.altitude_masl {
                                    " · " (altitude) " msnm"
                                }
                            }
                        }
                    }
                }
            }
            @if !profile.media.is_empty() {
                section .gallery {
                    @for media in &profile.media {
                        @let caption = lang.pick_opt(media.caption_es.as_deref(), media.caption_en.as_deref());
                        figure {
                            @match media.media_type {
                                MediaType::Image => {
                                    img src=(media.url) alt=(caption.unwrap_or(&farmer.name)) loading="lazy";
                                }
                                MediaType::Video => {
                                    video src=(media.url) controls {}
                                }
                            }
                            @if let Some(text) = caption {
                                figcaption { (text) }
                            }
                        }
                    }
                }
            }
        }
    };

    Ok(layout(lang, uri.path(), &farmer.name, content).into_response())
}

// --- TRACEABILITY ---

fn traceability_rows(record: &TraceabilityRecord, lang: Lang) -> Vec<(&'static str, String)> {
    let mut rows = vec![(lang.pick("Finca", "Farm"), record.farm_name.clone())];
    if let Some(province) = &record.province_name {
        rows.push((lang.pick("Departamento", "Department"), province.clone()));
    }
    if let Some(municipality) = &record.municipality {
        rows.push((lang.pick("Municipio", "Municipality"), municipality.clone()));
    }
    if let Some(altitude) = record.altitude_masl {
        rows.push((lang.pick("Altitud", "Altitude"), format!("{} msnm", altitude)));
    }
    if let Some(variety) = &record.variety_name {
        rows.push((lang.pick("Variedad", "Variety"), variety.clone()));
    }
    if let Some(process) = record.process_method {
        rows.push((lang.pick("Proceso", "Process"), process.label(lang).to_string()));
    }
    if let Some(level) = record.roast_level {
        rows.push((lang.pick("Tueste", "Roast"), level.label(lang).to_string()));
    }
    if let Some(date) = record.harvest_date {
        rows.push((lang.pick("Cosecha", "Harvest"), date.to_string()));
    }
    if let Some(date) = record.roast_date {
        rows.push((lang.pick("Fecha de tueste", "Roast date"), date.to_string()));
    }
    if let Some(score) = record.cupping_score {
        rows.push((lang.pick("Puntaje en taza", "Cupping score"), score.normalize().to_string()));
    }
    rows
}

pub async fn traceability_page(
    State(app_state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<LangParams>,
    uri: Uri,
) -> Result<Response, AppError> {
    tracing::info!("PAGE: /trazabilidad/{}", code);
    let lang = params.lang();
    let record = match services::find_traceability(&app_state.db_pool, &code).await {
        Ok(record) => record,
        Err(AppError::NotFound(_)) => {
            let message = lang.pick(
                "El código de lote no existe. Revisa la etiqueta del empaque.",
                "This batch code does not exist. Check the label on the bag.",
            );
            return Ok(not_found_page(lang, uri.path(), message));
        }
        Err(e) => return Err(e),
    };

    let notes = lang.pick_opt(record.notes_es.as_deref(), record.notes_en.as_deref());
    let title = format!("{} {}", lang.pick("Lote", "Batch"), record.code);

    let content = html! {
        article .traceability {
            h1 { (title) }
            dl {
                @for (label, value) in traceability_rows(&record, lang) {
                    dt { (label) }
                    dd { (value) }
                }
            }
            @if let Some(text) = notes {
                p .notes { (text) }
            }
            section .producer {
                img src=(record.farmer_photo_url.as_deref().unwrap_or(PLACEHOLDER_IMAGE)) alt=(record.farmer_name);
                a href=(format!("/productores/{}?lang={}", record.farmer_slug, lang)) {
                    (lang.pick("Conoce a ", "Meet ")) (record.farmer_name)
                }
            }
        }
    };

    Ok(layout(lang, uri.path(), &title, content).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record() -> TraceabilityRecord {
        TraceabilityRecord {
            batch_id: 1,
            code: "HU-2024-001".into(),
            process_method: Some(crate::models::ProcessMethod::Washed),
            harvest_date: None,
            processing_date: None,
            roast_date: None,
            roast_level: None,
            cupping_score: Some(Decimal::new(8650, 2)),
            weight_kg: None,
            notes_es: None,
            notes_en: None,
            variety_name: Some("Caturra".into()),
            farm_id: 3,
            farm_name: "La Esperanza".into(),
            municipality: Some("Pitalito".into()),
            altitude_masl: Some(1650),
            province_name: Some("Huila".into()),
            farmer_id: 2,
            farmer_name: "Ana Rojas".into(),
            farmer_slug: "ana-rojas".into(),
            farmer_photo_url: None,
        }
    }

    #[test]
    fn catalog_links_keep_filters() {
        let href = catalog_href(Lang::En, Some(RoastLevel::MediumDark), Some("café huila"), 24);
        assert_eq!(href, "/?lang=en&roast=medium_dark&search=caf%C3%A9%20huila&offset=24");
        assert_eq!(catalog_href(Lang::Es, None, None, 0), "/?lang=es");
    }

    #[test]
    fn language_switch_points_to_the_other_language() {
        assert_eq!(lang_switch_href("/productores/ana", Lang::Es), "/productores/ana?lang=en");
        assert_eq!(lang_switch_href("/", Lang::En), "/?lang=es");
    }

    #[test]
    fn traceability_rows_are_translated_and_skip_missing_data() {
        let rows = traceability_rows(&record(), Lang::En);
        let labels: Vec<&str> = rows.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec!["Farm", "Department", "Municipality", "Altitude", "Variety", "Process", "Cupping score"]
        );
        assert!(rows.contains(&("Process", "Washed".to_string())));
        assert!(rows.contains(&("Cupping score", "86.5".to_string())));

        let rows = traceability_rows(&record(), Lang::Es);
        assert!(rows.contains(&("Proceso", "Lavado".to_string())));
        assert!(rows.contains(&("Altitud", "1650 msnm".to_string())));
    }

    #[test]
    fn not_found_page_uses_404() {
        let response = not_found_page(Lang::Es, "/trazabilidad/XX", "El código de lote no existe.");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn layout_escapes_and_sets_language() {
        let markup = layout(Lang::En, "/", "<Tinto>", html! { p { "hi" } }).into_string();
        assert!(markup.starts_with("<!DOCTYPE html>"));
        assert!(markup.contains(r#"<html lang="en">"#));
        assert!(markup.contains("&lt;Tinto&gt;"));
        assert!(markup.contains(r#"href="/?lang=es""#));
    }
}
