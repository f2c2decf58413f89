// src/sitemap_generator.rs

use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use quick_xml::se::to_string;
use serde::Serialize;

use crate::errors::AppError;
use crate::state::AppState;

const SITEMAP_XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Serialize)]
#[serde(rename = "urlset")]
pub struct UrlSet {
    #[serde(rename = "@xmlns")]
    xmlns: String,
    #[serde(rename = "url")]
    pub urls: Vec<UrlEntry>,
}

#[derive(Serialize)]
pub struct UrlEntry {
    #[serde(rename = "loc")]
    pub location: String,
    #[serde(rename = "lastmod", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(rename = "changefreq")]
    pub change_frequency: ChangeFreq,
    #[serde(rename = "priority")]
    pub priority: f32,
}

#[derive(Serialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
}

#[derive(sqlx::FromRow)]
struct SlugRow {
    slug: String,
    updated_at: DateTime<Utc>,
}

/// Both language versions of a page are listed; Spanish is the default.
fn localized_entries(
    base_url: &str,
    path: &str,
    last_modified: Option<DateTime<Utc>>,
    change_frequency: ChangeFreq,
    priority: f32,
) -> [UrlEntry; 2] {
    let last_modified = last_modified.map(|date| date.to_rfc3339());
    [
        UrlEntry {
            location: format!("{}{}", base_url, path),
            last_modified: last_modified.clone(),
            change_frequency,
            priority,
        },
        UrlEntry {
            location: format!("{}{}?lang=en", base_url, path),
            last_modified,
            change_frequency,
            priority: priority - 0.1,
        },
    ]
}

fn build_url_set(base_url: &str, products: &[SlugRow], farmers: &[SlugRow]) -> UrlSet {
    let base_url = base_url.trim_end_matches('/');
    let mut urls = Vec::new();

    urls.extend(localized_entries(base_url, "/", None, ChangeFreq::Daily, 1.0));

    for product in products {
        urls.extend(localized_entries(
            base_url,
            &format!("/productos/{}", product.slug),
            Some(product.updated_at),
            ChangeFreq::Weekly,
            0.8,
        ));
    }

    for farmer in farmers {
        urls.extend(localized_entries(
            base_url,
            &format!("/productores/{}", farmer.slug),
            Some(farmer.updated_at),
            ChangeFreq::Monthly,
            0.6,
        ));
    }

    UrlSet {
        xmlns: SITEMAP_XMLNS.to_string(),
        urls,
    }
}

fn render_sitemap(url_set: &UrlSet) -> Result<String, AppError> {
    let mut xml_output = r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string();
    xml_output.push_str(&to_string(url_set).map_err(|e| {
        AppError::InternalServerError(format!("could not serialize sitemap: {}", e))
    })?);
    Ok(xml_output)
}

pub async fn sitemap_handler(State(app_state): State<AppState>) -> Result<Response, AppError> {
    let products = sqlx::query_as::<_, SlugRow>(
        "SELECT slug, updated_at FROM products WHERE is_active = TRUE ORDER BY id",
    )
    .fetch_all(&app_state.db_pool)
    .await?;

    let farmers = sqlx::query_as::<_, SlugRow>(
        "SELECT slug, updated_at FROM farmers WHERE is_active = TRUE ORDER BY id",
    )
    .fetch_all(&app_state.db_pool)
    .await?;

    let url_set = build_url_set(&app_state.public_base_url, &products, &farmers);
    tracing::info!("Sitemap generated with {} urls", url_set.urls.len());
    let xml_output = render_sitemap(&url_set)?;

    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=utf-8"),
        )],
        xml_output,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sitemap_lists_pages_in_both_languages() {
        let updated_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let products = vec![SlugRow {
            slug: "huila-lavado".into(),
            updated_at,
        }];
        let farmers = vec![SlugRow {
            slug: "ana-rojas".into(),
            updated_at,
        }];

        let url_set = build_url_set("https://cafe.example.com/", &products, &farmers);
        let locations: Vec<&str> = url_set.urls.iter().map(|u| u.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "https://cafe.example.com/",
                "https://cafe.example.com/?lang=en",
                "https://cafe.example.com/productos/huila-lavado",
                "https://cafe.example.com/productos/huila-lavado?lang=en",
                "https://cafe.example.com/productores/ana-rojas",
                "https://cafe.example.com/productores/ana-rojas?lang=en",
            ]
        );

        let xml = render_sitemap(&url_set).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="#));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<lastmod>2024-05-01T12:00:00+00:00</lastmod>"));
        assert_eq!(xml.matches("<url>").count(), 6);
    }
}
