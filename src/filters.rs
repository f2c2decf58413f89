// src/filters.rs
use std::str::FromStr;

use serde::Deserialize;

use crate::models::{Lang, RoastLevel};

const DEFAULT_PAGE_LIMIT: i64 = 12;
const MAX_PAGE_LIMIT: i64 = 50;
const DEFAULT_SORT_ORDER: &str = "asc";

#[derive(Debug, Default, Deserialize)]
pub struct ProductListingParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,

    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    roast: Option<String>,
    #[serde(default)]
    variety_id: Option<i32>,
    #[serde(default)]
    search: Option<String>,

    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    order: Option<String>,
}

impl ProductListingParams {
    pub fn limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 && limit <= MAX_PAGE_LIMIT => limit,
            Some(_) => MAX_PAGE_LIMIT,
            None => DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn lang(&self) -> Lang {
        self.lang
            .as_deref()
            .and_then(|l| Lang::from_str(l).ok())
            .unwrap_or_default()
    }

    /// Unknown roast names are ignored rather than rejected.
    pub fn roast(&self) -> Option<RoastLevel> {
        self.roast
            .as_deref()
            .and_then(|r| RoastLevel::from_str(r.trim()).ok())
    }

    pub fn variety_id(&self) -> Option<i32> {
        self.variety_id
    }

    pub fn search(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whitelisted ORDER BY column. Name sorting follows the requested language.
    pub fn sort_column(&self) -> &'static str {
        match self.sort_by.as_deref() {
            Some("price") => "p.price",
            Some("created_at") | Some("newest") => "p.created_at",
            _ => match self.lang() {
                Lang::Es => "p.name_es",
                Lang::En => "p.name_en",
            },
        }
    }

    pub fn order(&self) -> &'static str {
        self.order.as_deref().map_or(DEFAULT_SORT_ORDER, |o| {
            if o.eq_ignore_ascii_case("desc") {
                "desc"
            } else {
                "asc"
            }
        })
    }

    /// Key for the listing cache. Built from the normalized values so that
    /// equivalent queries share one entry.
    pub fn cache_key(&self) -> String {
        format!(
            "products:lang={}:roast={}:variety={}:search={}:sort={}:{}:limit={}:offset={}",
            self.lang(),
            self.roast().map(|r| r.to_string()).unwrap_or_default(),
            self.variety_id.map(|v| v.to_string()).unwrap_or_default(),
            self.search().map(str::to_lowercase).unwrap_or_default(),
            self.sort_column(),
            self.order(),
            self.limit(),
            self.offset(),
        )
    }
}

/// `?lang=` on single-resource and page routes.
#[derive(Debug, Default, Deserialize)]
pub struct LangParams {
    #[serde(default)]
    lang: Option<String>,
}

impl LangParams {
    pub fn lang(&self) -> Lang {
        self.lang
            .as_deref()
            .and_then(|l| Lang::from_str(l).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ProductListingParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(parse(json!({})).limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(parse(json!({ "limit": 500 })).limit(), MAX_PAGE_LIMIT);
        assert_eq!(parse(json!({ "limit": -3 })).limit(), MAX_PAGE_LIMIT);
        assert_eq!(parse(json!({ "offset": -10 })).offset(), 0);
    }

    #[test]
    fn sort_column_never_leaks_user_input() {
        assert_eq!(
            parse(json!({ "sort_by": "price; drop table products" })).sort_column(),
            "p.name_es"
        );
        assert_eq!(parse(json!({ "sort_by": "price" })).sort_column(), "p.price");
        assert_eq!(parse(json!({ "lang": "en" })).sort_column(), "p.name_en");
        assert_eq!(parse(json!({ "order": "DESC" })).order(), "desc");
        assert_eq!(parse(json!({ "order": "sideways" })).order(), "asc");
    }

    #[test]
    fn equivalent_queries_share_a_cache_key() {
        let a = parse(json!({ "roast": "DARK", "search": "  Huila ", "lang": "es" }));
        let b = parse(json!({ "roast": "dark", "search": "huila" }));
        assert_eq!(a.roast(), Some(RoastLevel::Dark));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), parse(json!({ "roast": "light" })).cache_key());
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        assert_eq!(parse(json!({ "lang": "fr" })).lang(), Lang::Es);
        assert_eq!(parse(json!({ "lang": "EN" })).lang(), Lang::En);
        assert_eq!(parse(json!({ "roast": "burnt" })).roast(), None);
    }
}
