// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::Type;
use strum_macros::{Display, EnumIter, EnumString};
use validator::Validate;

/// Storefront language. Spanish is the primary language of the catalog.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Lang {
    #[default]
    Es,
    En,
}

impl Lang {
    /// Picks the text for this language, falling back to the other one when empty.
    pub fn pick<'a>(&self, es: &'a str, en: &'a str) -> &'a str {
        let (first, second) = match self {
            Lang::Es => (es, en),
            Lang::En => (en, es),
        };
        if first.trim().is_empty() { second } else { first }
    }

    pub fn pick_opt<'a>(&self, es: Option<&'a str>, en: Option<&'a str>) -> Option<&'a str> {
        let picked = self.pick(es.unwrap_or(""), en.unwrap_or(""));
        if picked.is_empty() { None } else { Some(picked) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, EnumString, Display, EnumIter)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, EnumString, Display, EnumIter)]
#[sqlx(type_name = "roast_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RoastLevel {
    Light,
    Medium,
    MediumDark,
    Dark,
}

impl RoastLevel {
    pub fn label(&self, lang: Lang) -> &'static str {
        match (self, lang) {
            (RoastLevel::Light, Lang::Es) => "Tueste claro",
            (RoastLevel::Light, Lang::En) => "Light roast",
            (RoastLevel::Medium, Lang::Es) => "Tueste medio",
            (RoastLevel::Medium, Lang::En) => "Medium roast",
            (RoastLevel::MediumDark, Lang::Es) => "Tueste medio oscuro",
            (RoastLevel::MediumDark, Lang::En) => "Medium-dark roast",
            (RoastLevel::Dark, Lang::Es) => "Tueste oscuro",
            (RoastLevel::Dark, Lang::En) => "Dark roast",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, EnumString, Display, EnumIter)]
#[sqlx(type_name = "process_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProcessMethod {
    Washed,
    Natural,
    Honey,
    Anaerobic,
}

impl ProcessMethod {
    pub fn label(&self, lang: Lang) -> &'static str {
        match (self, lang) {
            (ProcessMethod::Washed, Lang::Es) => "Lavado",
            (ProcessMethod::Washed, Lang::En) => "Washed",
            (ProcessMethod::Natural, _) => "Natural",
            (ProcessMethod::Honey, _) => "Honey",
            (ProcessMethod::Anaerobic, Lang::Es) => "Anaeróbico",
            (ProcessMethod::Anaerobic, Lang::En) => "Anaerobic",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Type, EnumString, Display)]
#[sqlx(type_name = "media_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

// --- REFERENCE DATA ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Province {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Variety {
    pub id: i32,
    pub name: String,
    pub description_es: Option<String>,
    pub description_en: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- PRODUCERS ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Farmer {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub bio_es: Option<String>,
    pub bio_en: Option<String>,
    pub photo_url: Option<String>,
    pub province_id: Option<i32>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Farm {
    pub id: i32,
    pub farmer_id: i32,
    pub name: String,
    pub province_id: Option<i32>,
    pub municipality: Option<String>,
    pub altitude_masl: Option<i32>,
    pub area_hectares: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FarmerMedia {
    pub id: i32,
    pub farmer_id: i32,
    pub media_type: MediaType,
    pub url: String,
    pub caption_es: Option<String>,
    pub caption_en: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CoffeeBatch {
    pub id: i32,
    pub code: String,
    pub farm_id: i32,
    pub variety_id: Option<i32>,
    pub process_method: Option<ProcessMethod>,
    pub harvest_date: Option<NaiveDate>,
    pub processing_date: Option<NaiveDate>,
    pub roast_date: Option<NaiveDate>,
    pub roast_level: Option<RoastLevel>,
    pub cupping_score: Option<Decimal>,
    pub weight_kg: Option<Decimal>,
    pub notes_es: Option<String>,
    pub notes_en: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a buyer sees when looking up a batch code: the batch, the farm
/// it came from and the farmer behind it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TraceabilityRecord {
    pub batch_id: i32,
    pub code: String,
    pub process_method: Option<ProcessMethod>,
    pub harvest_date: Option<NaiveDate>,
    pub processing_date: Option<NaiveDate>,
    pub roast_date: Option<NaiveDate>,
    pub roast_level: Option<RoastLevel>,
    pub cupping_score: Option<Decimal>,
    pub weight_kg: Option<Decimal>,
    pub notes_es: Option<String>,
    pub notes_en: Option<String>,
    pub variety_name: Option<String>,
    pub farm_id: i32,
    pub farm_name: String,
    pub municipality: Option<String>,
    pub altitude_masl: Option<i32>,
    pub province_name: Option<String>,
    pub farmer_id: i32,
    pub farmer_name: String,
    pub farmer_slug: String,
    pub farmer_photo_url: Option<String>,
}

// --- CATALOG ---

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i32,
    pub sku: String,
    pub slug: String,
    pub name_es: String,
    pub name_en: String,
    pub description_es: Option<String>,
    pub description_en: Option<String>,
    pub price: Option<Decimal>,
    pub currency: String,
    pub price_usd: Option<Decimal>,
    pub weight_grams: i32,
    pub image_url: Option<String>,
    pub roast_level: Option<RoastLevel>,
    pub variety_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog row joined with its variety name and total count for pagination.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductWithTotalCount {
    #[sqlx(flatten)]
    pub product: Product,
    pub variety_name: Option<String>,
    pub total_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductListItem {
    #[serde(flatten)]
    pub product: Product,
    pub variety_name: Option<String>,
}

// --- USERS ---

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserPublic {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        UserPublic {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

// --- CMS PAYLOADS ---
//
// Create payloads carry every required column. Update payloads are sparse:
// a missing field is left untouched, and for nullable columns an explicit
// `null` clears the value (hence `Option<Option<T>>`).

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProvincePayload {
    #[validate(length(min = 1, max = 120, message = "El nombre es obligatorio"))]
    pub name: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProvincePayload {
    #[validate(length(min = 1, max = 120, message = "El nombre no puede estar vacío"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVarietyPayload {
    #[validate(length(min = 1, max = 120, message = "El nombre es obligatorio"))]
    pub name: String,
    pub description_es: Option<String>,
    pub description_en: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateVarietyPayload {
    #[validate(length(min = 1, max = 120, message = "El nombre no puede estar vacío"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description_es: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description_en: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFarmerPayload {
    #[validate(length(min = 1, max = 200, message = "El nombre es obligatorio"))]
    pub name: String,
    /// Derived from `name` when omitted.
    pub slug: Option<String>,
    pub bio_es: Option<String>,
    pub bio_en: Option<String>,
    #[validate(url(message = "La URL de la foto no es válida"))]
    pub photo_url: Option<String>,
    pub province_id: Option<i32>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateFarmerPayload {
    #[validate(length(min = 1, max = 200, message = "El nombre no puede estar vacío"))]
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio_es: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio_en: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub province_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFarmPayload {
    pub farmer_id: i32,
    #[validate(length(min = 1, max = 200, message = "El nombre es obligatorio"))]
    pub name: String,
    pub province_id: Option<i32>,
    pub municipality: Option<String>,
    #[validate(range(min = 0, max = 6000, message = "Altitud fuera de rango"))]
    pub altitude_masl: Option<i32>,
    pub area_hectares: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateFarmPayload {
    pub farmer_id: Option<i32>,
    #[validate(length(min = 1, max = 200, message = "El nombre no puede estar vacío"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub province_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub municipality: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub altitude_masl: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub area_hectares: Option<Option<Decimal>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchPayload {
    #[validate(length(min = 1, max = 64, message = "El código del lote es obligatorio"))]
    pub code: String,
    pub farm_id: i32,
    pub variety_id: Option<i32>,
    pub process_method: Option<ProcessMethod>,
    pub harvest_date: Option<NaiveDate>,
    pub processing_date: Option<NaiveDate>,
    pub roast_date: Option<NaiveDate>,
    pub roast_level: Option<RoastLevel>,
    pub cupping_score: Option<Decimal>,
    pub weight_kg: Option<Decimal>,
    pub notes_es: Option<String>,
    pub notes_en: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBatchPayload {
    #[validate(length(min = 1, max = 64, message = "El código del lote no puede estar vacío"))]
    pub code: Option<String>,
    pub farm_id: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub variety_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub process_method: Option<Option<ProcessMethod>>,
    #[serde(default, deserialize_with = "double_option")]
    pub harvest_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub processing_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub roast_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub roast_level: Option<Option<RoastLevel>>,
    #[serde(default, deserialize_with = "double_option")]
    pub cupping_score: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub weight_kg: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes_es: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes_en: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductPayload {
    #[validate(length(min = 1, max = 64, message = "El SKU es obligatorio"))]
    pub sku: String,
    /// Derived from `name_es` when omitted.
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 255, message = "El nombre en español es obligatorio"))]
    pub name_es: String,
    #[validate(length(min = 1, max = 255, message = "El nombre en inglés es obligatorio"))]
    pub name_en: String,
    pub description_es: Option<String>,
    pub description_en: Option<String>,
    pub price: Option<Decimal>,
    #[validate(length(equal = 3, message = "La moneda debe ser un código ISO de 3 letras"))]
    pub currency: Option<String>,
    pub price_usd: Option<Decimal>,
    #[validate(range(min = 0, message = "El peso no puede ser negativo"))]
    pub weight_grams: Option<i32>,
    pub image_url: Option<String>,
    pub roast_level: Option<RoastLevel>,
    pub variety_id: Option<i32>,
    #[serde(default)]
    pub batch_ids: Vec<i32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductPayload {
    #[validate(length(min = 1, max = 64, message = "El SKU no puede estar vacío"))]
    pub sku: Option<String>,
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 255, message = "El nombre no puede estar vacío"))]
    pub name_es: Option<String>,
    #[validate(length(min = 1, max = 255, message = "El nombre no puede estar vacío"))]
    pub name_en: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description_es: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description_en: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price: Option<Option<Decimal>>,
    #[validate(length(equal = 3, message = "La moneda debe ser un código ISO de 3 letras"))]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_usd: Option<Option<Decimal>>,
    #[validate(range(min = 0, message = "El peso no puede ser negativo"))]
    pub weight_grams: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub roast_level: Option<Option<RoastLevel>>,
    #[serde(default, deserialize_with = "double_option")]
    pub variety_id: Option<Option<i32>>,
    pub is_active: Option<bool>,
    /// When present, replaces the product's batch links.
    pub batch_ids: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct ProductBatchesPayload {
    pub batch_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMediaPayload {
    pub media_type: Option<MediaType>,
    #[validate(url(message = "La URL no es válida"))]
    pub url: String,
    pub caption_es: Option<String>,
    pub caption_en: Option<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMediaPayload {
    pub media_type: Option<MediaType>,
    #[validate(url(message = "La URL no es válida"))]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub caption_es: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub caption_en: Option<Option<String>>,
    pub sort_order: Option<i32>,
}
