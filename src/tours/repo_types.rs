use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Tour record in the database.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub duration: i32,       // days
    pub max_group_size: i32,
    pub difficulty: String,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Per-difficulty figures for highly rated tours.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub max_price: f64,
    pub min_price: f64,
    pub avg_price: f64,
}

/// Tour starts falling in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_tours: i64,
    pub tours: Vec<String>,
}

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Price,
    PriceDiscount,
    RatingsAverage,
    RatingsQuantity,
    Duration,
    MaxGroupSize,
    Difficulty,
    CreatedAt,
}

impl SortField {
    pub fn from_api(name: &str) -> Option<Self> {
        Some(match name {
            "name" => SortField::Name,
            "price" => SortField::Price,
            "priceDiscount" => SortField::PriceDiscount,
            "ratingsAverage" => SortField::RatingsAverage,
            "ratingsQuantity" => SortField::RatingsQuantity,
            "duration" => SortField::Duration,
            "maxGroupSize" => SortField::MaxGroupSize,
            "difficulty" => SortField::Difficulty,
            "createdAt" => SortField::CreatedAt,
            _ => return None,
        })
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Price => "price",
            SortField::PriceDiscount => "price_discount",
            SortField::RatingsAverage => "ratings_average",
            SortField::RatingsQuantity => "ratings_quantity",
            SortField::Duration => "duration",
            SortField::MaxGroupSize => "max_group_size",
            SortField::Difficulty => "difficulty",
            SortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}
