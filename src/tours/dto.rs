use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::tours::repo_types::Tour;

/// Tour as returned to clients, with derived fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TourView {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<String>,
    pub created_at: String,
    pub duration_weeks: f64,
    pub half_max_group_size: f64,
}

fn rfc3339(t: &OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

impl From<Tour> for TourView {
    fn from(t: Tour) -> Self {
        Self {
            duration_weeks: t.duration as f64 / 7.0,
            half_max_group_size: t.max_group_size as f64 / 2.0,
            start_dates: t.start_dates.iter().map(rfc3339).collect(),
            created_at: rfc3339(&t.created_at),
            id: t.id,
            name: t.name,
            price: t.price,
            price_discount: t.price_discount,
            ratings_average: t.ratings_average,
            ratings_quantity: t.ratings_quantity,
            duration: t.duration,
            max_group_size: t.max_group_size,
            difficulty: t.difficulty,
            summary: t.summary,
            description: t.description,
            image_cover: t.image_cover,
            images: t.images,
        }
    }
}

/// Body of `POST /tours`. Required fields are checked by the service.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
}

/// Body of `PATCH /tours/:id`; every field optional. Same shape as create.
pub type UpdateTourRequest = CreateTourRequest;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SortQuery {
    pub sort: Option<String>,
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FieldsQuery {
    #[serde(alias = "feilds")]
    pub fields: Option<String>,
}
