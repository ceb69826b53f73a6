use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::{
    error::AppError,
    tours::{
        dto::{CreateTourRequest, PageQuery, TourView, UpdateTourRequest},
        repo_types::{SortField, SortKey, Tour},
    },
};

pub const STATS_MIN_RATING: f64 = 4.5;
pub const STATS_MIN_MAX_PRICE: f64 = 1500.0;

const DEFAULT_RATING: f64 = 4.5;
const DEFAULT_PAGE_LIMIT: i64 = 100;
const MAX_PAGE_LIMIT: i64 = 100;

const PROJECTABLE: &[&str] = &[
    "id",
    "name",
    "price",
    "priceDiscount",
    "ratingsAverage",
    "ratingsQuantity",
    "duration",
    "maxGroupSize",
    "difficulty",
    "summary",
    "description",
    "imageCover",
    "images",
    "startDates",
    "createdAt",
    "durationWeeks",
    "halfMaxGroupSize",
];

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `price,-ratingsAverage` → price ascending, then rating descending.
/// Empty input sorts newest first.
pub fn parse_sort(raw: Option<&str>) -> Result<Vec<SortKey>, AppError> {
    let keys = split_list(raw.unwrap_or(""))
        .map(|item| {
            let (descending, name) = match item.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, item),
            };
            SortField::from_api(name)
                .map(|field| SortKey { field, descending })
                .ok_or_else(|| AppError::Validation(format!("Cannot sort by '{}'", name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Ok(vec![SortKey {
            field: SortField::CreatedAt,
            descending: true,
        }]);
    }
    Ok(keys)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// `name,price` keeps those fields (plus `id`); `-images` drops fields.
/// Mixing the two forms is rejected.
pub fn parse_fields(raw: Option<&str>) -> Result<Projection, AppError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for item in split_list(raw.unwrap_or("")) {
        let (excluded, name) = match item.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, item),
        };
        if !PROJECTABLE.contains(&name) {
            return Err(AppError::Validation(format!("Unknown field '{}'", name)));
        }
        if excluded {
            exclude.push(name.to_string());
        } else {
            include.push(name.to_string());
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (true, true) => Ok(Projection::All),
        (false, true) => Ok(Projection::Include(include)),
        (true, false) => Ok(Projection::Exclude(exclude)),
        (false, false) => Err(AppError::Validation(
            "Cannot mix field inclusion and exclusion".into(),
        )),
    }
}

pub fn project(view: TourView, projection: &Projection) -> Result<Value, AppError> {
    let mut value = serde_json::to_value(view).map_err(anyhow::Error::from)?;
    if let Value::Object(map) = &mut value {
        match projection {
            Projection::All => {}
            Projection::Include(keep) => {
                map.retain(|k, _| k == "id" || keep.iter().any(|f| f == k));
            }
            Projection::Exclude(drop) => {
                map.retain(|k, _| !drop.iter().any(|f| f == k));
            }
        }
    }
    Ok(value)
}

/// Resolved `(offset, limit)` for a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub offset: i64,
    pub limit: i64,
}

pub fn page_window(q: &PageQuery) -> Result<Page, AppError> {
    let number = q.page.unwrap_or(1);
    if number < 1 {
        return Err(AppError::Validation("page must be at least 1".into()));
    }
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    // An offset that overflows is past the end of any collection.
    let offset = (number - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::NotFound("This page has no content".into()))?;
    Ok(Page {
        number,
        offset,
        limit,
    })
}

/// A page past the end is an error, except the first page of an empty set.
pub fn ensure_page_exists(page: &Page, total: i64) -> Result<(), AppError> {
    if page.number > 1 && page.offset >= total {
        return Err(AppError::NotFound("This page has no content".into()));
    }
    Ok(())
}

fn parse_dates(raw: Vec<String>) -> Result<Vec<OffsetDateTime>, AppError> {
    raw.iter()
        .map(|s| {
            OffsetDateTime::parse(s, &Rfc3339)
                .map_err(|_| AppError::Validation(format!("Invalid start date '{}'", s)))
        })
        .collect()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string())
}

fn required<T>(value: Option<T>, msg: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Validation(msg.to_string()))
}

/// Field rules shared by create and update.
pub fn validate(tour: &Tour) -> Result<(), AppError> {
    let fail = |msg: &str| Err(AppError::Validation(msg.to_string()));
    if tour.name.is_empty() {
        return fail("A tour must have a name");
    }
    if !(tour.price > 0.0) {
        return fail("Price must be positive");
    }
    if let Some(discount) = tour.price_discount {
        if discount < 0.0 || discount >= tour.price {
            return fail("Discount price must be less than original price");
        }
    }
    if tour.duration <= 0 {
        return fail("Duration must be positive");
    }
    if tour.max_group_size <= 0 {
        return fail("Maximum group size must be positive");
    }
    if tour.ratings_quantity < 0 {
        return fail("Ratings quantity cannot be negative");
    }
    if tour.difficulty.is_empty() {
        return fail("A tour must have a difficulty");
    }
    if tour.summary.is_empty() {
        return fail("A tour must have a summary");
    }
    if tour.image_cover.is_empty() {
        return fail("A tour must have a cover image");
    }
    Ok(())
}

pub fn build_tour(req: CreateTourRequest) -> Result<Tour, AppError> {
    let tour = Tour {
        id: Uuid::new_v4(),
        name: required(trimmed(req.name), "A tour must have a name")?,
        price: required(req.price, "A tour must have a price")?,
        price_discount: req.price_discount,
        ratings_average: req.ratings_average.unwrap_or(DEFAULT_RATING),
        ratings_quantity: req.ratings_quantity.unwrap_or(0),
        duration: required(req.duration, "A tour must have a duration")?,
        max_group_size: required(req.max_group_size, "A tour must have a maximum size")?,
        difficulty: required(trimmed(req.difficulty), "A tour must have a difficulty")?,
        summary: required(trimmed(req.summary), "A tour must have a summary")?,
        description: trimmed(req.description),
        image_cover: required(trimmed(req.image_cover), "A tour must have a cover image")?,
        images: req.images.unwrap_or_default(),
        start_dates: parse_dates(req.start_dates.unwrap_or_default())?,
        created_at: OffsetDateTime::now_utc(),
    };
    validate(&tour)?;
    Ok(tour)
}

pub fn apply_patch(mut tour: Tour, req: UpdateTourRequest) -> Result<Tour, AppError> {
    if let Some(v) = trimmed(req.name) {
        tour.name = v;
    }
    if let Some(v) = req.price {
        tour.price = v;
    }
    if let Some(v) = req.price_discount {
        tour.price_discount = Some(v);
    }
    if let Some(v) = req.ratings_average {
        tour.ratings_average = v;
    }
    if let Some(v) = req.ratings_quantity {
        tour.ratings_quantity = v;
    }
    if let Some(v) = req.duration {
        tour.duration = v;
    }
    if let Some(v) = req.max_group_size {
        tour.max_group_size = v;
    }
    if let Some(v) = trimmed(req.difficulty) {
        tour.difficulty = v;
    }
    if let Some(v) = trimmed(req.summary) {
        tour.summary = v;
    }
    if let Some(v) = trimmed(req.description) {
        tour.description = Some(v);
    }
    if let Some(v) = trimmed(req.image_cover) {
        tour.image_cover = v;
    }
    if let Some(v) = req.images {
        tour.images = v;
    }
    if let Some(v) = req.start_dates {
        tour.start_dates = parse_dates(v)?;
    }
    validate(&tour)?;
    Ok(tour)
}

pub fn check_year(year: i32) -> Result<i32, AppError> {
    if (1..=9999).contains(&year) {
        Ok(year)
    } else {
        Err(AppError::Validation(format!("Invalid year {}", year)))
    }
}
