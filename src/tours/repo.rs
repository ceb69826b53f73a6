use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppError,
    tours::repo_types::{DifficultyStats, MonthlyPlan, SortKey, Tour},
};

#[async_trait]
pub trait TourStore: Send + Sync {
    async fn count(&self) -> Result<i64, AppError>;
    /// `limit: None` returns every row after `offset`.
    async fn list(
        &self,
        sort: &[SortKey],
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Tour>, AppError>;
    async fn get(&self, id: Uuid) -> Result<Option<Tour>, AppError>;
    async fn insert(&self, tour: &Tour) -> Result<Tour, AppError>;
    /// Overwrites every mutable column; `None` when the id is unknown.
    async fn save(&self, tour: &Tour) -> Result<Option<Tour>, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    /// Groups tours rated at least `min_rating` by difficulty and keeps the
    /// groups whose top price reaches `min_max_price`; fewest tours first,
    /// then most expensive.
    async fn stats(&self, min_rating: f64, min_max_price: f64)
        -> Result<Vec<DifficultyStats>, AppError>;
    /// One entry per month of `year` (UTC) with at least one start date.
    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthlyPlan>, AppError>;
}

const TOUR_COLUMNS: &str = "id, name, price, price_discount, ratings_average, ratings_quantity, \
     duration, max_group_size, difficulty, summary, description, image_cover, images, \
     start_dates, created_at";

const NAME_TAKEN: &str = "A tour with this name already exists";

#[derive(Clone)]
pub struct PgTourStore {
    db: PgPool,
}

impl PgTourStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// ORDER BY built only from whitelisted columns; `id` breaks ties.
fn order_clause(sort: &[SortKey]) -> String {
    let mut parts: Vec<String> = sort
        .iter()
        .map(|k| {
            format!(
                "{} {}",
                k.field.column(),
                if k.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    parts.push("id ASC".into());
    parts.join(", ")
}

#[async_trait]
impl TourStore for PgTourStore {
    async fn count(&self) -> Result<i64, AppError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tours")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn list(
        &self,
        sort: &[SortKey],
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Tour>, AppError> {
        let sql = format!(
            "SELECT {TOUR_COLUMNS} FROM tours ORDER BY {} LIMIT $1 OFFSET $2",
            order_clause(sort)
        );
        let rows = sqlx::query_as::<_, Tour>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Tour>, AppError> {
        let row = sqlx::query_as::<_, Tour>(&format!(
            "SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert(&self, tour: &Tour) -> Result<Tour, AppError> {
        let row = sqlx::query_as::<_, Tour>(&format!(
            r#"
            INSERT INTO tours ({TOUR_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {TOUR_COLUMNS}
            "#
        ))
        .bind(tour.id)
        .bind(&tour.name)
        .bind(tour.price)
        .bind(tour.price_discount)
        .bind(tour.ratings_average)
        .bind(tour.ratings_quantity)
        .bind(tour.duration)
        .bind(tour.max_group_size)
        .bind(&tour.difficulty)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.image_cover)
        .bind(&tour.images)
        .bind(&tour.start_dates)
        .bind(tour.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_db(e, NAME_TAKEN))?;
        Ok(row)
    }

    async fn save(&self, tour: &Tour) -> Result<Option<Tour>, AppError> {
        let row = sqlx::query_as::<_, Tour>(&format!(
            r#"
            UPDATE tours
               SET name = $2, price = $3, price_discount = $4, ratings_average = $5,
                   ratings_quantity = $6, duration = $7, max_group_size = $8,
                   difficulty = $9, summary = $10, description = $11, image_cover = $12,
                   images = $13, start_dates = $14
             WHERE id = $1
            RETURNING {TOUR_COLUMNS}
            "#
        ))
        .bind(tour.id)
        .bind(&tour.name)
        .bind(tour.price)
        .bind(tour.price_discount)
        .bind(tour.ratings_average)
        .bind(tour.ratings_quantity)
        .bind(tour.duration)
        .bind(tour.max_group_size)
        .bind(&tour.difficulty)
        .bind(&tour.summary)
        .bind(&tour.description)
        .bind(&tour.image_cover)
        .bind(&tour.images)
        .bind(&tour.start_dates)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::from_db(e, NAME_TAKEN))?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let done = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn stats(
        &self,
        min_rating: f64,
        min_max_price: f64,
    ) -> Result<Vec<DifficultyStats>, AppError> {
        let rows = sqlx::query_as::<_, DifficultyStats>(
            r#"
            SELECT difficulty,
                   COUNT(*)::int8                            AS num_tours,
                   COALESCE(SUM(ratings_quantity), 0)::int8  AS num_ratings,
                   AVG(ratings_average)::float8              AS avg_rating,
                   MAX(price)::float8                        AS max_price,
                   MIN(price)::float8                        AS min_price,
                   AVG(price)::float8                        AS avg_price
              FROM tours
             WHERE ratings_average >= $1
             GROUP BY difficulty
            HAVING MAX(price) >= $2
             ORDER BY num_tours ASC, max_price DESC
            "#,
        )
        .bind(min_rating)
        .bind(min_max_price)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthlyPlan>, AppError> {
        let rows = sqlx::query_as::<_, MonthlyPlan>(
            r#"
            SELECT EXTRACT(MONTH FROM d AT TIME ZONE 'UTC')::int4 AS month,
                   COUNT(*)::int8                                  AS num_tours,
                   array_agg(t.name ORDER BY t.name)               AS tours
              FROM tours t
             CROSS JOIN LATERAL unnest(t.start_dates) AS d
             WHERE EXTRACT(YEAR FROM d AT TIME ZONE 'UTC')::int4 = $1
             GROUP BY 1
             ORDER BY 1
            "#,
        )
        .bind(year)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
