use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::extractors::{restrict_to, AuthUser},
    error::AppError,
    response::{AppJson, AppPath, AppQuery, Envelope},
    state::AppState,
    tours::{
        dto::{CreateTourRequest, FieldsQuery, PageQuery, SortQuery, TourView, UpdateTourRequest},
        repo_types::{DifficultyStats, MonthlyPlan, Tour},
        services::{self, Projection, STATS_MIN_MAX_PRICE, STATS_MIN_RATING},
    },
    users::repo_types::Role,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tours).post(create_tour))
        .route("/stat", get(tour_stats))
        .route("/monthly-plan/:year", get(monthly_plan))
        .route("/sort", get(sort_tours))
        .route("/limit", get(limit_tours))
        .route("/:id", get(get_tour).patch(update_tour).delete(delete_tour))
}

fn not_found() -> AppError {
    AppError::NotFound("No tour with this ID".into())
}

fn projected(
    tours: Vec<Tour>,
    projection: &Projection,
) -> Result<Vec<Value>, AppError> {
    tours
        .into_iter()
        .map(|t| services::project(TourView::from(t), projection))
        .collect()
}

#[instrument(skip(state, _user))]
pub async fn list_tours(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    AppQuery(q): AppQuery<PageQuery>,
) -> Result<Envelope<Vec<TourView>>, AppError> {
    let page = services::page_window(&q)?;
    let total = state.tours.count().await?;
    services::ensure_page_exists(&page, total)?;

    let sort = services::parse_sort(None)?;
    let tours = state
        .tours
        .list(&sort, page.offset, Some(page.limit))
        .await?;
    Ok(Envelope::list(tours.into_iter().map(TourView::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTourRequest>,
) -> Result<(StatusCode, Envelope<TourView>), AppError> {
    let tour = services::build_tour(payload)?;
    let created = state.tours.insert(&tour).await?;
    info!(tour_id = %created.id, name = %created.name, "tour created");
    Ok((StatusCode::CREATED, Envelope::data(TourView::from(created))))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Envelope<TourView>, AppError> {
    let tour = state.tours.get(id).await?.ok_or_else(not_found)?;
    Ok(Envelope::data(TourView::from(tour)))
}

#[instrument(skip(state, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateTourRequest>,
) -> Result<Envelope<TourView>, AppError> {
    let current = state.tours.get(id).await?.ok_or_else(not_found)?;
    let patched = services::apply_patch(current, payload)?;
    let saved = state.tours.save(&patched).await?.ok_or_else(not_found)?;
    info!(tour_id = %saved.id, "tour updated");
    Ok(Envelope::data(TourView::from(saved)))
}

#[instrument(skip(state, user))]
pub async fn delete_tour(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    restrict_to(&[Role::Admin, Role::LeadGuide], &user)?;
    if !state.tours.delete(id).await? {
        return Err(not_found());
    }
    info!(tour_id = %id, user_id = %user.id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn tour_stats(
    State(state): State<AppState>,
) -> Result<Envelope<Vec<DifficultyStats>>, AppError> {
    let stats = state
        .tours
        .stats(STATS_MIN_RATING, STATS_MIN_MAX_PRICE)
        .await?;
    Ok(Envelope::list(stats))
}

#[instrument(skip(state))]
pub async fn monthly_plan(
    State(state): State<AppState>,
    AppPath(year): AppPath<i32>,
) -> Result<Envelope<Vec<MonthlyPlan>>, AppError> {
    let year = services::check_year(year)?;
    let plan = state.tours.monthly_plan(year).await?;
    Ok(Envelope::list(plan))
}

#[instrument(skip(state))]
pub async fn sort_tours(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<SortQuery>,
) -> Result<Envelope<Vec<Value>>, AppError> {
    let sort = services::parse_sort(q.sort.as_deref())?;
    let projection = services::parse_fields(q.fields.as_deref())?;
    let tours = state.tours.list(&sort, 0, None).await?;
    Ok(Envelope::list(projected(tours, &projection)?))
}

#[instrument(skip(state))]
pub async fn limit_tours(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<FieldsQuery>,
) -> Result<Envelope<Vec<Value>>, AppError> {
    let projection = services::parse_fields(q.fields.as_deref())?;
    let sort = services::parse_sort(None)?;
    let tours = state.tours.list(&sort, 0, None).await?;
    Ok(Envelope::list(projected(tours, &projection)?))
}
