use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;

use crate::models::{EventDraft, RequestContext};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::pagination::{PageParams, Pagination};
use crate::utils::response::{created, paginated, success};

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Response, AppError> {
    let page = Pagination::from(params);
    let (events, total) = state.catalog.list(page).await?;
    Ok(paginated(events, page.meta(total)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let event = state.catalog.get(id).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(draft): Json<EventDraft>,
) -> Result<Response, AppError> {
    let event = state.catalog.create(&ctx, draft).await?;
    Ok(created(event, "Event created"))
}

pub async fn update_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
    Json(draft): Json<EventDraft>,
) -> Result<Response, AppError> {
    let event = state.catalog.update(&ctx, id, draft).await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let event = state.catalog.delete(&ctx, id).await?;
    Ok(success(event, "Event deleted"))
}
