use axum::extract::{Path, State};
use axum::response::Response;

use crate::models::RequestContext;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn sales_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    ctx.actor.require_admin()?;
    let summary = state.reports.sales_summary().await?;
    Ok(success(summary, "Sales summary"))
}

pub async fn event_sales(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    ctx.actor.require_admin()?;
    let summary = state.reports.event_sales(id).await?;
    Ok(success(summary, "Event sales"))
}
