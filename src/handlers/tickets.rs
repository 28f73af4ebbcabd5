use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;

use crate::models::{PurchaseRequest, RequestContext};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::pagination::{PageParams, Pagination};
use crate::utils::response::{created, paginated, success};

pub async fn list_tickets(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<PageParams>,
) -> Result<Response, AppError> {
    let page = Pagination::from(params);
    let (tickets, total) = state.issuance.list(&ctx.actor, page).await?;
    Ok(paginated(tickets, page.meta(total)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket = state.issuance.get(&ctx.actor, id).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn purchase_ticket(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let ticket = state.issuance.purchase(&ctx, request.event_id).await?;
    Ok(created(ticket, "Ticket purchased"))
}

pub async fn cancel_ticket(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let ticket = state.issuance.cancel(&ctx, id).await?;
    Ok(success(ticket, "Ticket cancelled"))
}
