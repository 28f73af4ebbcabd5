use axum::extract::State;
use axum::response::Response;
use axum::Json;

use crate::handlers::context::Caller;
use crate::models::{RegisterRequest, RequestContext};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn register(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let user = state.users.register(&ctx, request).await?;
    Ok(created(user, "User registered successfully"))
}

pub async fn profile(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let profile = state.users.profile(&ctx.actor).await?;
    Ok(success(profile, "Profile retrieved"))
}
