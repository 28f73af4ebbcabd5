use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod audit;
pub mod context;
pub mod events;
pub mod reports;
pub mod tickets;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "box-office-api",
    };

    success(payload, "Health check successful")
}
