use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, Config};
use crate::handlers::{audit, events, health_check, reports, tickets, users};
use crate::middleware::AccessAuditLayer;
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let access_trail = AccessAuditLayer::new(state.audit.clone());

    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(users::register))
        .route("/profile", get(users::profile))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::purchase_ticket),
        )
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/cancel", patch(tickets::cancel_ticket))
        .route("/audit/logs", get(audit::query_logs))
        .route("/audit/me", get(audit::my_logs))
        .route("/audit/:entity_type/:entity_id", get(audit::logs_for_entity))
        .route("/reports/sales", get(reports::sales_summary))
        .route("/reports/events/:id", get(reports::event_sales))
        .with_state(state)
        .layer(access_trail)
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
