use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::models::{AuditAction, AuditFilter, RequestContext};
use crate::services::audit::{parse_date_bound, RangeEdge};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;
use crate::utils::response::{paginated, success};

/// `GET /audit/logs` query string. Dates accept `YYYY-MM-DD` or RFC 3339.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl TryFrom<AuditQueryParams> for AuditFilter {
    type Error = AppError;

    fn try_from(params: AuditQueryParams) -> Result<Self, Self::Error> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let action = non_empty(params.action)
            .map(|a| a.trim().to_ascii_lowercase().parse::<AuditAction>())
            .transpose()?;
        let start = non_empty(params.start_date)
            .map(|d| parse_date_bound(&d, RangeEdge::Start))
            .transpose()?;
        let end = non_empty(params.end_date)
            .map(|d| parse_date_bound(&d, RangeEdge::End))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::ValidationError(
                    "start_date must not be after end_date".into(),
                ));
            }
        }

        Ok(AuditFilter {
            pagination: Pagination::new(params.page, params.limit),
            user_id: params.user_id,
            entity_type: non_empty(params.entity_type),
            action,
            start,
            end,
        })
    }
}

pub async fn query_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<AuditQueryParams>,
) -> Result<Response, AppError> {
    ctx.actor.require_admin()?;
    let filter = AuditFilter::try_from(params)?;
    let (logs, total) = state.audit.query(&filter).await?;
    Ok(paginated(logs, filter.pagination.meta(total)))
}

/// The caller's own trail. Any `user_id` in the query string is overridden.
pub async fn my_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<AuditQueryParams>,
) -> Result<Response, AppError> {
    let filter = AuditFilter {
        user_id: Some(ctx.actor.user_id),
        ..AuditFilter::try_from(params)?
    };
    let (logs, total) = state.audit.query(&filter).await?;
    Ok(paginated(logs, filter.pagination.meta(total)))
}

pub async fn logs_for_entity(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((entity_type, entity_id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    ctx.actor.require_admin()?;
    let logs = state.audit.query_by_entity(&entity_type, entity_id).await?;
    Ok(success(logs, "Audit trail retrieved"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_params_become_filter() {
        let filter = AuditFilter::try_from(AuditQueryParams {
            page: Some(2),
            limit: Some(10),
            user_id: Some(5),
            entity_type: Some("ticket".into()),
            action: Some("Create".into()),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-01-31".into()),
        })
        .unwrap();

        assert_eq!(filter.pagination, Pagination::new(Some(2), Some(10)));
        assert_eq!(filter.user_id, Some(5));
        assert_eq!(filter.entity_type.as_deref(), Some("ticket"));
        assert_eq!(filter.action, Some(AuditAction::Create));
        assert_eq!(filter.end.unwrap().hour(), 23);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let filter = AuditFilter::try_from(AuditQueryParams {
            entity_type: Some("  ".into()),
            action: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter, AuditFilter::default());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let unknown_action = AuditQueryParams {
            action: Some("purge".into()),
            ..Default::default()
        };
        assert!(matches!(
            AuditFilter::try_from(unknown_action),
            Err(AppError::ValidationError(_))
        ));

        let inverted = AuditQueryParams {
            start_date: Some("2024-02-01".into()),
            end_date: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert!(matches!(
            AuditFilter::try_from(inverted),
            Err(AppError::ValidationError(_))
        ));
    }
}
