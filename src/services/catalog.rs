use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::models::audit_log::entity;
use crate::models::{Event, EventDraft, EventStatus, RequestContext};
use crate::services::audit::AuditPipeline;
use crate::store::{event_not_found, RecordStore};
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

/// Administrator-facing event management.
pub struct EventCatalog {
    store: Arc<dyn RecordStore>,
    audit: AuditPipeline,
}

impl EventCatalog {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditPipeline) -> Self {
        Self { store, audit }
    }

    pub async fn create(&self, ctx: &RequestContext, draft: EventDraft) -> Result<Event, AppError> {
        ctx.actor.require_admin()?;
        draft.validate(Utc::now())?;

        let event = self.store.insert_event(draft.into_new_event()).await?;

        info!(event_id = event.id, name = %event.name, "Event created");
        self.audit
            .record_created(ctx, entity::EVENT, event.id, &event);
        Ok(event)
    }

    /// Replaces every mutable field. Shrinking capacity below the number of tickets already
    /// purchased is rejected with `Conflict`.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        draft: EventDraft,
    ) -> Result<Event, AppError> {
        ctx.actor.require_admin()?;
        let now = Utc::now();

        let (before, after) = self
            .store
            .update_event(id, &|current, sold| {
                if current.status == EventStatus::Finished {
                    return Err(AppError::InvalidState(format!(
                        "event {} is finished and can no longer be modified",
                        current.id
                    )));
                }
                draft.validate(now)?;
                if i64::from(draft.capacity) < sold {
                    return Err(AppError::Conflict(format!(
                        "capacity {} is below the {} tickets already sold",
                        draft.capacity, sold
                    )));
                }
                Ok(draft.apply_to(current, now))
            })
            .await?;

        info!(event_id = id, status = %after.status, "Event updated");
        self.audit
            .record_updated(ctx, entity::EVENT, id, &before, &after);
        Ok(after)
    }

    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> Result<Event, AppError> {
        ctx.actor.require_admin()?;

        let removed = self
            .store
            .delete_event(id, &|event, sold| {
                if sold > 0 {
                    return Err(AppError::Conflict(format!(
                        "cannot delete event {} with {} sold tickets",
                        event.id, sold
                    )));
                }
                Ok(())
            })
            .await?;

        info!(event_id = id, "Event deleted");
        self.audit
            .record_deleted(ctx, entity::EVENT, id, &removed);
        Ok(removed)
    }

    pub async fn get(&self, id: i64) -> Result<Event, AppError> {
        self.store
            .find_event(id)
            .await?
            .ok_or_else(|| event_not_found(id))
    }

    pub async fn list(&self, page: Pagination) -> Result<(Vec<Event>, i64), AppError> {
        self.store.list_events(page).await
    }
}
