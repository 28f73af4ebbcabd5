use std::sync::Arc;

use tracing::info;

use crate::models::audit_log::entity;
use crate::models::{Actor, RegisterRequest, RequestContext, User, UserProfile};
use crate::services::audit::AuditPipeline;
use crate::store::RecordStore;
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

/// Account registration and the caller's own profile.
pub struct UserDirectory {
    store: Arc<dyn RecordStore>,
    audit: AuditPipeline,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditPipeline) -> Self {
        Self { store, audit }
    }

    pub async fn register(
        &self,
        ctx: &RequestContext,
        request: RegisterRequest,
    ) -> Result<User, AppError> {
        request.validate()?;

        let user = self.store.insert_user(request.into_new_user()).await?;

        info!(user_id = user.id, role = user.role.as_str(), "User registered");
        self.audit.record_created(ctx, entity::USER, user.id, &user);
        Ok(user)
    }

    pub async fn profile(&self, actor: &Actor) -> Result<UserProfile, AppError> {
        let user = self
            .store
            .find_user(actor.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("user {} is not registered", actor.user_id))
            })?;

        // Only the total is needed.
        let (_, ticket_count) = self
            .store
            .list_tickets(Some(user.id), Pagination::new(Some(1), Some(1)))
            .await?;

        Ok(UserProfile { user, ticket_count })
    }
}
