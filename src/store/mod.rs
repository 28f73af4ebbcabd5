//! Persistence boundary.
//!
//! Services never talk to a database directly; they hold an `Arc<dyn RecordStore>` built by
//! the composition root. Mutations whose legality depends on other rows (issuing a ticket
//! against capacity, cancelling, rewriting or deleting an event) are *guarded*: the caller
//! passes its rule as a closure and the store evaluates it inside the same atomic scope as
//! the write, so no other guarded mutation on the same event can interleave.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{
    AuditFilter, AuditLog, Event, NewAuditLog, NewEvent, NewTicket, NewUser, Ticket, User,
};
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Decides whether a ticket may be issued, given the locked event and its purchased count.
pub type PurchaseRule<'a> = &'a (dyn Fn(&Event, i64) -> Result<(), AppError> + Send + Sync);

/// Decides whether a ticket may be cancelled. The event is `None` if it has been deleted.
pub type CancelRule<'a> =
    &'a (dyn Fn(&Ticket, Option<&Event>) -> Result<(), AppError> + Send + Sync);

/// Produces the replacement for a locked event, given its purchased count.
pub type EventRewrite<'a> =
    &'a (dyn Fn(&Event, i64) -> Result<Event, AppError> + Send + Sync);

/// Decides whether a locked event may be removed, given its purchased count.
pub type DeleteRule<'a> = &'a (dyn Fn(&Event, i64) -> Result<(), AppError> + Send + Sync);

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with `Conflict` when the name is already taken.
    async fn insert_event(&self, event: NewEvent) -> Result<Event, AppError>;

    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError>;

    /// Page of events ordered by id, plus the total count.
    async fn list_events(&self, page: Pagination) -> Result<(Vec<Event>, i64), AppError>;

    async fn all_events(&self) -> Result<Vec<Event>, AppError>;

    /// Returns `(before, after)`. Fails with `NotFound` or `Conflict` (duplicate name).
    async fn update_event(
        &self,
        id: i64,
        rewrite: EventRewrite<'_>,
    ) -> Result<(Event, Event), AppError>;

    /// Returns the removed event. Tickets referencing it are left untouched.
    async fn delete_event(&self, id: i64, rule: DeleteRule<'_>) -> Result<Event, AppError>;

    async fn count_purchased(&self, event_id: i64) -> Result<i64, AppError>;

    /// Count-then-insert as one unit. Fails with `NotFound` for an unknown event.
    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        rule: PurchaseRule<'_>,
    ) -> Result<Ticket, AppError>;

    /// Returns `(before, after)`. Fails with `NotFound` for an unknown ticket.
    async fn cancel_ticket(
        &self,
        ticket_id: i64,
        at: chrono::DateTime<chrono::Utc>,
        rule: CancelRule<'_>,
    ) -> Result<(Ticket, Ticket), AppError>;

    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>, AppError>;

    /// Page of tickets ordered by id, optionally restricted to one owner.
    async fn list_tickets(
        &self,
        owner: Option<i64>,
        page: Pagination,
    ) -> Result<(Vec<Ticket>, i64), AppError>;

    /// Fails with `Conflict` when the email is already registered.
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Display names for whichever of `ids` still exist.
    async fn user_names(&self, ids: &[i64]) -> Result<HashMap<i64, String>, AppError>;

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, AppError>;

    /// Newest first (id breaks ties), plus the total number of matches.
    async fn query_audit_logs(
        &self,
        filter: &AuditFilter,
    ) -> Result<(Vec<AuditLog>, i64), AppError>;

    async fn audit_logs_for_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<AuditLog>, AppError>;
}

pub(crate) fn event_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("event {id} not found"))
}

pub(crate) fn ticket_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("ticket {id} not found"))
}

pub(crate) fn duplicate_email(email: &str) -> AppError {
    AppError::Conflict(format!("'{email}' is already registered"))
}

pub(crate) fn duplicate_name(name: &str) -> AppError {
    AppError::Conflict(format!("an event named '{name}' already exists"))
}
