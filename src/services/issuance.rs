//! Ticket issuance.
//!
//! A ticket moves through exactly two states, `purchased` then `cancelled`. The rules for
//! each transition live in [`check_purchase`] and [`check_cancel`]; the record store runs
//! them inside the same atomic scope as the write so that concurrent purchases against a
//! nearly full event can never oversell it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::audit_log::entity;
use crate::models::{Actor, Event, EventStatus, NewTicket, RequestContext, Ticket, TicketStatus};
use crate::services::audit::AuditPipeline;
use crate::store::{event_not_found, ticket_not_found, RecordStore};
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

/// Preconditions for issuing one more ticket against `event`, which already has `sold`
/// purchased tickets.
pub fn check_purchase(event: &Event, sold: i64, now: DateTime<Utc>) -> Result<(), AppError> {
    if event.status != EventStatus::Active {
        return Err(AppError::InvalidState(format!(
            "tickets can only be purchased for active events (event {} is {})",
            event.id, event.status
        )));
    }
    if event.has_started(now) {
        return Err(AppError::InvalidState(format!(
            "event {} has already started",
            event.id
        )));
    }
    if sold >= i64::from(event.capacity) {
        return Err(AppError::CapacityExceeded(format!(
            "event {} is sold out",
            event.id
        )));
    }
    Ok(())
}

/// Preconditions for `actor` cancelling `ticket`. `event` is `None` if it no longer exists.
pub fn check_cancel(
    actor: &Actor,
    ticket: &Ticket,
    event: Option<&Event>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if ticket.user_id != actor.user_id && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "not authorized to cancel this ticket".into(),
        ));
    }
    if ticket.status == TicketStatus::Cancelled {
        return Err(AppError::InvalidState(format!(
            "ticket {} is already cancelled",
            ticket.id
        )));
    }
    let event = event.ok_or_else(|| event_not_found(ticket.event_id))?;
    if event.has_started(now) {
        return Err(AppError::InvalidState(
            "cannot cancel tickets for events that have already started".into(),
        ));
    }
    Ok(())
}

pub struct IssuanceEngine {
    store: Arc<dyn RecordStore>,
    audit: AuditPipeline,
}

impl IssuanceEngine {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditPipeline) -> Self {
        Self { store, audit }
    }

    pub async fn purchase(&self, ctx: &RequestContext, event_id: i64) -> Result<Ticket, AppError> {
        if ctx.actor.user_id == Actor::ANONYMOUS_ID {
            return Err(AppError::AuthError(
                "sign in to purchase tickets".into(),
            ));
        }

        let now = Utc::now();
        let request = NewTicket {
            user_id: ctx.actor.user_id,
            event_id,
            purchased_at: now,
        };
        let ticket = self
            .store
            .issue_ticket(request, &|event, sold| check_purchase(event, sold, now))
            .await?;

        info!(
            ticket_id = ticket.id,
            event_id,
            user_id = ticket.user_id,
            "Ticket purchased"
        );
        self.audit
            .record_created(ctx, entity::TICKET, ticket.id, &ticket);
        Ok(ticket)
    }

    pub async fn cancel(&self, ctx: &RequestContext, ticket_id: i64) -> Result<Ticket, AppError> {
        let now = Utc::now();
        let actor = ctx.actor;
        let (before, after) = self
            .store
            .cancel_ticket(ticket_id, now, &|ticket, event| {
                check_cancel(&actor, ticket, event, now)
            })
            .await?;

        info!(
            ticket_id,
            event_id = after.event_id,
            user_id = actor.user_id,
            "Ticket cancelled"
        );
        self.audit
            .record_updated(ctx, entity::TICKET, ticket_id, &before, &after);
        Ok(after)
    }

    /// Owners see their own tickets; admins see any.
    pub async fn get(&self, actor: &Actor, ticket_id: i64) -> Result<Ticket, AppError> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| ticket_not_found(ticket_id))?;
        if ticket.user_id != actor.user_id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "not authorized to view this ticket".into(),
            ));
        }
        Ok(ticket)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        page: Pagination,
    ) -> Result<(Vec<Ticket>, i64), AppError> {
        let owner = if actor.is_admin() {
            None
        } else {
            Some(actor.user_id)
        };
        self.store.list_tickets(owner, page).await
    }

    pub async fn count_purchased(&self, event_id: i64) -> Result<i64, AppError> {
        self.store.count_purchased(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn event(capacity: i32, start_in: Duration, status: EventStatus) -> Event {
        let now = Utc::now();
        Event {
            id: 1,
            name: "Concert".into(),
            description: String::new(),
            location: "Arena".into(),
            start_date: now + start_in,
            end_date: now + start_in + Duration::hours(2),
            capacity,
            price: Decimal::new(50, 0),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn ticket(user_id: i64, status: TicketStatus) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 10,
            user_id,
            event_id: 1,
            status,
            purchased_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_purchase_allowed_below_capacity() {
        let e = event(2, Duration::days(1), EventStatus::Active);
        assert!(check_purchase(&e, 1, Utc::now()).is_ok());
    }

    #[test]
    fn test_purchase_rejected_at_capacity() {
        let e = event(2, Duration::days(1), EventStatus::Active);
        assert!(matches!(
            check_purchase(&e, 2, Utc::now()),
            Err(AppError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_purchase_rejected_for_inactive_or_started_events() {
        let ongoing = event(5, Duration::days(1), EventStatus::Ongoing);
        assert!(matches!(
            check_purchase(&ongoing, 0, Utc::now()),
            Err(AppError::InvalidState(_))
        ));

        let started = event(5, Duration::hours(-1), EventStatus::Active);
        assert!(matches!(
            check_purchase(&started, 0, Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cancel_requires_owner_or_admin() {
        let e = event(5, Duration::days(1), EventStatus::Active);
        let t = ticket(7, TicketStatus::Purchased);
        let now = Utc::now();

        assert!(check_cancel(&Actor::new(7, Role::User), &t, Some(&e), now).is_ok());
        assert!(check_cancel(&Actor::new(1, Role::Admin), &t, Some(&e), now).is_ok());
        assert!(matches!(
            check_cancel(&Actor::new(8, Role::User), &t, Some(&e), now),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let e = event(5, Duration::days(1), EventStatus::Active);
        let t = ticket(7, TicketStatus::Cancelled);
        assert!(matches!(
            check_cancel(&Actor::new(7, Role::User), &t, Some(&e), Utc::now()),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cancel_rejected_once_event_started_or_gone() {
        let t = ticket(7, TicketStatus::Purchased);
        let actor = Actor::new(7, Role::User);
        let started = event(5, Duration::minutes(-5), EventStatus::Ongoing);

        assert!(matches!(
            check_cancel(&actor, &t, Some(&started), Utc::now()),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            check_cancel(&actor, &t, None, Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }
}
