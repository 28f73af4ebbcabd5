use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::{
    AuditFilter, AuditLog, Event, NewAuditLog, NewEvent, NewTicket, NewUser, Ticket,
    TicketStatus, User,
};
use crate::store::{
    duplicate_email, duplicate_name, event_not_found, ticket_not_found, CancelRule, DeleteRule, EventRewrite,
    PurchaseRule, RecordStore,
};
use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

#[derive(Default)]
struct MemoryState {
    events: BTreeMap<i64, Event>,
    tickets: BTreeMap<i64, Ticket>,
    users: BTreeMap<i64, User>,
    audit_logs: Vec<AuditLog>,
    next_event_id: i64,
    next_ticket_id: i64,
    next_user_id: i64,
    next_audit_id: i64,
}

impl MemoryState {
    fn purchased_for(&self, event_id: i64) -> i64 {
        self.tickets
            .values()
            .filter(|t| t.event_id == event_id && t.status == TicketStatus::Purchased)
            .count() as i64
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.events
            .values()
            .any(|e| e.name == name && Some(e.id) != except)
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

fn page_of<T: Clone>(items: Vec<&T>, page: Pagination) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let rows = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .cloned()
        .collect();
    (rows, total)
}

/// Process-local record store. Every operation runs under one lock, which makes each
/// guarded mutation trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_user(&self, id: i64) -> Option<User> {
        self.state.lock().users.remove(&id)
    }

    pub fn audit_log_count(&self) -> usize {
        self.state.lock().audit_logs.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, AppError> {
        let mut state = self.state.lock();
        if state.name_taken(&event.name, None) {
            return Err(duplicate_name(&event.name));
        }
        let now = Utc::now();
        let id = next_id(&mut state.next_event_id);
        let stored = Event {
            id,
            name: event.name,
            description: event.description,
            location: event.location,
            start_date: event.start_date,
            end_date: event.end_date,
            capacity: event.capacity,
            price: event.price,
            status: event.status,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError> {
        Ok(self.state.lock().events.get(&id).cloned())
    }

    async fn list_events(&self, page: Pagination) -> Result<(Vec<Event>, i64), AppError> {
        let state = self.state.lock();
        Ok(page_of(state.events.values().collect(), page))
    }

    async fn all_events(&self) -> Result<Vec<Event>, AppError> {
        Ok(self.state.lock().events.values().cloned().collect())
    }

    async fn update_event(
        &self,
        id: i64,
        rewrite: EventRewrite<'_>,
    ) -> Result<(Event, Event), AppError> {
        let mut state = self.state.lock();
        let current = state.events.get(&id).cloned().ok_or_else(|| event_not_found(id))?;
        let sold = state.purchased_for(id);
        let mut updated = rewrite(&current, sold)?;
        updated.id = id;
        if state.name_taken(&updated.name, Some(id)) {
            return Err(duplicate_name(&updated.name));
        }
        state.events.insert(id, updated.clone());
        Ok((current, updated))
    }

    async fn delete_event(&self, id: i64, rule: DeleteRule<'_>) -> Result<Event, AppError> {
        let mut state = self.state.lock();
        let current = state.events.get(&id).ok_or_else(|| event_not_found(id))?;
        rule(current, state.purchased_for(id))?;
        state.events.remove(&id).ok_or_else(|| event_not_found(id))
    }

    async fn count_purchased(&self, event_id: i64) -> Result<i64, AppError> {
        Ok(self.state.lock().purchased_for(event_id))
    }

    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        rule: PurchaseRule<'_>,
    ) -> Result<Ticket, AppError> {
        let mut state = self.state.lock();
        let event = state
            .events
            .get(&ticket.event_id)
            .ok_or_else(|| event_not_found(ticket.event_id))?;
        rule(event, state.purchased_for(ticket.event_id))?;

        let id = next_id(&mut state.next_ticket_id);
        let stored = Ticket {
            id,
            user_id: ticket.user_id,
            event_id: ticket.event_id,
            status: TicketStatus::Purchased,
            purchased_at: ticket.purchased_at,
            created_at: ticket.purchased_at,
            updated_at: ticket.purchased_at,
        };
        state.tickets.insert(id, stored.clone());
        Ok(stored)
    }

    async fn cancel_ticket(
        &self,
        ticket_id: i64,
        at: DateTime<Utc>,
        rule: CancelRule<'_>,
    ) -> Result<(Ticket, Ticket), AppError> {
        let mut state = self.state.lock();
        let current = state
            .tickets
            .get(&ticket_id)
            .cloned()
            .ok_or_else(|| ticket_not_found(ticket_id))?;
        rule(&current, state.events.get(&current.event_id))?;

        let cancelled = current.cancelled(at);
        state.tickets.insert(ticket_id, cancelled.clone());
        Ok((current, cancelled))
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>, AppError> {
        Ok(self.state.lock().tickets.get(&id).cloned())
    }

    async fn list_tickets(
        &self,
        owner: Option<i64>,
        page: Pagination,
    ) -> Result<(Vec<Ticket>, i64), AppError> {
        let state = self.state.lock();
        let matching = state
            .tickets
            .values()
            .filter(|t| owner.map_or(true, |o| t.user_id == o))
            .collect();
        Ok(page_of(matching, page))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(duplicate_email(&user.email));
        }
        let id = next_id(&mut state.next_user_id);
        let stored = User {
            id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn user_names(&self, ids: &[i64]) -> Result<HashMap<i64, String>, AppError> {
        let state = self.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|u| (*id, u.name.clone())))
            .collect())
    }

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, AppError> {
        let mut state = self.state.lock();
        let id = next_id(&mut state.next_audit_id);
        let log = AuditLog {
            id,
            user_id: entry.user_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            old_value: entry.old_value,
            new_value: entry.new_value,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at,
        };
        state.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn query_audit_logs(
        &self,
        filter: &AuditFilter,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let state = self.state.lock();
        let mut matching: Vec<&AuditLog> =
            state.audit_logs.iter().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_of(matching, filter.pagination))
    }

    async fn audit_logs_for_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let state = self.state.lock();
        let mut matching: Vec<AuditLog> = state
            .audit_logs
            .iter()
            .filter(|l| l.entity_type == entity_type && l.entity_id == entity_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, EventStatus, Role};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn new_event(name: &str) -> NewEvent {
        let start = Utc::now() + Duration::days(1);
        NewEvent {
            name: name.into(),
            description: String::new(),
            location: "Hall A".into(),
            start_date: start,
            end_date: start + Duration::hours(2),
            capacity: 2,
            price: Decimal::new(10, 0),
            status: EventStatus::Active,
        }
    }

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            role: Role::User,
        }
    }

    fn audit_entry(user_id: i64, at: DateTime<Utc>) -> NewAuditLog {
        NewAuditLog {
            user_id,
            action: AuditAction::Create,
            entity_type: "event".into(),
            entity_id: 1,
            old_value: String::new(),
            new_value: "{}".into(),
            ip_address: "127.0.0.1".into(),
            user_agent: "test".into(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_insert_event_rejects_duplicate_names() {
        let store = MemoryStore::new();
        store.insert_event(new_event("Gala")).await.unwrap();
        let err = store.insert_event(new_event("Gala")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rejected_rule_leaves_no_ticket() {
        let store = MemoryStore::new();
        let event = store.insert_event(new_event("Gala")).await.unwrap();
        let ticket = NewTicket {
            user_id: 7,
            event_id: event.id,
            purchased_at: Utc::now(),
        };

        let err = store
            .issue_ticket(ticket, &|_, _| Err(AppError::CapacityExceeded("full".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::CapacityExceeded(_)));
        assert_eq!(store.count_purchased(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_tickets_do_not_count_as_purchased() {
        let store = MemoryStore::new();
        let event = store.insert_event(new_event("Gala")).await.unwrap();
        let ticket = store
            .issue_ticket(
                NewTicket {
                    user_id: 7,
                    event_id: event.id,
                    purchased_at: Utc::now(),
                },
                &|_, _| Ok(()),
            )
            .await
            .unwrap();
        assert_eq!(store.count_purchased(event.id).await.unwrap(), 1);

        store
            .cancel_ticket(ticket.id, Utc::now(), &|_, _| Ok(()))
            .await
            .unwrap();
        assert_eq!(store.count_purchased(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_audit_query_orders_newest_first_and_filters() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..5 {
            let user = if i % 2 == 0 { 1 } else { 2 };
            store
                .insert_audit_log(audit_entry(user, base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let filter = AuditFilter {
            user_id: Some(1),
            ..AuditFilter::default()
        };
        let (logs, total) = store.query_audit_logs(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert!(logs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(logs.iter().all(|l| l.user_id == 1));
    }

    #[tokio::test]
    async fn test_user_names_skip_missing_users() {
        let store = MemoryStore::new();
        let alice = store
            .insert_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        let names = store.user_names(&[alice.id, 99]).await.unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&alice.id], "alice");
    }

    #[tokio::test]
    async fn test_emails_are_unique() {
        let store = MemoryStore::new();
        store
            .insert_user(new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        let err = store
            .insert_user(new_user("alice again", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.find_user(2).await.unwrap().is_none());
    }
}
