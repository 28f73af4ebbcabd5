#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use box_office_server::models::{Actor, ClientInfo, Event, EventDraft, EventStatus, NewEvent};
use box_office_server::models::{RequestContext, Role};
use box_office_server::services::{AuditPipeline, AuditWorker};
use box_office_server::state::AppState;
use box_office_server::store::{MemoryStore, RecordStore};

pub const ADMIN_ID: i64 = 1;

pub fn ctx(user_id: i64, role: Role) -> RequestContext {
    RequestContext::new(
        Actor::new(user_id, role),
        ClientInfo {
            ip_address: "198.51.100.7".into(),
            user_agent: "integration-test".into(),
        },
    )
}

pub fn admin() -> RequestContext {
    ctx(ADMIN_ID, Role::Admin)
}

pub fn buyer(user_id: i64) -> RequestContext {
    ctx(user_id, Role::User)
}

pub fn draft(name: &str, capacity: i32) -> EventDraft {
    let start = Utc::now() + Duration::days(7);
    EventDraft {
        name: name.to_string(),
        description: "An evening out".into(),
        location: "Main Hall".into(),
        start_date: start,
        end_date: start + Duration::hours(3),
        capacity,
        price: Decimal::new(2500, 2),
        status: None,
    }
}

/// Application services over an in-memory store with a running audit writer.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    worker: AuditWorker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_queue(256)
    }

    pub fn with_queue(capacity: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let (audit, writer) = AuditPipeline::new(Arc::clone(&dyn_store), capacity);
        Self {
            state: AppState::new(dyn_store, audit),
            store,
            worker: writer.spawn(),
        }
    }

    /// Stops the writer after it has persisted everything queued so far.
    pub async fn flush(self) -> (Arc<MemoryStore>, AppState) {
        self.worker.shutdown(StdDuration::from_secs(5)).await;
        (self.store, self.state)
    }

    /// Inserts an event bypassing catalog validation, e.g. one that already started.
    pub async fn raw_event(&self, name: &str, capacity: i32, starts_in: Duration) -> Event {
        let start = Utc::now() + starts_in;
        self.store
            .insert_event(NewEvent {
                name: name.to_string(),
                description: String::new(),
                location: "Main Hall".into(),
                start_date: start,
                end_date: start + Duration::hours(3),
                capacity,
                price: Decimal::new(1000, 2),
                status: EventStatus::Active,
            })
            .await
            .unwrap()
    }
}
