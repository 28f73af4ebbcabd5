use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::models::{
    AuditFilter, AuditLog, Event, NewAuditLog, NewEvent, NewTicket, NewUser, Role, Ticket,
    TicketStatus, User,
};
use crate::store::{
    duplicate_email, duplicate_name, event_not_found, ticket_not_found, CancelRule, DeleteRule, EventRewrite,
    PurchaseRule, RecordStore,
};
use crate::utils::error::{conflict_on_unique, AppError};
use crate::utils::pagination::Pagination;

const EVENT_COLUMNS: &str = "id, name, description, location, start_date, end_date, capacity, \
                             price, status, created_at, updated_at";
const TICKET_COLUMNS: &str = "id, user_id, event_id, status, purchased_at, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, role, created_at";
const AUDIT_COLUMNS: &str = "id, user_id, action, entity_type, entity_id, old_value, new_value, \
                             ip_address, user_agent, created_at";

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    name: String,
    description: String,
    location: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    capacity: i32,
    price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            name: row.name,
            description: row.description,
            location: row.location,
            start_date: row.start_date,
            end_date: row.end_date,
            capacity: row.capacity,
            price: row.price,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    status: String,
    purchased_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            status: row.status.parse()?,
            purchased_at: row.purchased_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).ok_or_else(|| {
            AppError::InternalServerError(format!("unknown role '{}'", row.role))
        })?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    id: i64,
    user_id: i64,
    action: String,
    entity_type: String,
    entity_id: i64,
    old_value: String,
    new_value: String,
    ip_address: String,
    user_agent: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLog {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(AuditLog {
            id: row.id,
            user_id: row.user_id,
            action: row.action.parse().map_err(|_| {
                AppError::InternalServerError(format!("unknown audit action '{}'", row.action))
            })?,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            old_value: row.old_value,
            new_value: row.new_value,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(entity_type) = &filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(action) = filter.action {
        qb.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(start) = filter.start {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

/// Postgres-backed record store.
///
/// Guarded mutations open a transaction and take a row lock (`FOR UPDATE`) on the event or
/// ticket they depend on, so the rule and the write see one consistent state.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, AppError> {
        let sql = format!(
            "INSERT INTO events (name, description, location, start_date, end_date, capacity, \
             price, status) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {EVENT_COLUMNS}"
        );
        let row: EventRow = sqlx::query_as(&sql)
            .bind(&event.name)
            .bind(&event.description)
            .bind(&event.location)
            .bind(event.start_date)
            .bind(event.end_date)
            .bind(event.capacity)
            .bind(event.price)
            .bind(event.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, duplicate_name(&event.name)))?;
        row.try_into()
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row: Option<EventRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Event::try_from).transpose()
    }

    async fn list_events(&self, page: Pagination) -> Result<(Vec<Event>, i64), AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id LIMIT $1 OFFSET $2");
        let rows: Vec<EventRow> = sqlx::query_as(&sql)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok((convert_all(rows)?, total))
    }

    async fn all_events(&self) -> Result<Vec<Event>, AppError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id");
        let rows: Vec<EventRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn update_event(
        &self,
        id: i64,
        rewrite: EventRewrite<'_>,
    ) -> Result<(Event, Event), AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        let current: Event = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| event_not_found(id))?
            .try_into()?;
        let sold: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND status = $2",
        )
        .bind(id)
        .bind(TicketStatus::Purchased.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let next = rewrite(&current, sold)?;

        let sql = format!(
            "UPDATE events SET name = $2, description = $3, location = $4, start_date = $5, \
             end_date = $6, capacity = $7, price = $8, status = $9, updated_at = $10 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let row: EventRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(&next.name)
            .bind(&next.description)
            .bind(&next.location)
            .bind(next.start_date)
            .bind(next.end_date)
            .bind(next.capacity)
            .bind(next.price)
            .bind(next.status.as_str())
            .bind(next.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, duplicate_name(&next.name)))?;

        tx.commit().await?;
        Ok((current, row.try_into()?))
    }

    async fn delete_event(&self, id: i64, rule: DeleteRule<'_>) -> Result<Event, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        let current: Event = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| event_not_found(id))?
            .try_into()?;
        let sold: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND status = $2",
        )
        .bind(id)
        .bind(TicketStatus::Purchased.as_str())
        .fetch_one(&mut *tx)
        .await?;

        rule(&current, sold)?;

        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(current)
    }

    async fn count_purchased(&self, event_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND status = $2",
        )
        .bind(event_id)
        .bind(TicketStatus::Purchased.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn issue_ticket(
        &self,
        ticket: NewTicket,
        rule: PurchaseRule<'_>,
    ) -> Result<Ticket, AppError> {
        let mut tx = self.pool.begin().await?;

        // The event row lock serializes every purchase against the same event.
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        let event: Event = sqlx::query_as::<_, EventRow>(&sql)
            .bind(ticket.event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| event_not_found(ticket.event_id))?
            .try_into()?;
        let sold: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE event_id = $1 AND status = $2",
        )
        .bind(ticket.event_id)
        .bind(TicketStatus::Purchased.as_str())
        .fetch_one(&mut *tx)
        .await?;

        rule(&event, sold)?;

        let sql = format!(
            "INSERT INTO tickets (user_id, event_id, status, purchased_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4, $4) RETURNING {TICKET_COLUMNS}"
        );
        let row: TicketRow = sqlx::query_as(&sql)
            .bind(ticket.user_id)
            .bind(ticket.event_id)
            .bind(TicketStatus::Purchased.as_str())
            .bind(ticket.purchased_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn cancel_ticket(
        &self,
        ticket_id: i64,
        at: DateTime<Utc>,
        rule: CancelRule<'_>,
    ) -> Result<(Ticket, Ticket), AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
        let current: Ticket = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ticket_not_found(ticket_id))?
            .try_into()?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let event: Option<Event> = sqlx::query_as::<_, EventRow>(&sql)
            .bind(current.event_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Event::try_from)
            .transpose()?;

        rule(&current, event.as_ref())?;

        let sql = format!(
            "UPDATE tickets SET status = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {TICKET_COLUMNS}"
        );
        let row: TicketRow = sqlx::query_as(&sql)
            .bind(ticket_id)
            .bind(TicketStatus::Cancelled.as_str())
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((current, row.try_into()?))
    }

    async fn find_ticket(&self, id: i64) -> Result<Option<Ticket>, AppError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        let row: Option<TicketRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn list_tickets(
        &self,
        owner: Option<i64>,
        page: Pagination,
    ) -> Result<(Vec<Ticket>, i64), AppError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE ($1::BIGINT IS NULL OR user_id = $1)")
                .bind(owner)
                .fetch_one(&self.pool)
                .await?;
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE ($1::BIGINT IS NULL OR user_id = $1) \
             ORDER BY id LIMIT $2 OFFSET $3"
        );
        let rows: Vec<TicketRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok((convert_all(rows)?, total))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (name, email, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, duplicate_email(&user.email)))?;
        row.try_into()
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn user_names(&self, ids: &[i64]) -> Result<HashMap<i64, String>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, AppError> {
        let sql = format!(
            "INSERT INTO audit_logs (user_id, action, entity_type, entity_id, old_value, \
             new_value, ip_address, user_agent, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {AUDIT_COLUMNS}"
        );
        let row: AuditLogRow = sqlx::query_as(&sql)
            .bind(entry.user_id)
            .bind(entry.action.as_str())
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .bind(entry.created_at)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn query_audit_logs(
        &self,
        filter: &AuditFilter,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs"
        ));
        push_audit_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.pagination.limit)
            .push(" OFFSET ")
            .push_bind(filter.pagination.offset());
        let rows: Vec<AuditLogRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((convert_all(rows)?, total))
    }

    async fn audit_logs_for_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<AuditLogRow> = sqlx::query_as(&sql)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }
}
