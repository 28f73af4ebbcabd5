//! Audit pipeline.
//!
//! Mutating operations hand their before/after snapshots to [`AuditPipeline::record`], which
//! serializes them, stamps the time and pushes the entry onto a bounded queue. A single
//! [`AuditWriter`] task drains the queue into the record store. Nothing on this path can
//! fail or block the operation that produced the entry: a full queue, a stopped writer or a
//! store error all end in a log line and a lost entry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{
    Actor, AuditAction, AuditFilter, AuditLog, AuditLogView, NewAuditLog, RequestContext,
};
use crate::store::RecordStore;
use crate::utils::error::AppError;

/// Cloneable handle used to emit and read audit entries.
#[derive(Clone)]
pub struct AuditPipeline {
    sender: mpsc::Sender<NewAuditLog>,
    store: Arc<dyn RecordStore>,
}

impl AuditPipeline {
    /// Builds the handle and the writer that will drain it. The writer does nothing until
    /// [`AuditWriter::spawn`] is called.
    pub fn new(store: Arc<dyn RecordStore>, capacity: usize) -> (Self, AuditWriter) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let pipeline = Self {
            sender,
            store: Arc::clone(&store),
        };
        (pipeline, AuditWriter { receiver, store })
    }

    /// Queues one entry. Absent snapshots are stored as empty strings.
    pub fn record<O, N>(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        entity_type: &str,
        entity_id: i64,
        old: Option<&O>,
        new: Option<&N>,
    ) where
        O: Serialize + ?Sized,
        N: Serialize + ?Sized,
    {
        let entry = NewAuditLog {
            user_id: ctx.actor.user_id,
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            old_value: snapshot(old),
            new_value: snapshot(new),
            ip_address: ctx.client.ip_address.clone(),
            user_agent: ctx.client.user_agent.clone(),
            created_at: Utc::now(),
        };
        self.enqueue(entry);
    }

    pub fn record_created<T>(&self, ctx: &RequestContext, entity_type: &str, id: i64, new: &T)
    where
        T: Serialize + ?Sized,
    {
        self.record(ctx, AuditAction::Create, entity_type, id, None::<&T>, Some(new));
    }

    pub fn record_updated<T>(
        &self,
        ctx: &RequestContext,
        entity_type: &str,
        id: i64,
        old: &T,
        new: &T,
    ) where
        T: Serialize + ?Sized,
    {
        self.record(ctx, AuditAction::Update, entity_type, id, Some(old), Some(new));
    }

    pub fn record_deleted<T>(&self, ctx: &RequestContext, entity_type: &str, id: i64, old: &T)
    where
        T: Serialize + ?Sized,
    {
        self.record(ctx, AuditAction::Delete, entity_type, id, Some(old), None::<&T>);
    }

    fn enqueue(&self, entry: NewAuditLog) {
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = entry.entity_id,
                    "Audit queue full, dropping entry"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = entry.entity_id,
                    "Audit writer stopped, dropping entry"
                );
            }
        }
    }

    /// Filtered, paginated read; newest first.
    pub async fn query(&self, filter: &AuditFilter) -> Result<(Vec<AuditLogView>, i64), AppError> {
        let (logs, total) = self.store.query_audit_logs(filter).await?;
        Ok((self.with_user_names(logs).await?, total))
    }

    /// Every entry for one entity; newest first.
    pub async fn query_by_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<AuditLogView>, AppError> {
        let logs = self
            .store
            .audit_logs_for_entity(entity_type, entity_id)
            .await?;
        self.with_user_names(logs).await
    }

    async fn with_user_names(&self, logs: Vec<AuditLog>) -> Result<Vec<AuditLogView>, AppError> {
        let ids: Vec<i64> = logs
            .iter()
            .map(|l| l.user_id)
            .filter(|id| *id != Actor::ANONYMOUS_ID)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names = self.store.user_names(&ids).await?;
        Ok(logs
            .into_iter()
            .map(|log| AuditLogView {
                user_name: names.get(&log.user_id).cloned(),
                log,
            })
            .collect())
    }
}

fn snapshot<T: Serialize + ?Sized>(value: Option<&T>) -> String {
    match value {
        None => String::new(),
        Some(value) => serde_json::to_string(value).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to serialize audit snapshot");
            String::new()
        }),
    }
}

/// Which end of an inclusive date range a bound belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEdge {
    Start,
    End,
}

/// Parses an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date widened to the start or the
/// end of that day (UTC).
pub fn parse_date_bound(raw: &str, edge: RangeEdge) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::ValidationError(format!(
            "invalid date '{raw}', expected YYYY-MM-DD or an RFC 3339 timestamp"
        ))
    })?;
    let naive = match edge {
        RangeEdge::Start => date.and_hms_opt(0, 0, 0),
        RangeEdge::End => date.and_hms_nano_opt(23, 59, 59, 999_999_999),
    }
    .ok_or_else(|| AppError::ValidationError(format!("invalid date '{raw}'")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Consumer side of the audit queue.
pub struct AuditWriter {
    receiver: mpsc::Receiver<NewAuditLog>,
    store: Arc<dyn RecordStore>,
}

impl AuditWriter {
    pub fn spawn(self) -> AuditWorker {
        let (shutdown, signal) = oneshot::channel();
        let handle = tokio::spawn(self.run(signal));
        AuditWorker {
            shutdown: Some(shutdown),
            handle,
        }
    }

    async fn run(mut self, mut signal: oneshot::Receiver<()>) -> u64 {
        let mut written = 0;
        loop {
            tokio::select! {
                next = self.receiver.recv() => match next {
                    Some(entry) => written += self.write(entry).await,
                    None => break,
                },
                _ = &mut signal => {
                    // Refuse new entries, then flush whatever is already buffered.
                    self.receiver.close();
                    while let Some(entry) = self.receiver.recv().await {
                        written += self.write(entry).await;
                    }
                    break;
                }
            }
        }
        debug!(written, "Audit writer stopped");
        written
    }

    async fn write(&self, entry: NewAuditLog) -> u64 {
        let action = entry.action;
        let entity_id = entry.entity_id;
        match self.store.insert_audit_log(entry).await {
            Ok(_) => 1,
            Err(err) => {
                error!(error = %err, %action, entity_id, "Failed to persist audit entry");
                0
            }
        }
    }
}

/// Running writer task.
pub struct AuditWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<u64>,
}

impl AuditWorker {
    /// Stops accepting entries and waits up to `timeout` for the backlog to flush.
    /// Returns how many entries the writer persisted over its lifetime.
    pub async fn shutdown(mut self, timeout: Duration) -> u64 {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(written)) => {
                info!(written, "Audit writer drained");
                written
            }
            Ok(Err(err)) => {
                error!(error = %err, "Audit writer task failed");
                0
            }
            Err(_) => {
                warn!(?timeout, "Audit backlog not drained in time, abandoning remaining entries");
                self.handle.abort();
                0
            }
        }
    }
}
