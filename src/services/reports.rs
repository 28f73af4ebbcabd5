use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Event;
use crate::store::{event_not_found, RecordStore};
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSalesSummary {
    pub event_id: i64,
    pub event_name: String,
    pub total_tickets: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_events: i64,
    pub total_tickets: i64,
    pub total_revenue: Decimal,
    pub event_summary: Vec<EventSalesSummary>,
}

/// Read-only sales figures. Revenue is `price × purchased tickets`; cancelled tickets
/// don't count.
pub struct ReportService {
    store: Arc<dyn RecordStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn sales_summary(&self) -> Result<SalesSummary, AppError> {
        let events = self.store.all_events().await?;

        let mut summary = SalesSummary {
            total_events: events.len() as i64,
            total_tickets: 0,
            total_revenue: Decimal::ZERO,
            event_summary: Vec::with_capacity(events.len()),
        };
        for event in &events {
            let line = self.summarize(event).await?;
            summary.total_tickets += line.total_tickets;
            summary.total_revenue += line.total_revenue;
            summary.event_summary.push(line);
        }
        Ok(summary)
    }

    pub async fn event_sales(&self, event_id: i64) -> Result<EventSalesSummary, AppError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;
        self.summarize(&event).await
    }

    async fn summarize(&self, event: &Event) -> Result<EventSalesSummary, AppError> {
        let sold = self.store.count_purchased(event.id).await?;
        Ok(EventSalesSummary {
            event_id: event.id,
            event_name: event.name.clone(),
            total_tickets: sold,
            total_revenue: event.price * Decimal::from(sold),
        })
    }
}
