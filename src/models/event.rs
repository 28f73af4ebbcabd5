use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Ongoing,
    Finished,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "ongoing" => Ok(EventStatus::Ongoing),
            "finished" => Ok(EventStatus::Finished),
            other => Err(AppError::InternalServerError(format!(
                "unknown event status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: Decimal,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now
    }
}

/// Administrator-supplied event fields, used for both creation and full replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: Decimal,
    #[serde(default)]
    pub status: Option<EventStatus>,
}

impl EventDraft {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("event name is required".into()));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::ValidationError(
                "event location is required".into(),
            ));
        }
        if self.capacity <= 0 {
            return Err(AppError::ValidationError(
                "event capacity must be positive".into(),
            ));
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "event price cannot be negative".into(),
            ));
        }
        if self.start_date <= now {
            return Err(AppError::ValidationError(
                "event start date must be in the future".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(AppError::ValidationError(
                "event end date must not be before start date".into(),
            ));
        }
        Ok(())
    }

    /// Record ready for insertion; status defaults to `active`.
    pub fn into_new_event(self) -> NewEvent {
        NewEvent {
            name: self.name.trim().to_string(),
            description: self.description,
            location: self.location.trim().to_string(),
            start_date: self.start_date,
            end_date: self.end_date,
            capacity: self.capacity,
            price: self.price,
            status: self.status.unwrap_or(EventStatus::Active),
        }
    }

    /// Replaces every mutable field of `current`, keeping its status when none is given.
    pub fn apply_to(&self, current: &Event, now: DateTime<Utc>) -> Event {
        Event {
            id: current.id,
            name: self.name.trim().to_string(),
            description: self.description.clone(),
            location: self.location.trim().to_string(),
            start_date: self.start_date,
            end_date: self.end_date,
            capacity: self.capacity,
            price: self.price,
            status: self.status.unwrap_or(current.status),
            created_at: current.created_at,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub location: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub capacity: i32,
    pub price: Decimal,
    pub status: EventStatus,
}
