use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// Tickets are born `Purchased`; `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Purchased,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Purchased => "purchased",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchased" => Ok(TicketStatus::Purchased),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(AppError::InternalServerError(format!(
                "unknown ticket status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub status: TicketStatus,
    pub purchased_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn cancelled(&self, at: DateTime<Utc>) -> Ticket {
        Ticket {
            status: TicketStatus::Cancelled,
            updated_at: at,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub user_id: i64,
    pub event_id: i64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub event_id: i64,
}
