use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;
use crate::utils::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    View,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::View => "view",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "login" => Ok(AuditAction::Login),
            "logout" => Ok(AuditAction::Logout),
            "view" => Ok(AuditAction::View),
            other => Err(AppError::ValidationError(format!(
                "unknown audit action '{other}'"
            ))),
        }
    }
}

/// Entity tags used by the services in this crate. The column itself is free-form.
pub mod entity {
    pub const EVENT: &str = "event";
    pub const TICKET: &str = "ticket";
    pub const USER: &str = "user";
}

/// One persisted, append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: i64,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: i64,
    pub old_value: String,
    pub new_value: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Audit row before the store assigns its id. Snapshots are already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLog {
    pub user_id: i64,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: i64,
    pub old_value: String,
    pub new_value: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Audit row as returned to readers, with the actor's name looked up at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub log: AuditLog,
    pub user_name: Option<String>,
}

/// Filters combine with AND; `None` means "don't filter on this field".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub pagination: Pagination,
    pub user_id: Option<i64>,
    pub entity_type: Option<String>,
    pub action: Option<AuditAction>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.user_id.map_or(true, |id| log.user_id == id)
            && self
                .entity_type
                .as_deref()
                .map_or(true, |t| log.entity_type == t)
            && self.action.map_or(true, |a| log.action == a)
            && self.start.map_or(true, |s| log.created_at >= s)
            && self.end.map_or(true, |e| log.created_at <= e)
    }
}
