use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Registered account. Owned by the registration collaborator; read here for display names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Self-registration payload. Credentials are handled by the gateway, not here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name is required".into()));
        }
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(AppError::ValidationError(format!(
                "'{email}' is not a valid email address"
            )));
        }
        Ok(())
    }

    /// Registered accounts always start with the `user` role.
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_ascii_lowercase(),
            role: Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    /// Every ticket the user ever bought, cancelled ones included.
    pub ticket_count: i64,
}

/// Identity attached to a request by the upstream authentication gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    /// User id recorded for actions taken without an authenticated identity.
    pub const ANONYMOUS_ID: i64 = 0;

    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: Self::ANONYMOUS_ID,
            role: Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "administrator privileges are required".into(),
            ))
        }
    }
}

/// Client details captured for the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

/// Everything a mutating operation needs to know about who asked and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Actor,
    pub client: ClientInfo,
}

impl RequestContext {
    pub fn new(actor: Actor, client: ClientInfo) -> Self {
        Self { actor, client }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse(" user "), Some(Role::User));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn test_require_admin() {
        assert!(Actor::new(1, Role::Admin).require_admin().is_ok());
        assert!(matches!(
            Actor::new(2, Role::User).require_admin(),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            name: " Dana ".into(),
            email: " Dana@Example.com ".into(),
        };
        assert!(ok.validate().is_ok());
        let user = ok.into_new_user();
        assert_eq!(user.name, "Dana");
        assert_eq!(user.email, "dana@example.com");
        assert_eq!(user.role, Role::User);

        for (name, email) in [("", "a@b.io"), ("Dana", "dana"), ("Dana", "@b.io"), ("Dana", "a@b")] {
            let request = RegisterRequest {
                name: name.into(),
                email: email.into(),
            };
            assert!(matches!(
                request.validate(),
                Err(AppError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_anonymous_actor_uses_zero_id() {
        assert_eq!(Actor::anonymous().user_id, 0);
        assert!(!Actor::anonymous().is_admin());
    }
}
