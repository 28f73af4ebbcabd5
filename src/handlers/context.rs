//! Request identity as forwarded by the authentication gateway.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap};

use crate::models::{Actor, ClientInfo, RequestContext, Role};
use crate::utils::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Reads the gateway identity headers. `Ok(None)` when no identity was forwarded; a
/// malformed id or role is rejected rather than downgraded.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, AppError> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::AuthError(format!("invalid {USER_ID_HEADER} header")))?;

    let role = match headers.get(USER_ROLE_HEADER) {
        None => Role::User,
        Some(raw) => raw
            .to_str()
            .ok()
            .and_then(Role::parse)
            .ok_or_else(|| AppError::AuthError(format!("invalid {USER_ROLE_HEADER} header")))?,
    };

    Ok(Some(Actor::new(user_id, role)))
}

pub fn client_info(headers: &HeaderMap, extensions: &Extensions) -> ClientInfo {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    let ip_address = forwarded
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default();

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    ClientInfo {
        ip_address,
        user_agent,
    }
}

/// Requires an authenticated caller.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?.ok_or_else(|| {
            AppError::AuthError(format!("missing {USER_ID_HEADER} header"))
        })?;
        Ok(RequestContext::new(
            actor,
            client_info(&parts.headers, &parts.extensions),
        ))
    }
}

/// Request context for routes open to anonymous callers. A malformed identity is still
/// rejected.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?.unwrap_or_else(Actor::anonymous);
        Ok(Caller(RequestContext::new(
            actor,
            client_info(&parts.headers, &parts.extensions),
        )))
    }
}
