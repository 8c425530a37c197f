//! Session extraction and role checks.
//!
//! Handlers take [`AuthUser`] or [`AdminUser`] as an argument; the extractor rejects the
//! request before the handler runs. The session token is read from the `token` cookie
//! and, failing that, from an `Authorization: Bearer <token>` header.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tower_cookies::Cookies;

use crate::accounts;
use crate::credentials::decode_token;
use crate::error::AppError;
use crate::state::AppState;
use crate::types::{Role, User};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn session_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    if let Ok(cookies) = Cookies::from_request_parts(parts, state).await {
        if let Some(c) = cookies.get(SESSION_COOKIE) {
            if !c.value().is_empty() {
                return Some(c.value().to_string());
            }
        }
    }
    bearer_token(parts)
}

/// A logged-in user whose account still exists.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, state)
            .await
            .ok_or_else(|| AppError::Unauthorized("User is not logged in.".to_string()))?;
        let claims = decode_token(&token, &state.config.auth.jwt_secret)?;
        let user = accounts::find_by_id(&state.db, &claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User is not logged in.".to_string()))?;
        Ok(AuthUser(user))
    }
}

/// A logged-in user with the `Admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden(format!(
                "Role: {} is not allowed to access this resource",
                user.role.as_str()
            )));
        }
        Ok(AdminUser(user))
    }
}
