// backupcenter/src/server/auth.rs
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::server::AppState;

fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
    {
        return Some(token.to_string());
    }
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Administrative-role gate. Every RPC method requires it; rejection happens
/// before any component is touched and leaks nothing about resources.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_token(parts) else {
            return Err(AppError::Forbidden);
        };
        let expected = state.admin_token.as_ref();
        if token.as_bytes().ct_eq(expected.as_bytes()).into() {
            Ok(RequireAdmin)
        } else {
            Err(AppError::Forbidden)
        }
    }
}
