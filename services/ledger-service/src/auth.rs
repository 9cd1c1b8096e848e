use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{ApiError, AppState, unauthorized};

const ADMIN_ROLE: &str = "ledger-admin";

#[derive(Debug, Deserialize)]
struct AdminClaims {
    sub: String,
    roles: Option<Vec<String>>,
    role: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AdminPrincipal {
    pub(crate) user_id: String,
}

/// Bearer-JWT guard for administrative operations: schedule writes,
/// credits, withdrawal decisions, rate refresh. Requires the
/// `ledger-admin` role in the token claims.
pub(crate) fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    operation: &str,
) -> Result<AdminPrincipal, ApiError> {
    let Some(secret) = state.admin_jwt_secret.as_deref() else {
        warn!("{operation}: denied, admin auth is not configured");
        return Err(unauthorized("admin auth is not configured"));
    };

    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            warn!("{operation}: denied, missing bearer token");
            unauthorized("missing bearer token")
        })?;

    let decoded = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|err| {
        warn!("{operation}: denied, invalid token: {err}");
        unauthorized("invalid token")
    })?;

    let claims = decoded.claims;
    let mut roles = claims.roles.unwrap_or_default();
    if let Some(role) = claims.role {
        roles.push(role);
    }

    if !roles.iter().any(|role| role == ADMIN_ROLE) {
        warn!("{operation}: denied for {}, missing {ADMIN_ROLE} role", claims.sub);
        return Err(unauthorized("admin access denied"));
    }

    info!("{operation}: admin access granted to {}", claims.sub);
    Ok(AdminPrincipal {
        user_id: claims.sub,
    })
}
