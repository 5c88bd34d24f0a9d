use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use sos_core::Identity;

use crate::{error::AppError, state::AppState, utils::bearer_token};

/// Caller identity from the bearer token. Handlers taking this are auth-only.
pub struct AuthUser(pub Identity);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let identity = state
            .sessions
            .resolve_session(token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(Self(identity))
    }
}
