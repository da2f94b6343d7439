use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::identity::Session;
use crate::state::AppState;

pub const IDENTITY_HEADER: &str = "x-identity-id";

/// Caller identity taken from the `x-identity-id` header. Requests without a
/// registered identity are rejected before the handler runs.
pub struct CurrentSession(pub Session);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let identity_id = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::IdentityMissing)?;

        state.store.session(identity_id).map(CurrentSession)
    }
}
