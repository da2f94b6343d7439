use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::state::AppState;

pub const OTP_DIGITS: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub id: String,
    pub display_name: Option<String>,
}

/// Registers a new identity and issues its pickup OTP. The code is fixed for
/// the lifetime of the identity.
pub fn register_identity(state: &AppState, registration: Registration) -> Result<Identity, AppError> {
    let id = registration.id.trim().to_string();
    if id.is_empty() {
        return Err(AppError::BadRequest("identity id cannot be empty".to_string()));
    }

    let identity = Identity {
        id,
        otp: generate_otp(),
        verified: false,
        display_name: registration
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        created_at: Utc::now(),
    };

    let identity = state.store.register_identity(identity)?;
    info!(identity_id = %identity.id, "identity registered");
    Ok(identity)
}

pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{code:0width$}", width = OTP_DIGITS)
}
