use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub otp: String,
    pub verified: bool,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The identity a request acts as. Every lifecycle operation receives one
/// explicitly; there is no ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity_id: String,
}

impl Session {
    pub(crate) fn new(identity_id: String) -> Self {
        Self { identity_id }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }
}
