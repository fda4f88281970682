use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Local account. Job-board tokens are stored here after the OAuth callback
/// and whenever the client reports a refreshed pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub hh_user_id: Option<String>,
    #[serde(skip_serializing)]
    pub hh_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub hh_refresh_token: Option<String>,
    pub hh_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            hh_user_id: None,
            hh_access_token: None,
            hh_refresh_token: None,
            hh_token_expires_at: None,
            created_at: Utc::now(),
        }
    }
}
