//! Account domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use ryangel_core::{AdminId, ClientId, Email, Phone};

/// A shopper account.
///
/// A client registered by phone starts inactive and is activated by its first
/// verified OTP. Clients created through Google sign-in are active at once.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub phone: Option<Phone>,
    pub username: Option<String>,
    pub email: Option<Email>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub google_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A back-office account.
#[derive(Debug, Clone, Serialize)]
pub struct Admin {
    pub id: AdminId,
    pub username: String,
    pub email: Email,
    #[serde(skip)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
