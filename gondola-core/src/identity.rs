use chrono::{DateTime, Utc};
use gondola_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Marketplace roles. Each role has its own account table; a session is bound
/// to exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pilot,
    Passenger,
    Meister,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pilot => "pilot",
            Role::Passenger => "passenger",
            Role::Meister => "meister",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pilot" => Ok(Role::Pilot),
            "passenger" => Ok(Role::Passenger),
            "meister" => Ok(Role::Meister),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::ValidationError(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pilot {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub license_number: String,
    pub balloon_registration: Option<String>,
    pub payout_account_id: Option<String>,
    pub approved: bool,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Pilot {
    /// Approved and not blocked: may publish flights and receive bookings.
    pub fn is_active(&self) -> bool {
        self.approved && !self.blocked
    }
}

#[derive(Debug, Clone)]
pub struct NewPilot {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub license_number: String,
    pub balloon_registration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PilotProfileUpdate {
    pub phone: Option<String>,
    pub license_number: Option<String>,
    pub balloon_registration: Option<String>,
    pub payout_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Passenger {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPassenger {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meister {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub organization: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMeister {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub organization: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Admin {
    pub id: Uuid,
    pub email: Masked<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Server-side session. Only the SHA-256 hash of the cookie token is kept.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub token_hash: String,
    pub account_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
