use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Booking lifecycle: `Pending -> Confirmed -> Canceled`, or `Pending -> Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
        }
    }

    /// Live bookings occupy a seat.
    pub fn is_live(&self) -> bool {
        !matches!(self, BookingStatus::Canceled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "canceled" => Ok(BookingStatus::Canceled),
            other => Err(CoreError::InternalError(format!("unknown booking status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub passenger_id: Uuid,
    pub status: BookingStatus,
    pub paid: bool,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub pilot_payout_cents: i64,
    pub currency: String,
    pub checkout_session_id: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Booking to insert; the amounts are frozen at checkout time.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub flight_id: Uuid,
    pub passenger_id: Uuid,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub pilot_payout_cents: i64,
    pub currency: String,
}

impl NewBooking {
    pub fn into_pending(self, now: DateTime<Utc>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            flight_id: self.flight_id,
            passenger_id: self.passenger_id,
            status: BookingStatus::Pending,
            paid: false,
            amount_cents: self.amount_cents,
            platform_fee_cents: self.platform_fee_cents,
            pilot_payout_cents: self.pilot_payout_cents,
            currency: self.currency,
            checkout_session_id: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
            canceled_at: None,
        }
    }
}
