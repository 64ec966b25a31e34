use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    Scheduled,
    Canceled,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for FlightStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "canceled" => Ok(FlightStatus::Canceled),
            other => Err(CoreError::InternalError(format!("unknown flight status '{}'", other))),
        }
    }
}

/// A balloon ride offered by a pilot. Prices are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub pilot_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub launch_site: String,
    pub departure_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub currency: String,
    pub max_passengers: i32,
    pub status: FlightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flight {
    /// Open for new bookings at `now`.
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        self.status == FlightStatus::Scheduled && self.departure_time > now
    }
}

#[derive(Debug, Clone)]
pub struct NewFlight {
    pub pilot_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub launch_site: String,
    pub departure_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub currency: String,
    pub max_passengers: i32,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlightChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub launch_site: Option<String>,
    pub departure_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub price_cents: Option<i64>,
    pub max_passengers: Option<i32>,
}

impl FlightChanges {
    pub fn apply(&self, flight: &mut Flight) {
        if let Some(title) = &self.title {
            flight.title = title.clone();
        }
        if let Some(description) = &self.description {
            flight.description = Some(description.clone());
        }
        if let Some(site) = &self.launch_site {
            flight.launch_site = site.clone();
        }
        if let Some(departure) = self.departure_time {
            flight.departure_time = departure;
        }
        if let Some(duration) = self.duration_minutes {
            flight.duration_minutes = duration;
        }
        if let Some(price) = self.price_cents {
            flight.price_cents = price;
        }
        if let Some(max) = self.max_passengers {
            flight.max_passengers = max;
        }
    }
}

/// A flight together with its count of live (pending or confirmed) bookings.
#[derive(Debug, Clone)]
pub struct FlightLoad {
    pub flight: Flight,
    pub booked_seats: i64,
}
