use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::pii::Masked;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub flight_title: String,
    pub departure_time: DateTime<Utc>,
    pub launch_site: String,
    pub passenger_name: String,
    pub passenger_phone: Masked<String>,
    pub pilot_name: String,
    pub pilot_phone: Masked<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCanceledEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub flight_title: String,
    pub departure_time: DateTime<Utc>,
    pub passenger_phone: Masked<String>,
    pub refunded: bool,
    pub canceled_by: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct FlightCanceledEvent {
    pub flight_id: Uuid,
    pub flight_title: String,
    pub departure_time: DateTime<Utc>,
    pub passenger_phones: Vec<Masked<String>>,
    pub timestamp: i64,
}
