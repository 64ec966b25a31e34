use gondola_core::{Flight, FlightLoad};
use serde::Serialize;

/// Seat counts for one flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub capacity: i64,
    pub booked: i64,
    pub remaining: i64,
}

impl Availability {
    pub fn new(capacity: i32, booked: i64) -> Self {
        let capacity = i64::from(capacity);
        Self {
            capacity,
            booked,
            remaining: (capacity - booked).max(0),
        }
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining == 0
    }

    /// Share of seats taken, 0.0..=1.0
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.booked.min(self.capacity) as f64) / (self.capacity as f64)
    }
}

impl From<&FlightLoad> for Availability {
    fn from(load: &FlightLoad) -> Self {
        Availability::new(load.flight.max_passengers, load.booked_seats)
    }
}

/// Public view of a flight with its seat counts
#[derive(Debug, Clone, Serialize)]
pub struct FlightListing {
    #[serde(flatten)]
    pub flight: Flight,
    pub seats_booked: i64,
    pub seats_left: i64,
    pub sold_out: bool,
}

impl From<FlightLoad> for FlightListing {
    fn from(load: FlightLoad) -> Self {
        let availability = Availability::from(&load);
        Self {
            flight: load.flight,
            seats_booked: availability.booked,
            seats_left: availability.remaining,
            sold_out: availability.is_sold_out(),
        }
    }
}
