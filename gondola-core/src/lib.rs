pub mod booking;
pub mod flight;
pub mod identity;
pub mod payment;
pub mod repository;
pub mod settings;
pub mod sms;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use flight::{Flight, FlightChanges, FlightLoad, FlightStatus, NewFlight};
pub use identity::{Admin, Meister, NewMeister, NewPassenger, NewPilot, Passenger, Pilot, PilotProfileUpdate, Role, Session};
pub use repository::Store;
pub use settings::PlatformSettings;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Flight {flight_id} is fully booked ({max_passengers} seats)")]
    CapacityExceeded {
        flight_id: uuid::Uuid,
        max_passengers: i32,
    },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
