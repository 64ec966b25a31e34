use gondola_core::{BookingStatus, CoreError};

/// Allowed moves of the booking state machine
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    matches!(
        (from, to),
        (BookingStatus::Pending, BookingStatus::Confirmed)
            | (BookingStatus::Pending, BookingStatus::Canceled)
            | (BookingStatus::Confirmed, BookingStatus::Canceled)
    )
}

pub fn ensure_transition(from: BookingStatus, to: BookingStatus) -> Result<(), BookingError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from, to })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Flight is not open for booking: {0}")]
    FlightClosed(String),

    #[error("Pilot cannot take bookings: {0}")]
    PilotUnavailable(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error(transparent)]
    Store(#[from] CoreError),
}
