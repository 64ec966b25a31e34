pub mod availability;
pub mod schedule;

pub use availability::{Availability, FlightListing};
pub use schedule::{FlightDraft, ScheduleLimits};
