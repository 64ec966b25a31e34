pub mod desk;
pub mod finance;
pub mod lifecycle;
pub mod notify;
pub mod orchestrator;

pub use desk::{BookingDesk, CancelActor, CancelOutcome, ReservedBooking};
pub use finance::{FeeSplit, PayoutSummary};
pub use lifecycle::BookingError;
pub use notify::{LogSmsSender, Notifier, RecordingSmsSender};
pub use orchestrator::{CheckoutOrchestrator, MockPaymentProvider};
