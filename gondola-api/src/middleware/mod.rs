pub mod rate_limit;
pub mod session;

pub use rate_limit::login_rate_limit;
pub use session::{
    authenticate, require_admin, require_meister, require_passenger, require_pilot, Principal,
};
