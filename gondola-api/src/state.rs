use std::sync::Arc;

use chrono::Duration;
use gondola_booking::BookingDesk;
use gondola_catalog::ScheduleLimits;
use gondola_core::Store;
use gondola_store::app_config::Config;
use gondola_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_ttl: Duration,
    pub secure_cookie: bool,
    pub login_attempts_per_minute: i64,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cookie_name: config.auth.cookie_name.clone(),
            session_ttl: Duration::hours(config.auth.session_ttl_hours),
            secure_cookie: config.auth.secure_cookie,
            login_attempts_per_minute: config.redis.login_attempts_per_minute,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "gondola_session".to_string(),
            session_ttl: Duration::hours(168),
            secure_cookie: false,
            login_attempts_per_minute: 10,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub desk: Arc<BookingDesk>,
    /// Login throttling is skipped without Redis
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub limits: ScheduleLimits,
    pub default_currency: String,
}
