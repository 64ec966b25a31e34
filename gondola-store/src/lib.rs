pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg_store;
pub mod redis_repo;
pub mod stripe;
pub mod twilio;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_store::PgStore;
pub use redis_repo::RedisClient;
pub use stripe::StripeClient;
pub use twilio::TwilioClient;
