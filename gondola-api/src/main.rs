use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use gondola_api::{app, password::hash_password, state::AuthConfig, worker, AppState};
use gondola_booking::{BookingDesk, CheckoutOrchestrator, LogSmsSender, MockPaymentProvider, Notifier};
use gondola_catalog::ScheduleLimits;
use gondola_core::payment::PaymentProvider;
use gondola_core::sms::SmsSender;
use gondola_core::Store;
use gondola_store::app_config::{Config, PaymentBackend, SmsBackend, StorageBackend};
use gondola_store::{DbClient, MemoryStore, PgStore, RedisClient, StripeClient, TwilioClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gondola_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Gondola API on port {}", config.server.port);

    let store = open_store(&config).await?;
    let payments = payment_provider(&config)?;
    let sms = sms_sender(&config)?;

    // Redis Connection, optional
    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to configure Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured, login rate limiting disabled");
            None
        }
    };

    bootstrap_admin(&config, store.as_ref()).await?;

    let pending_hold = chrono::Duration::minutes(config.booking.pending_hold_minutes);
    let desk = Arc::new(BookingDesk::new(
        store.clone(),
        CheckoutOrchestrator::new(payments, config.server.public_base_url.clone()).with_checkout_ttl(pending_hold),
        Notifier::new(sms),
        config.platform.default_fee_bps,
    ));

    tokio::spawn(worker::start_expiry_worker(
        desk.clone(),
        store.clone(),
        pending_hold,
        std::time::Duration::from_secs(config.booking.sweep_interval_seconds.max(1)),
    ));

    let app_state = AppState {
        store,
        desk,
        redis,
        auth: AuthConfig::from_config(&config),
        limits: ScheduleLimits {
            max_passengers: config.platform.max_passengers,
            max_duration_minutes: config.platform.max_duration_minutes,
        },
        default_currency: config.platform.currency.to_ascii_uppercase(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok(Arc::new(PgStore::new(db.pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn payment_provider(config: &Config) -> anyhow::Result<Arc<dyn PaymentProvider>> {
    match config.payments.provider {
        PaymentBackend::Stripe => {
            let key = config
                .payments
                .stripe_secret_key
                .as_deref()
                .context("payments.stripe_secret_key is required for the stripe provider")?;
            Ok(Arc::new(StripeClient::new(&config.payments.stripe_api_base, key)))
        }
        PaymentBackend::Mock => {
            tracing::warn!("Using mock payment provider, every checkout counts as paid");
            Ok(Arc::new(MockPaymentProvider::new(config.server.public_base_url.clone())))
        }
    }
}

fn sms_sender(config: &Config) -> anyhow::Result<Arc<dyn SmsSender>> {
    match config.sms.provider {
        SmsBackend::Twilio => {
            let sms = &config.sms;
            let (Some(sid), Some(token), Some(from)) =
                (sms.account_sid.as_deref(), sms.auth_token.as_deref(), sms.from_number.as_deref())
            else {
                anyhow::bail!("sms.account_sid, sms.auth_token and sms.from_number are required for twilio");
            };
            Ok(Arc::new(TwilioClient::new(&sms.twilio_api_base, sid, token, from)))
        }
        SmsBackend::Log => Ok(Arc::new(LogSmsSender)),
    }
}

/// Create the configured admin account unless it already exists.
async fn bootstrap_admin(config: &Config, store: &dyn Store) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (config.admin.email.as_deref(), config.admin.password.as_deref()) else {
        return Ok(());
    };
    if store.find_admin_by_email(email).await?.is_some() {
        return Ok(());
    }

    let hash = hash_password(password).await.map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let admin = store.create_admin(email, &hash).await?;
    tracing::info!("Bootstrap admin {} created", admin.id);
    Ok(())
}
