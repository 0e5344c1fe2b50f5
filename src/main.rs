use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attendance_api::config::{self, AppConfig, Environment};
use attendance_api::database::{DatabaseManager, PgStore, Stores};
use attendance_api::otp::{InMemoryOtpStore, OtpStore, PgOtpStore};
use attendance_api::sms::{ConsoleSms, SmsGateway, TwilioSms};
use attendance_api::storage::{MemoryStorage, ObjectStorage, SpacesStorage};
use attendance_api::{build_router, AppState};

#[derive(Parser)]
#[command(name = "attendance-api")]
#[command(about = "School attendance and lesson plan review API")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (overrides PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Keep all records and OTPs in memory instead of Postgres")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config = config::config().clone();
    if let Err(problem) = config.validate() {
        bail!("invalid configuration: {}", problem);
    }
    info!("Starting attendance API in {:?} mode", config.environment);

    let sms = sms_gateway(&config)?;
    let storage = object_storage(&config)?;

    let state = if args.in_memory {
        warn!("Using in-memory stores; all data is lost on exit");
        AppState::new(config.clone(), Arc::new(InMemoryOtpStore::new()), sms, Stores::in_memory(), storage)?
    } else {
        let database = DatabaseManager::connect(&config.database)
            .await
            .context("connecting to database")?;
        let otp_store: Arc<dyn OtpStore> = Arc::new(PgOtpStore::new(database.pool()));
        let stores = Stores::postgres(PgStore::new(database.pool()));
        AppState::new(config.clone(), otp_store, sms, stores, storage)?.with_database(database)
    };

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Attendance API listening on http://{}", bind_addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

fn sms_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn SmsGateway>> {
    if config.sms.has_credentials() {
        return Ok(Arc::new(TwilioSms::from_config(&config.sms)?));
    }
    if config.environment == Environment::Production {
        bail!("Twilio credentials are required in production");
    }
    warn!("Twilio credentials missing; OTP messages are logged instead of sent");
    Ok(Arc::new(ConsoleSms))
}

fn object_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    if config.storage.has_credentials() {
        return Ok(Arc::new(SpacesStorage::from_config(&config.storage)?));
    }
    if config.environment == Environment::Production {
        bail!("Spaces credentials are required in production");
    }
    warn!("Spaces credentials missing; lesson plan images are kept in memory");
    Ok(Arc::new(MemoryStorage::new()))
}
