//! Jobtrack authentication API server.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use jobtrack_core::cache::TokenStore;
use jobtrack_core::cache::redis::RedisTokenStore;
use jobtrack_core::notify::LogNotifier;
use jobtrack_core::oauth::{GoogleConfig, GoogleProvider};
use jobtrack_core::store::postgres::PgCredentialStore;
use jobtrack_core::sync::DistributedLock;
use jobtrack_core::{SessionConfig, SessionService};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// How refresh rotation is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LockBackend {
    /// In-process only.
    Local,
    /// In-process plus a Redis lock shared by every instance.
    Redis,
}

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "jobtrack_server", about = "Jobtrack authentication API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:4000")]
    bind: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/jobtrack"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Redis URL for the token blacklist, single-use tokens and locks.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Refresh-rotation lock backend.
    #[arg(long, env = "LOCK_BACKEND", value_enum, default_value_t = LockBackend::Local)]
    lock_backend: LockBackend,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobtrack_api=debug,jobtrack_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    // Refuse to start without signing secrets.
    let config = SessionConfig::from_env()?;

    info!(bind = %args.bind, lock_backend = ?args.lock_backend, "starting jobtrack_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    jobtrack_core::migrate::migrate(&pool).await?;

    let tokens: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::connect(&args.redis_url).await?);

    let mut session = SessionService::new(
        config,
        Arc::new(PgCredentialStore::new(pool)),
        Arc::clone(&tokens),
        Arc::new(LogNotifier),
    );
    if args.lock_backend == LockBackend::Redis {
        session = session.with_distributed_lock(DistributedLock::new(Arc::clone(&tokens)));
    }
    match GoogleConfig::from_env() {
        Some(google) => {
            info!("google sign-in enabled");
            session = session.with_oauth_provider(Arc::new(GoogleProvider::new(google)));
        }
        None => warn!("GOOGLE_CLIENT_ID/SECRET/CALLBACK_URL not set; google sign-in disabled"),
    }

    let app = jobtrack_api::router(jobtrack_api::AppState::new(session));

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
