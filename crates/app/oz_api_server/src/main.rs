//! Oz API server binary.

use std::sync::Arc;

use clap::Parser;
use oz_api::config::{ApiConfig, parse_flag};
use oz_core::auth::TokenDelivery;
use oz_core::store::{MemoryStore, PgStore};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "oz_api_server", about = "Oz authentication and chat API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost:5432/oz")]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep everything in process memory instead of PostgreSQL.
    ///
    /// Data is lost on exit. Intended for local runs and demos.
    #[arg(long, default_value_t = false)]
    memory_store: bool,

    /// How login and refresh hand out tokens: `body` or `cookie`.
    #[arg(long, env = "TOKEN_DELIVERY")]
    token_delivery: Option<TokenDelivery>,

    /// Mark auth cookies `Secure`.
    #[arg(long, env = "SECURE_COOKIE")]
    secure_cookie: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,oz_api=debug,oz_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.bind_addr = args.bind_addr.clone();
    config.database_url = args.database_url.clone();
    if let Some(mode) = args.token_delivery {
        config.auth.token_delivery = mode;
    }
    if let Some(secure) = args.secure_cookie.as_deref() {
        config.auth.secure_cookies = parse_flag(secure);
    }

    info!(
        bind_addr = %config.bind_addr,
        memory_store = args.memory_store,
        token_delivery = ?config.auth.token_delivery,
        "starting oz_api_server"
    );

    let state = if args.memory_store {
        warn!("using in-memory store: data will not survive a restart");
        oz_api::AppState::new(Arc::new(MemoryStore::new()), config.clone())
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        oz_api::migrate(&pool).await?;

        oz_api::AppState::new(Arc::new(PgStore::new(pool)), config.clone())
    };

    let app = oz_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
