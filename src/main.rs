use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scratchpost::auth::password;
use scratchpost::cli::{self, UserCommands};
use scratchpost::config::{self, AuthScheme, Config, StorageBackend};
use scratchpost::models::user::NewUser;
use scratchpost::models::COLLECTIONS;
use scratchpost::store::postgres::PgStore;
use scratchpost::store::UserStore;
use scratchpost::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "scratchpost=debug,tower_http=debug".into()),
    );
    let json_logs = std::env::var("SCRATCHPOST_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port, jwt }) => run_server(cfg, port, jwt).await,
        Some(cli::Commands::User { command }) => handle_user_command(cfg, command).await,
        Some(cli::Commands::Migrate) => {
            let db = connect(&cfg).await?;
            tracing::info!("migrations applied");
            drop(db);
            Ok(())
        }
        None => run_server(cfg, None, false).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(mut cfg: Config, port: Option<u16>, jwt: bool) -> anyhow::Result<()> {
    if let Some(port) = port {
        cfg.port = port;
    }
    if jwt {
        cfg.auth = AuthScheme::Jwt;
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let cleanup_every = cfg.cleanup_interval;

    let state = Arc::new(AppState::build(cfg).await?);
    state.bootstrap_admin().await?;

    let cleanup = state.authorizer.start_periodic_cleanup(cleanup_every);
    tracing::info!(
        scheme = state.authorizer.scheme(),
        every_secs = cleanup_every.as_secs(),
        "token cleanup job started"
    );

    let app = api::app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("scratchpost listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn connect(cfg: &Config) -> anyhow::Result<PgStore> {
    if cfg.storage != StorageBackend::Postgres {
        anyhow::bail!("this command needs SCRATCHPOST_STORAGE=postgres");
    }
    let db = PgStore::connect(&cfg.database_url, cfg.db_max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    db.migrate().await.context("running migrations")?;
    db.ensure_indexes(&COLLECTIONS).await.context("creating unique indexes")?;
    Ok(db)
}

async fn handle_user_command(cfg: Config, cmd: UserCommands) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create {
            username,
            name,
            email,
            password,
        } => {
            let db = connect(&cfg).await?;
            let user = NewUser {
                username,
                name,
                email,
                password,
            };
            user.validate()?;
            let hash = password::hash_password(&user.password)?;
            db.create_user(&user, &hash)
                .await
                .with_context(|| format!("creating user '{}'", user.username))?;
            println!("Created user: {}", user.username);
        }
    }
    Ok(())
}
