//! CRM Bridge - Main Entry Point

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_bridge_backend::{
    api::{self, AppState},
    cli::{run_sync, SyncArgs},
    config::Config,
    db,
    error::Result,
    services::sync_service::SyncService,
    services::sync_worker::{spawn_sync_worker, sync_channel, WorkerRetryPolicy},
    store::{postgres::PgStore, SyncStore},
};

#[derive(Parser, Debug)]
#[command(name = "crm-bridge-backend", version, about = "CRM bridge backend server and sync CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize data with EspoCRM
    Sync(SyncArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_bridge_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Sync(args)) => run_sync(args).await,
        None => match run_server().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "Server terminated with error");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_server() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting CRM Bridge");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Wire the sync subsystem: store, engine, dispatch worker
    let store: Arc<dyn SyncStore> = Arc::new(PgStore::new(db_pool));
    let sync = Arc::new(SyncService::new(store.clone()));
    let (dispatcher, task_rx) = sync_channel();
    let _worker = spawn_sync_worker(
        sync.clone(),
        task_rx,
        WorkerRetryPolicy {
            max_retries: config.sync_max_retries,
            initial_delay_ms: config.sync_retry_delay_ms,
        },
    );

    // Create application state and router
    let state = Arc::new(AppState::new(config.clone(), store, sync, dispatcher));
    let app = api::routes::create_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
