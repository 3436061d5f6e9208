use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use chatline_api::ai::{self, CompletionClient, GroqClient};
use chatline_api::app;
use chatline_api::config::Config;
use chatline_api::media::{CloudinaryStore, LocalDiskStore, MediaStore};
use chatline_api::state::{AppState, AppStateInner};
use chatline_api::tokens::TokenIssuer;
use chatline_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatline=debug,chatline_api=debug,chatline_gateway=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = chatline_db::Database::open(&config.db_path)?;
    ai::seed_assistant(&db, config.assistant_id)?;

    let media: Arc<dyn MediaStore> = match config.cloudinary.clone() {
        Some(cloudinary) => {
            info!("Uploading images to Cloudinary cloud '{}'", cloudinary.cloud_name);
            Arc::new(CloudinaryStore::new(cloudinary)?)
        }
        None => Arc::new(LocalDiskStore::new(config.upload_dir.clone(), config.public_url.clone()).await?),
    };

    let assistant: Option<Arc<dyn CompletionClient>> = match config.groq.clone() {
        Some(groq) => Some(Arc::new(GroqClient::new(groq)?)),
        None => {
            warn!("GROQ_API_KEY not set, assistant chat will answer 503");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        tokens: TokenIssuer::new(&config),
        media,
        assistant,
        config,
    });

    let router = app::router(state);

    info!("Chatline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
