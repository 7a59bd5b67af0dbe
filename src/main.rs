use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kinfeed::auth::identity::FirebaseVerifier;
use kinfeed::config::{Cli, Config};
use kinfeed::db;
use kinfeed::feed::FeedService;
use kinfeed::routes;
use kinfeed::state::AppState;
use kinfeed::transcribe::WhisperClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let identity = FirebaseVerifier::new(&config.auth)?;
    let transcriber = WhisperClient::new(&config.transcription)?;
    if config.transcription.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; transcription requests will fail");
    }

    let state = AppState {
        config: config.clone(),
        feed: FeedService::sqlite(pool),
        identity: Arc::new(identity),
        transcriber: Arc::new(transcriber),
    };

    let app = routes::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
