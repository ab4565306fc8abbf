use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use mamba_chat::config::{Cli, Config};
use mamba_chat::engine::generate::{Generator, LlamaGenerator};
use mamba_chat::model::cache::ModelCache;
use mamba_chat::server::routes::{build_router, AppState};
use mamba_chat::server::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "mamba_chat=debug,tower_http=debug"
    } else {
        "mamba_chat=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("mamba-chat v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    let listen_addr = cli.listen.unwrap_or_else(|| config.server.listen.clone());
    let config = Arc::new(config);

    info!(
        repo_id = config.model.repo_id,
        filename = config.model.filename,
        context_size = config.model.context_size,
        n_gpu_layers = config.model.n_gpu_layers,
        max_tokens = config.generation.max_tokens,
        "Configuration loaded"
    );

    // Load the model before accepting any input; a failure here is fatal
    // and the process exits without ever serving a session.
    let cache = ModelCache::new();
    let model = match cache.get(&config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(retryable = e.is_retryable(), "Failed to load model: {e}");
            anyhow::bail!("model initialization failed: {e}");
        }
    };

    info!(model_id = model.model_id(), "Model loaded successfully");

    // Build application state.
    let generator: Arc<dyn Generator> = Arc::new(LlamaGenerator::new(Arc::clone(&model)));
    let state = Arc::new(AppState {
        config,
        model,
        generator,
        sessions: SessionStore::new(),
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
