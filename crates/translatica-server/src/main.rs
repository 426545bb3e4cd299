//! Translatica Server - HTTP API for English to Spanish translation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use state::AppState;
use translatica_core::{
    DevicePreference, HistoryStore, ResourceManager, SqliteHistoryStore, TranslatorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "translatica-server", version, about = "English to Spanish translation API")]
struct Args {
    /// Address to bind
    #[arg(long, env = "TRANSLATICA_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "TRANSLATICA_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory containing config.json, model.safetensors and tokenizer files
    #[arg(long, env = "TRANSLATICA_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Compute device: auto, cpu or accelerator
    #[arg(long, env = "TRANSLATICA_DEVICE", default_value = "auto")]
    device: DevicePreference,

    /// Maximum source tokens, longer input is truncated
    #[arg(long)]
    max_input_length: Option<usize>,

    /// Maximum generated tokens
    #[arg(long)]
    max_output_length: Option<usize>,

    /// Beam width for generation
    #[arg(long)]
    num_beams: Option<usize>,

    /// Maximum concurrent translation requests
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 100)]
    max_concurrent: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    timeout: u64,

    /// Where translation history is stored
    #[arg(
        long,
        env = "TRANSLATICA_DATABASE_URL",
        default_value = "sqlite://data/translations.db?mode=rwc"
    )]
    database_url: String,

    /// Do not store translation history
    #[arg(long)]
    no_history: bool,
}

impl Args {
    fn translator_config(&self) -> TranslatorConfig {
        let mut config = TranslatorConfig {
            device: self.device,
            ..Default::default()
        };
        if let Some(dir) = &self.model_dir {
            config.artifact_dir = dir.clone();
        }
        if let Some(len) = self.max_input_length {
            config.max_input_length = len;
        }
        if let Some(len) = self.max_output_length {
            config.max_output_length = len;
        }
        if let Some(beams) = self.num_beams {
            config.beam_width = beams;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "translatica_server=debug,translatica_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Translatica Server");

    let config = args.translator_config();
    info!("Model directory: {:?}", config.artifact_dir);

    let manager = Arc::new(ResourceManager::new(config)?);

    info!("Loading translation model...");
    match manager.load().await {
        Ok(()) => info!("Model loaded successfully!"),
        Err(e) => error!("Model failed to load, serving without it: {}", e),
    }

    let history_store: Option<Arc<dyn HistoryStore>> = if args.no_history {
        info!("Translation history disabled");
        None
    } else {
        match SqliteHistoryStore::connect(&args.database_url).await {
            Ok(store) => {
                info!("Recording translation history to {}", args.database_url);
                Some(Arc::new(store) as Arc<dyn HistoryStore>)
            }
            Err(e) => {
                warn!("History database unavailable, continuing without it: {}", e);
                None
            }
        }
    };

    let state = AppState::new(
        manager.clone(),
        history_store,
        args.max_concurrent,
        Duration::from_secs(args.timeout),
    );
    let app = api::create_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    info!("Shutting down...");
    manager.unload().await;

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
