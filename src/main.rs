use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use knob_gallery_server::config::{AppConfig, CliConfig, FileConfig, SettingsStore};
use knob_gallery_server::download_manager::HttpAssetFetcher;
use knob_gallery_server::gallery::WebKnobManSource;
use knob_gallery_server::{run_server, KnobGalleryService, ServerState, SqliteCatalogStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding catalog.db and settings.toml.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Root directory for downloaded knobs and thumbnails.
    #[clap(long, value_parser = parse_path)]
    pub download_dir: Option<PathBuf>,

    /// URL of the WebKnobMan gallery endpoint.
    #[clap(long)]
    pub gallery_url: Option<String>,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            download_dir: args.download_dir.clone(),
            gallery_url: args.gallery_url.clone(),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(&cli_args), file_config)?;

    info!(
        "Opening SQLite catalog database at {:?}...",
        config.catalog_db_path()
    );
    let catalog = Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);

    let settings = Arc::new(SettingsStore::new(
        config.download.clone(),
        Some(config.settings_path()),
    )?);
    info!("Downloading into {:?}", settings.get().download_dir);

    let source = Arc::new(WebKnobManSource::new(&config.gallery)?);
    let fetcher = Arc::new(HttpAssetFetcher::new(config.download.request_timeout_secs)?);
    let service = Arc::new(KnobGalleryService::start(
        catalog, source, fetcher, settings,
    )?);

    let result = run_server(
        ServerState::new(service.clone()),
        config.port,
        shutdown_signal(),
    )
    .await;

    service.shutdown();
    info!("Server stopped");
    result
}
