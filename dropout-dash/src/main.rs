//! dropout-dash - student dropout dashboard service
//!
//! Loads the student dataset and the dropout model once, then serves the
//! analytics dashboard and single-student predictions over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use dropout_common::config::{
    load_toml_config, resolve_config_path, Overrides, TomlConfig, BIND_ENV_VAR, CONFIG_ENV_VAR,
    DATA_PATH_ENV_VAR, MODEL_DIR_ENV_VAR, PORT_ENV_VAR,
};
use dropout_common::pipeline::PipelineSettings;
use dropout_dash::resources::{DatasetCache, ModelHandle};
use dropout_dash::{build_router, AppState};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments; each one wins over its environment variable and the TOML file
#[derive(Debug, Parser)]
#[command(name = "dropout-dash", version, about = "Student dropout dashboard")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = PORT_ENV_VAR)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = BIND_ENV_VAR)]
    bind: Option<String>,

    /// Semicolon-delimited dataset file
    #[arg(long, env = DATA_PATH_ENV_VAR)]
    data: Option<PathBuf>,

    /// Directory holding the model artifact
    #[arg(long, env = MODEL_DIR_ENV_VAR)]
    model_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level comes from the config file, so read it before tracing starts
    let config_path = resolve_config_path(args.config.as_deref());
    let file_config = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file_config.logging.level)),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting dropout-dash v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => warn!("No config directory on this platform, using defaults"),
    }

    let config = file_config.resolve(Overrides {
        port: args.port,
        bind_address: args.bind,
        data_path: args.data,
        model_dir: args.model_dir,
    });

    let classes = config
        .classes
        .to_mapping()
        .context("Invalid [classes] configuration")?;
    let settings = PipelineSettings {
        classes,
        top_features: config.top_features,
    };

    info!(
        "Model: {}/{}.{{json,toml}}",
        config.model_dir.display(),
        config.model_stem
    );
    let model = ModelHandle::load(&config.model_dir, &config.model_stem, &settings.classes);

    info!("Dataset: {}", config.data_path.display());
    let dataset = DatasetCache::load(config.data_path.clone()).await;

    let state = AppState::new(model, dataset, settings);
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("dropout-dash listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
