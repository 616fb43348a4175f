use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use spool_config::{Config, ConfigLoad, ConfigLoader};
use spool_server::{
    create_app,
    infra::{
        flush::{LoggingFlushHandler, run_flush_worker, worker},
        startup::Collaborators,
    },
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "info,spool_core=info,spool_server=info,tower_http=warn";

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "spool-server")]
#[command(
    about = "Buffers ingestion events per entity and schedules deduplicated flush jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file to load before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drain scheduled flush jobs and log each buffer, then exit
    Flush {
        /// Keep polling at this interval (seconds) until interrupted
        #[arg(long)]
        poll_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    match cli.command {
        Some(Command::Flush { poll_secs }) => {
            run_flush(&config, poll_secs.map(Duration::from_secs)).await
        }
        None => run_server(config).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let collaborators = Collaborators::connect(&config).await;
    let state = collaborators.app_state(&config);
    let router = create_app(state);

    let addr = config.bind_address();
    info!(
        backend = collaborators.backend.as_str(),
        buffer_ttl_secs = config.ingestion.buffer_ttl.as_secs(),
        "Starting Spool ingestion server on {}:{}",
        config.server.host,
        config.server.port
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn run_flush(config: &Config, poll: Option<Duration>) -> anyhow::Result<()> {
    if config.redis.is_none() {
        anyhow::bail!(
            "the flush worker needs REDIS_URL; in-memory buffers live only inside a running server"
        );
    }

    let collaborators = Collaborators::connect(config).await;
    let worker = worker(&collaborators)?;
    run_flush_worker(&worker, &LoggingFlushHandler, poll).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_parses() {
        assert!(
            tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok()
        );
    }

    #[test]
    fn flush_subcommand_accepts_poll_interval() {
        let cli = Cli::try_parse_from(["spool-server", "flush", "--poll-secs", "5"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Some(Command::Flush { poll_secs: Some(5) })
        ));
    }
}
