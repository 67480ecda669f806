use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tally::adapters::{AccrualClient, PostgresStore};
use tally::config::AppConfig;
use tally::error::Result;
use tally::pipeline::{self, Pipeline, PipelineConfig, RetryPolicy};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tally", about = "Loyalty-points accrual reconciliation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation pipeline
    Run {
        /// PostgreSQL connection URI
        #[arg(short = 'd', long, env = "DATABASE_URI")]
        database_uri: Option<String>,
        /// Base address of the external accrual engine
        #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
        accrual_address: Option<String>,
    },
    /// Apply database migrations and exit
    Migrate {
        #[arg(short = 'd', long, env = "DATABASE_URI")]
        database_uri: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Migrate { database_uri }) => {
            init_logging();
            let config = load_config(database_uri, None)?;
            let store = PostgresStore::new(&config.database.url, config.database.max_connections)
                .await?;
            store.migrate().await?;
        }
        Some(Commands::Run {
            database_uri,
            accrual_address,
        }) => {
            init_logging();
            run(load_config(database_uri, accrual_address)?).await?;
        }
        None => {
            init_logging();
            run(load_config(None, None)?).await?;
        }
    }

    Ok(())
}

fn load_config(
    database_uri: Option<String>,
    accrual_address: Option<String>,
) -> Result<AppConfig> {
    let mut config = AppConfig::load()?;
    if let Some(uri) = database_uri {
        config.database.url = uri;
    }
    if let Some(address) = accrual_address {
        config.accrual.base_url = address;
    }

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config error: {}", e);
        }
        return Err(tally::TallyError::Validation(errors.join("; ")));
    }
    Ok(config)
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Starting tally");

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    let accrual = AccrualClient::new(
        &config.accrual.base_url,
        Duration::from_millis(config.accrual.request_timeout_ms),
    )?;

    let pipeline_config = PipelineConfig {
        queue_capacity: config.pipeline.queue_capacity,
        retry: RetryPolicy::new(
            Duration::from_millis(config.pipeline.base_backoff_ms),
            Duration::from_millis(config.pipeline.max_backoff_ms),
            config.pipeline.jitter,
        ),
    };

    let pipeline = Pipeline::new(store.clone(), accrual, pipeline_config);
    let (handle, _workers) = pipeline.spawn();

    // Recover in-flight work lost at the last shutdown before serving
    // anything new.
    pipeline::recover(store.as_ref(), &handle).await?;

    shutdown_signal().await;
    info!("Shutting down");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
