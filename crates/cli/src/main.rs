//! Deskroute service runner
//!
//! Runs the assignment engine's safety drain and queue introspection API, and
//! offers a few operator commands against the same database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use deskroute_assignment_engine::{
    api,
    events::NullPublisher,
    logging::{parse_log_level, setup_logging, LoggingConfig},
    model::TenantId,
    server::EngineServerBuilder,
    AssignmentEngine, EngineConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Deskroute ticket assignment engine", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "DESKROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides the config file (e.g. sqlite:deskroute.db)
    #[arg(short, long, env = "DESKROUTE_DATABASE_URL")]
    database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DESKROUTE_LOG_LEVEL")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the safety drain loop and the REST API until Ctrl-C
    Serve {
        /// Address for the REST API
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Print a tenant's queue as JSON
    Queue {
        #[arg(short, long)]
        tenant: String,
    },
    /// Drain a tenant's queue once and print the result
    Drain {
        #[arg(short, long)]
        tenant: String,
    },
    /// Create the database and apply migrations
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&cli.log_level)?);
    if cli.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let config = load_config(&cli)?;

    match cli.command {
        Command::Serve { bind } => serve(config, &bind).await,
        Command::Queue { tenant } => {
            let engine = AssignmentEngine::new(config, Arc::new(NullPublisher)).await?;
            let entries = engine.get_queued_tickets(&TenantId::from(tenant)).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Command::Drain { tenant } => {
            let engine = AssignmentEngine::new(config, Arc::new(NullPublisher)).await?;
            let report = engine.process_queue(&TenantId::from(tenant)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::InitDb => {
            let url = config.database.url.clone();
            let engine = AssignmentEngine::new(config, Arc::new(NullPublisher)).await?;
            engine.database().close().await;
            info!("✅ Database ready at {}", url);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(url) = &cli.database {
        config.database.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn serve(config: EngineConfig, bind: &str) -> Result<()> {
    let mut server = EngineServerBuilder::new().with_config(config).build().await?;
    server.start()?;

    let app = api::router(server.engine().clone());
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("🌐 Queue API listening on http://{}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("🛑 Shutdown requested");
        })
        .await;

    server.stop().await;
    server.engine().database().close().await;
    served.context("REST API server failed")
}
