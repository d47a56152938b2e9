//! Steem Gateway CLI
//!
//! Entry point for the gateway binary. Provides subcommands for:
//! - `run` - Start the gateway
//! - `check-config` - Load and validate configuration, then exit
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use tokio_util::sync::CancellationToken;
use tracing::info;

use steem_gateway::config::Settings;
use steem_gateway::server::Gateway;

/// Steem WebSocket Gateway
#[derive(Parser, Debug)]
#[command(name = "steem-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name (selects config/{environment}.toml)
    #[arg(short, long, default_value = "production", env = "GATEWAY_ENV")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway
    Run,

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // .env is optional; ignore absence.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let settings = load_settings(&cli.environment)?;
            init_tracing(&settings);

            info!(
                version = steem_gateway::VERSION,
                environment = %cli.environment,
                "Starting Steem gateway"
            );

            let gateway = Gateway::new(settings).wrap_err("Failed to initialize gateway")?;

            let shutdown = CancellationToken::new();
            spawn_signal_handler(shutdown.clone());

            gateway
                .run(shutdown)
                .await
                .wrap_err("Gateway terminated with an error")?;
        }
        Commands::CheckConfig => {
            let settings = load_settings(&cli.environment)?;
            println!("Configuration OK");
            println!(
                "  listen      {}:{}",
                settings.server.host, settings.server.port
            );
            println!("  endpoints   {}", settings.upstream.endpoints.join(", "));
        }
        Commands::Version => {
            println!("steem-gateway {}", steem_gateway::VERSION);
        }
    }

    Ok(())
}

/// Load settings for an environment and run validation.
fn load_settings(environment: &str) -> eyre::Result<Settings> {
    let settings =
        Settings::load(environment).wrap_err("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|errors| eyre::eyre!("Invalid configuration:\n  {}", errors.join("\n  ")))?;
    Ok(settings)
}

/// Initialize the tracing subscriber from logging settings.
fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.logging.level.clone()));

    if settings.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Cancel the token on SIGINT or SIGTERM so every task shuts down cleanly
/// and the process exits 0.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received interrupt, shutting down"),
            () = terminate => info!("Received terminate, shutting down"),
        }

        shutdown.cancel();
    });
}
