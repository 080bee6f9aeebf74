//! Roomkey - hotel booking API client
//!
#![doc = "Roomkey - hotel booking API client"]
#![doc = "Main entry point for the roomkey command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use roomkey::cli::{Cli, Commands};
use roomkey::commands::{self, Context};
use roomkey::config::{Config, LoggingConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = load_config(&cli)?;

    // Initialize tracing
    init_tracing(&config.logging);

    // Validate configuration
    config.validate()?;

    let ctx = Context::from_config(config)?;

    // Execute command
    match cli.command {
        Commands::Login { username, password } => {
            tracing::info!("Logging in as {}", username);
            commands::account::login(&ctx, &username, &password).await
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            tracing::info!("Registering account {}", username);
            commands::account::register(&ctx, &username, &email, &password).await
        }
        Commands::Logout => commands::account::logout(&ctx),
        Commands::Whoami { json } => commands::account::whoami(&ctx, json),
        Commands::Request { method, path, data } => {
            commands::request::run_request(&ctx, &method, &path, data.as_deref()).await
        }
    }
}

/// Load configuration under a temporary stderr subscriber
///
/// The logging settings live in the configuration itself, so warnings raised
/// while loading it (missing file, bad `ROOMKEY_*` values) are emitted through
/// a warn-level subscriber scoped to this call.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomkey=warn")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::with_default(bootstrap, || Config::load(config_path, cli))
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("roomkey={}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
