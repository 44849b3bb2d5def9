// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use wharf::server::{run_server, RegistryConfig, ServerConfig};

#[derive(Parser)]
#[command(name = "wharf")]
#[command(author, version, about = "Self-hosted package registry with npm-compatible publishing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address from the configuration
        #[arg(short, long)]
        bind: Option<String>,

        /// Keep all packages in memory (for local testing)
        #[arg(long)]
        ephemeral: bool,
    },
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "/etc/wharf/wharf.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            ephemeral,
        } => {
            let mut server_config = match config {
                Some(path) => {
                    info!("Loading configuration from {}", path.display());
                    RegistryConfig::load(&path)?.to_server_config()?
                }
                None => ServerConfig::default(),
            };

            if let Some(bind) = bind {
                server_config.bind_addr = bind
                    .parse()
                    .with_context(|| format!("Invalid bind address: {bind}"))?;
            }
            if ephemeral {
                server_config.storage_root = None;
            }

            run_server(server_config).await
        }
        Commands::CheckConfig { config } => {
            let server_config = RegistryConfig::load(&config)?.to_server_config()?;

            println!("Configuration OK: {}", config.display());
            println!("  bind: {}", server_config.bind_addr);
            println!("  max body size: {} bytes", server_config.max_body_bytes);
            match &server_config.storage_root {
                Some(root) => println!("  storage: fs ({})", root.display()),
                None => println!("  storage: memory"),
            }
            println!(
                "  auth: {}",
                if server_config.auth_token.is_some() {
                    "bearer token"
                } else {
                    "open"
                }
            );
            match &server_config.webhook_url {
                Some(url) => println!("  webhook: {}", url),
                None => println!("  webhook: disabled"),
            }
            Ok(())
        }
    }
}
