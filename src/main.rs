use anyhow::Error;
use args::{Args, SubCommands};
use clap::Parser;
use config::GatewayConfig;
use tracing::info;

mod args;
mod clients;
mod commands;
mod config;
mod error;
mod handler;
mod models;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ollama_gateway=info".to_string()),
        )
        .init();
    let args = Args::parse();
    let mut config = GatewayConfig::load(args.config.as_deref())?;

    match args.subcmd {
        Some(SubCommands::Start(start)) => {
            if let Some(port) = start.port {
                config.port = port;
            }
            commands::start::run(config).await?;
        }
        None => {
            info!("No subcommand given, starting the gateway");
            commands::start::run(config).await?;
        }
        Some(SubCommands::Models) => {
            commands::models::run(config).await?;
        }
        Some(SubCommands::Config) => {
            commands::config::run(&config)?;
        }
    };
    Ok(())
}
