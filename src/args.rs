use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = r###"
Ollama Gateway is an authenticated HTTP front door for a local Ollama server.

Clients present a shared API key and talk to a small JSON API:
- POST /api/chat: forward a conversation to the model and relay its reply.
- POST /api/generate: the same for a single prompt.
- GET /api/models: list the models the backend has pulled.

Configuration comes from an optional TOML file and the environment (PORT, BASE_URL,
ENDPOINT, DEFAULT_MODEL, OLLAMA_TIMEOUT, MODELS_TIMEOUT, API_KEY, NODE_ENV,
CANCEL_ON_DISCONNECT). Environment variables win.
"###
)]
pub struct Args {
    /// Path to a TOML config file. Defaults to <config dir>/ollama-gateway/gateway.toml if present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub subcmd: Option<SubCommands>,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// Start the gateway. This is the default.
    Start(StartSubCommand),
    /// Ask the backend for its models and print them as JSON.
    Models,
    /// Print the effective configuration with the API key masked.
    Config,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Start the Ollama gateway", long_about = None)]
pub struct StartSubCommand {
    /// Override the listening port.
    #[arg(short, long)]
    pub port: Option<u16>,
}
