use std::future::Future;
use std::sync::Arc;

use anyhow::Error;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::clients::ollama::UpstreamClient;
use crate::config::GatewayConfig;
use crate::handler::{handle, AppState};

pub async fn run(config: GatewayConfig) -> Result<(), Error> {
    if config.api_key.is_none() {
        warn!("API_KEY is not set; every request to /api will be rejected");
    }
    let upstream = UpstreamClient::new(config.upstream.clone())?;
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let state = Arc::new(AppState::new(config, upstream));
    serve(listener, state, shutdown_signal()).await
}

/// Accepts connections until `shutdown` resolves. Each connection gets its own task.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let addr = listener.local_addr()?;
    info!("Ollama gateway listening on http://{}", addr);
    info!("Environment: {}", state.config.environment);
    info!("Forwarding chat to {}", state.config.upstream.chat_url());
    info!("Health check: http://{}/health", addr);
    info!("Chat endpoint: http://{}/api/chat", addr);
    info!("Models endpoint: http://{}/api/models", addr);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                tokio::task::spawn(async move {
                    let service = service_fn(move |req| handle(req, state.clone()));
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection: {:?}", err);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
