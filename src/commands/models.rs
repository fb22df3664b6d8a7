use anyhow::Error;

use crate::clients::ollama::UpstreamClient;
use crate::config::GatewayConfig;

pub async fn run(config: GatewayConfig) -> Result<(), Error> {
    let client = UpstreamClient::new(config.upstream)?;
    let models = client.list_models().await?;
    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(())
}
