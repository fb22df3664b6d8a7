use anyhow::Error;

use crate::config::{default_config_path, GatewayConfig};

pub fn run(config: &GatewayConfig) -> Result<(), Error> {
    if let Some(path) = default_config_path() {
        println!("# default config file: {}", path.display());
    }
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}
