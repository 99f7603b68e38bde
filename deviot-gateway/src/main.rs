//! DevIoT Gateway - announces local things to the cloud and routes remote actions to them.

use std::env;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deviot_gateway::{demo, Config, Gateway};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: Option<&str> = option_env!("GIT_HASH");

fn print_version() {
    println!("deviot-gateway {} ({})", VERSION, GIT_HASH.unwrap_or("unknown"));
}

/// Value of `--config <path>`, if given.
fn config_path(args: &[String]) -> Result<Option<&str>, String> {
    let Some(i) = args.iter().position(|a| a == "--config") else {
        return Ok(None);
    };
    match args.get(i + 1) {
        Some(path) if !path.starts_with('-') => Ok(Some(path.as_str())),
        _ => Err("--config requires a path".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }
    let config_path = config_path(&args)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load(config_path).map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure deviot.toml exists or set DEVIOT__GATEWAY__NAME, \
             DEVIOT__REGISTRATION__ENDPOINT and DEVIOT__BROKER__URL environment variables.",
            e
        )
    })?;
    tracing::info!(
        "Starting deviot-gateway: {} (owner '{}')",
        config.gateway.name,
        config.gateway.owner
    );

    let gateway = Gateway::from_config(&config)?;

    let bulb = Arc::new(demo::light_bulb("bulb1", "Demo Bulb"));
    gateway.register(bulb.clone()).await?;

    gateway.start().await;

    let mut ticker = tokio::time::interval(config.registration.interval());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                gateway.send_data(&demo::state(&bulb)).await;
            }
        }
    }

    gateway.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_config_path() {
        assert_eq!(config_path(&args(&["gw"])), Ok(None));
        assert_eq!(
            config_path(&args(&["gw", "--config", "/etc/deviot.toml"])),
            Ok(Some("/etc/deviot.toml"))
        );
    }

    #[test]
    fn test_config_flag_without_path_is_an_error() {
        assert!(config_path(&args(&["gw", "--config"])).is_err());
        assert!(config_path(&args(&["gw", "--config", "-V"])).is_err());
    }
}
