pub mod config;
pub mod gateway;
pub mod http;
pub mod mqtt;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::GatewayConfig;
use crate::gateway::lifecycle::Gateway;
use crate::gateway::shutdown::{self, ShutdownHandle};

const CONFIG_PATH: &str = "gateway.toml";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = GatewayConfig::load_or_default(CONFIG_PATH).await?;

    let shutdown_handle = ShutdownHandle::new();
    tokio::spawn(shutdown::listen_for_signals(shutdown_handle.clone()));

    let gateway = Gateway::create(config, shutdown_handle);
    let gateway = gateway
        .initialize()
        .await
        .map_err(|e| eyre!("Gateway init failed: {}", e))?;

    let gateway = gateway.run_until_shutdown().await;
    let _stopped = gateway.stop().await;

    info!("Gateway stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
