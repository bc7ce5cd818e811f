//! 服务入口

use std::sync::Arc;

use thesiscast_lib::{config::Config, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    telemetry::init_tracing(&config.logging);

    server::run(config).await
}
