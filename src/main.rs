use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::{info, warn};

use flame_edge::{AppConfig, EdgeApplicationServer, Logger, RedisDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards flush the log writer and keep sentry alive, they live until main returns
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped...");

    let redis_db = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis...");
            match RedisDatabase::connect(redis_url).await {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!("redis unavailable, running on local storage: {:#}", e);
                    None
                }
            }
        }
        None => {
            warn!("no REDIS_URL set, running on local storage");
            None
        }
    };

    EdgeApplicationServer::serve(config, redis_db)
        .await
        .context("edge server failed to start")?;

    Ok(())
}
