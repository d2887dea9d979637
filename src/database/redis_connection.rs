use std::time::{Duration, Instant};

use anyhow::Context;
use redis::Client;
use redis::aio::MultiplexedConnection;
use tracing::info;

/// startup gives up on redis after this and the server falls back to local storage
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub connection: MultiplexedConnection,
}

impl RedisDatabase {
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client = Client::open(connection_string).context("Failed to create Redis client")?;

        let connection =
            tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_tokio_connection())
                .await
                .context("Timed out connecting to Redis")?
                .context("Failed to connect to Redis database")?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    /// multiplexed connections are cheap to clone, every command gets its own handle
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// PING round trip in milliseconds
    pub async fn health_check(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        let mut conn = self.connection();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}
