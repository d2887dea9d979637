use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::database::RedisDatabase;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// maximum relay requests per window
    pub max_requests_per_window: u32,
    pub window_seconds: u64,
    /// errors within `error_window_seconds` before a client gets timed out
    pub max_errors_before_timeout: u32,
    pub error_window_seconds: u64,
    pub timeout_duration_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // a player pulling 2s segments from a few renditions stays well under this
            max_requests_per_window: 500,
            window_seconds: 60,
            max_errors_before_timeout: 50,
            error_window_seconds: 600,
            timeout_duration_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    RateLimited { retry_after: u64 },
    /// too many errors recently, refused until the timeout lapses
    TimedOut { reason: String, retry_after: u64 },
}

pub type DynRateLimitService = Arc<dyn RateLimitServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait RateLimitServiceTrait {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult;

    /// record a failed relay (upstream 4xx, transport failure)
    async fn record_error(&self, client_id: &str, error_type: &str);

    async fn timeout_client(&self, client_id: &str, reason: &str, duration_seconds: u64);
}

fn timeout_reason(count: u32, config: &RateLimitConfig) -> String {
    format!(
        "Automatic timeout: {} errors in {} seconds",
        count, config.error_window_seconds
    )
}

/// shared limits across instances, keyed by client id
pub struct EdgeRateLimitService {
    redis: Arc<RedisDatabase>,
    config: RateLimitConfig,
}

impl EdgeRateLimitService {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self {
            redis,
            config: RateLimitConfig::default(),
        }
    }

    fn rate_limit_key(client_id: &str) -> String {
        format!("edge_rate_limit:{}", client_id)
    }

    fn error_count_key(client_id: &str) -> String {
        format!("edge_error_count:{}", client_id)
    }

    fn timeout_key(client_id: &str) -> String {
        format!("edge_timeout:{}", client_id)
    }

    async fn timed_out(&self, client_id: &str) -> Option<(String, u64)> {
        let key = Self::timeout_key(client_id);
        let mut conn = self.redis.connection();

        let result: Result<(Option<String>, i64), redis::RedisError> = redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((Some(reason), ttl)) if ttl > 0 => Some((reason, ttl as u64)),
            Ok(_) => None,
            Err(e) => {
                error!("Failed to check timeout for client {}: {}", client_id, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for EdgeRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        if let Some((reason, retry_after)) = self.timed_out(client_id).await {
            return RateLimitResult::TimedOut {
                reason,
                retry_after,
            };
        }

        let key = Self::rate_limit_key(client_id);
        let mut conn = self.redis.connection();

        // NX keeps the window fixed instead of sliding it on every request
        let result: Result<(u32, i64), redis::RedisError> = redis::pipe()
            .atomic()
            .incr(&key, 1u32)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.config.window_seconds)
            .arg("NX")
            .ignore()
            .ttl(&key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count, ttl)) if count > self.config.max_requests_per_window => {
                debug!("Client {} rate limited: {} requests in window", client_id, count);
                RateLimitResult::RateLimited {
                    retry_after: ttl.max(1) as u64,
                }
            }
            Ok((count, _)) => RateLimitResult::Allowed {
                remaining: self.config.max_requests_per_window - count,
            },
            Err(e) => {
                // a redis hiccup shouldn't take the relay down with it
                error!("Rate limit check failed for client {}: {}", client_id, e);
                RateLimitResult::Allowed { remaining: 0 }
            }
        }
    }

    async fn record_error(&self, client_id: &str, error_type: &str) {
        let key = Self::error_count_key(client_id);
        let mut conn = self.redis.connection();

        let result: Result<(u32, i64), redis::RedisError> = redis::pipe()
            .atomic()
            .incr(&key, 1u32)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.config.error_window_seconds)
            .arg("NX")
            .ignore()
            .ttl(&key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count, _ttl)) => {
                debug!(
                    "Client {} error recorded ({}): count now {}",
                    client_id, error_type, count
                );

                if count >= self.config.max_errors_before_timeout {
                    warn!(
                        "Client {} exceeded error threshold ({} errors), applying timeout",
                        client_id, count
                    );
                    self.timeout_client(
                        client_id,
                        &timeout_reason(count, &self.config),
                        self.config.timeout_duration_seconds,
                    )
                    .await;
                }
            }
            Err(e) => error!("Failed to record error for client {}: {}", client_id, e),
        }
    }

    async fn timeout_client(&self, client_id: &str, reason: &str, duration_seconds: u64) {
        let key = Self::timeout_key(client_id);
        let mut conn = self.redis.connection();

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, reason, duration_seconds).await;

        match result {
            Ok(_) => info!(
                "Client {} timed out for {} seconds: {}",
                client_id, duration_seconds, reason
            ),
            Err(e) => error!("Failed to timeout client {}: {}", client_id, e),
        }
    }
}

#[derive(Default)]
struct LocalClientState {
    window_started: Option<Instant>,
    requests: u32,
    errors_started: Option<Instant>,
    errors: u32,
    timeout: Option<(String, Instant)>,
}

impl LocalClientState {
    /// nothing left that could affect a future check
    fn expired(&self, now: Instant, config: &RateLimitConfig) -> bool {
        let window = Duration::from_secs(config.window_seconds);
        let error_window = Duration::from_secs(config.error_window_seconds);

        let window_over = self
            .window_started
            .is_none_or(|started| now.saturating_duration_since(started) >= window);
        let errors_over = self
            .errors_started
            .is_none_or(|started| now.saturating_duration_since(started) >= error_window);
        let timeout_over = self.timeout.as_ref().is_none_or(|(_, until)| *until <= now);

        window_over && errors_over && timeout_over
    }
}

struct LocalClients {
    clients: HashMap<String, LocalClientState>,
    last_prune: Instant,
}

/// same limits kept in process memory, for running without redis
pub struct LocalRateLimitService {
    config: RateLimitConfig,
    state: Mutex<LocalClients>,
}

impl LocalRateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LocalClients {
                clients: HashMap::new(),
                last_prune: Instant::now(),
            }),
        }
    }

    fn remaining(deadline: Instant, now: Instant) -> u64 {
        deadline.saturating_duration_since(now).as_secs().max(1)
    }

    /// drops every client whose windows and timeout have all lapsed at `now`
    pub async fn prune_expired(&self, now: Instant) {
        let mut state = self.state.lock().await;
        Self::prune_locked(&mut state, now, &self.config);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    fn prune_locked(state: &mut LocalClients, now: Instant, config: &RateLimitConfig) {
        let before = state.clients.len();
        state
            .clients
            .retain(|_, client| !client.expired(now, config));
        state.last_prune = now;

        let pruned = before - state.clients.len();
        if pruned > 0 {
            debug!("Pruned {} idle rate limit entries", pruned);
        }
    }
}

impl Default for LocalRateLimitService {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for LocalRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);
        let mut clients = self.state.lock().await;

        // at most one sweep per request window keeps this off the hot path
        if now.saturating_duration_since(clients.last_prune) >= window {
            Self::prune_locked(&mut clients, now, &self.config);
        }

        let state = clients.clients.entry(client_id.to_string()).or_default();

        if let Some((reason, until)) = &state.timeout {
            if *until > now {
                return RateLimitResult::TimedOut {
                    reason: reason.clone(),
                    retry_after: Self::remaining(*until, now),
                };
            }
            state.timeout = None;
        }

        let started = match state.window_started {
            Some(started) if now.duration_since(started) < window => started,
            _ => {
                state.requests = 0;
                state.window_started = Some(now);
                now
            }
        };

        state.requests += 1;

        if state.requests > self.config.max_requests_per_window {
            debug!("Client {} rate limited locally", client_id);
            return RateLimitResult::RateLimited {
                retry_after: Self::remaining(started + window, now),
            };
        }

        RateLimitResult::Allowed {
            remaining: self.config.max_requests_per_window - state.requests,
        }
    }

    async fn record_error(&self, client_id: &str, error_type: &str) {
        let now = Instant::now();
        let window = Duration::from_secs(self.config.error_window_seconds);

        let count = {
            let mut clients = self.state.lock().await;
            let state = clients.clients.entry(client_id.to_string()).or_default();

            match state.errors_started {
                Some(started) if now.duration_since(started) < window => {}
                _ => {
                    state.errors = 0;
                    state.errors_started = Some(now);
                }
            }

            state.errors += 1;
            state.errors
        };

        debug!(
            "Client {} error recorded ({}): count now {}",
            client_id, error_type, count
        );

        if count >= self.config.max_errors_before_timeout {
            warn!(
                "Client {} exceeded error threshold ({} errors), applying timeout",
                client_id, count
            );
            self.timeout_client(
                client_id,
                &timeout_reason(count, &self.config),
                self.config.timeout_duration_seconds,
            )
            .await;
        }
    }

    async fn timeout_client(&self, client_id: &str, reason: &str, duration_seconds: u64) {
        let until = Instant::now() + Duration::from_secs(duration_seconds);
        let mut clients = self.state.lock().await;
        clients.clients.entry(client_id.to_string()).or_default().timeout =
            Some((reason.to_string(), until));

        info!(
            "Client {} timed out for {} seconds: {}",
            client_id, duration_seconds, reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_config() -> RateLimitConfig {
        RateLimitConfig {
            max_requests_per_window: 3,
            window_seconds: 60,
            max_errors_before_timeout: 2,
            error_window_seconds: 60,
            timeout_duration_seconds: 30,
        }
    }

    #[tokio::test]
    async fn allows_up_to_the_window_limit() {
        let limiter = LocalRateLimitService::new(tight_config());

        assert_eq!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::Allowed { remaining: 2 }
        );
        limiter.check_rate_limit("a").await;
        assert_eq!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::Allowed { remaining: 0 }
        );
        assert!(matches!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::RateLimited { retry_after } if retry_after > 0 && retry_after <= 60
        ));

        // other clients have their own window
        assert_eq!(
            limiter.check_rate_limit("b").await,
            RateLimitResult::Allowed { remaining: 2 }
        );
    }

    #[tokio::test]
    async fn repeated_errors_time_the_client_out() {
        let limiter = LocalRateLimitService::new(tight_config());

        limiter.record_error("a", "upstream_client_error").await;
        assert!(matches!(
            limiter.check_rate_limit("a").await,
            RateLimitResult::Allowed { .. }
        ));

        limiter.record_error("a", "upstream_client_error").await;
        match limiter.check_rate_limit("a").await {
            RateLimitResult::TimedOut {
                reason,
                retry_after,
            } => {
                assert!(reason.contains("2 errors"));
                assert!(retry_after <= 30);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn idle_clients_are_evicted() {
        let limiter = LocalRateLimitService::new(tight_config());

        limiter.check_rate_limit("a").await;
        limiter.record_error("b", "relay_request_failed").await;
        limiter.timeout_client("c", "manual", 3600).await;
        assert_eq!(limiter.tracked_clients().await, 3);

        // still inside every window, nothing goes
        limiter.prune_expired(Instant::now()).await;
        assert_eq!(limiter.tracked_clients().await, 3);

        // past the 60s windows but not the hour long timeout
        limiter
            .prune_expired(Instant::now() + Duration::from_secs(120))
            .await;
        assert_eq!(limiter.tracked_clients().await, 1);

        limiter
            .prune_expired(Instant::now() + Duration::from_secs(7200))
            .await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }
}
