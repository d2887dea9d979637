use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::database::RedisDatabase;

use super::{Visit, VisitRepository, VisitStats};

const VISITORS_KEY: &str = "visits:visitors";
const DAILY_TOTAL_KEY: &str = "visits:daily_unique_total";

// HSETNX is the uniqueness check, the totals only move when it inserts and all three writes
// land together
static RECORD_VISIT_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
            return 0
        end
        redis.call('SADD', KEYS[2], ARGV[1])
        redis.call('INCR', KEYS[3])
        return 1
        ",
    )
});

/// each day is a hash of visitor -> first visit, plus a global visitor set and a running
/// count of (visitor, day) pairs
pub struct RedisVisitRepository {
    redis: Arc<RedisDatabase>,
}

impl RedisVisitRepository {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn day_key(date: NaiveDate) -> String {
        format!("visits:day:{}", date.format("%Y-%m-%d"))
    }
}

#[async_trait::async_trait]
impl VisitRepository for RedisVisitRepository {
    async fn record_visit(&self, visit: &Visit) -> Result<bool> {
        let raw = serde_json::to_string(visit).context("Failed to encode visit")?;

        let mut conn = self.redis.connection();
        let inserted: i64 = RECORD_VISIT_SCRIPT
            .key(Self::day_key(visit.visit_date))
            .key(VISITORS_KEY)
            .key(DAILY_TOTAL_KEY)
            .arg(&visit.visitor_id)
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .context("Failed to record visit")?;

        if inserted == 0 {
            debug!("Visitor {} already counted today", visit.visitor_id);
            return Ok(false);
        }

        Ok(true)
    }

    async fn stats(&self, today: NaiveDate) -> Result<VisitStats> {
        let mut conn = self.redis.connection();
        let (today_count, visitors, daily_total): (u64, u64, Option<u64>) = redis::pipe()
            .hlen(Self::day_key(today))
            .scard(VISITORS_KEY)
            .get(DAILY_TOTAL_KEY)
            .query_async(&mut conn)
            .await
            .context("Failed to load visit stats")?;

        Ok(VisitStats {
            unique_visits_today: today_count,
            total_unique_visitors: visitors,
            total_daily_unique_visits: daily_total.unwrap_or(0),
        })
    }
}
