use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{Visit, VisitRepository, VisitStats};

#[derive(Default)]
struct VisitLog {
    days: HashMap<NaiveDate, HashMap<String, Visit>>,
    visitors: HashSet<String>,
    daily_unique_total: u64,
}

#[derive(Default)]
pub struct LocalVisitRepository {
    log: RwLock<VisitLog>,
}

impl LocalVisitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VisitRepository for LocalVisitRepository {
    async fn record_visit(&self, visit: &Visit) -> Result<bool> {
        let mut log = self.log.write().await;

        let day = log.days.entry(visit.visit_date).or_default();
        if day.contains_key(&visit.visitor_id) {
            return Ok(false);
        }
        day.insert(visit.visitor_id.clone(), visit.clone());

        log.visitors.insert(visit.visitor_id.clone());
        log.daily_unique_total += 1;

        Ok(true)
    }

    async fn stats(&self, today: NaiveDate) -> Result<VisitStats> {
        let log = self.log.read().await;

        Ok(VisitStats {
            unique_visits_today: log.days.get(&today).map_or(0, |day| day.len() as u64),
            total_unique_visitors: log.visitors.len() as u64,
            total_daily_unique_visits: log.daily_unique_total,
        })
    }
}
