use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use mockall::automock;
use serde::{Deserialize, Serialize};

/// first visit of a visitor on a given utc day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub visitor_id: String,
    pub visit_date: NaiveDate,
    pub page_path: Option<String>,
    pub user_agent: Option<String>,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitStats {
    pub unique_visits_today: u64,
    pub total_unique_visitors: u64,
    /// distinct (visitor, day) pairs across all time
    pub total_daily_unique_visits: u64,
}

pub type DynVisitRepository = Arc<dyn VisitRepository + Send + Sync>;

#[automock]
#[async_trait::async_trait]
pub trait VisitRepository {
    /// false when the visitor was already counted on `visit.visit_date`
    async fn record_visit(&self, visit: &Visit) -> Result<bool>;
    async fn stats(&self, today: NaiveDate) -> Result<VisitStats>;
}
