use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::{
    database::visit::{DynVisitRepository, Visit, VisitStats},
    server::{dtos::visit_dto::RecordVisitDto, error::AppResult},
};

pub type DynVisitService = Arc<dyn VisitServiceTrait + Send + Sync>;

#[async_trait]
pub trait VisitServiceTrait {
    /// false when the visitor was already counted today
    async fn record(&self, input: RecordVisitDto, user_agent: Option<String>) -> AppResult<bool>;
    async fn stats(&self) -> AppResult<VisitStats>;
}

pub struct VisitService {
    repository: DynVisitRepository,
}

impl VisitService {
    pub fn new(repository: DynVisitRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl VisitServiceTrait for VisitService {
    async fn record(&self, input: RecordVisitDto, user_agent: Option<String>) -> AppResult<bool> {
        let now = Utc::now();
        let visit = Visit {
            visitor_id: input.visitor_id.trim().to_string(),
            visit_date: now.date_naive(),
            page_path: input.page_path.filter(|p| !p.is_empty()),
            user_agent,
            visited_at: now,
        };

        let recorded = self.repository.record_visit(&visit).await?;
        if recorded {
            debug!(
                "First visit today for {} on {}",
                visit.visitor_id, visit.visit_date
            );
        }

        Ok(recorded)
    }

    async fn stats(&self) -> AppResult<VisitStats> {
        Ok(self.repository.stats(Utc::now().date_naive()).await?)
    }
}
