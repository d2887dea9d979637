use axum::{
    Extension, Json, Router,
    http::{HeaderMap, header},
    routing::{get, post},
};

use crate::{
    database::visit::VisitStats,
    server::{
        dtos::visit_dto::{RecordVisitDto, RecordVisitResponseDto},
        error::AppResult,
        extractors::ValidatedJson,
        services::edge_services::EdgeServices,
    },
};

pub struct VisitController;

impl VisitController {
    pub fn app() -> Router {
        Router::new()
            .route("/", post(Self::record))
            .route("/stats", get(Self::stats))
    }

    async fn record(
        Extension(services): Extension<EdgeServices>,
        headers: HeaderMap,
        ValidatedJson(input): ValidatedJson<RecordVisitDto>,
    ) -> AppResult<Json<RecordVisitResponseDto>> {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let recorded = services.visits.record(input, user_agent).await?;
        Ok(Json(RecordVisitResponseDto { recorded }))
    }

    async fn stats(Extension(services): Extension<EdgeServices>) -> AppResult<Json<VisitStats>> {
        Ok(Json(services.visits.stats().await?))
    }
}
