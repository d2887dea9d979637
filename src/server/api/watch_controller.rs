use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{delete, get},
};

use crate::{
    database::watch::WatchItem,
    server::{
        dtos::watch_dto::UpsertProgressDto,
        error::AppResult,
        extractors::{Owner, ValidatedJson},
        services::edge_services::EdgeServices,
    },
};

pub struct WatchController;

impl WatchController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::continue_watching).put(Self::upsert))
            .route("/{id}", delete(Self::remove))
    }

    /// in progress titles, most recently watched first
    async fn continue_watching(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
    ) -> AppResult<Json<Vec<WatchItem>>> {
        Ok(Json(services.watch.continue_watching(owner.as_str()).await?))
    }

    async fn upsert(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
        ValidatedJson(input): ValidatedJson<UpsertProgressDto>,
    ) -> AppResult<Json<WatchItem>> {
        Ok(Json(services.watch.upsert(owner.as_str(), input).await?))
    }

    async fn remove(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
        Path(id): Path<String>,
    ) -> AppResult<StatusCode> {
        services.watch.remove(owner.as_str(), &id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
