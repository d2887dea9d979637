use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, put},
};

use crate::{
    database::channel::CustomChannel,
    server::{
        dtos::channel_dto::{CreateChannelDto, UpdateChannelDto},
        error::AppResult,
        extractors::{Owner, ValidatedJson},
        services::edge_services::EdgeServices,
    },
};

pub struct ChannelController;

impl ChannelController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::list).post(Self::add))
            .route("/{name}", put(Self::update).delete(Self::delete))
    }

    async fn list(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
    ) -> AppResult<Json<Vec<CustomChannel>>> {
        Ok(Json(services.channels.list(owner.as_str()).await?))
    }

    async fn add(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
        ValidatedJson(input): ValidatedJson<CreateChannelDto>,
    ) -> AppResult<(StatusCode, Json<CustomChannel>)> {
        let channel = services.channels.add(owner.as_str(), input).await?;
        Ok((StatusCode::CREATED, Json(channel)))
    }

    async fn update(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
        Path(name): Path<String>,
        ValidatedJson(input): ValidatedJson<UpdateChannelDto>,
    ) -> AppResult<Json<CustomChannel>> {
        Ok(Json(
            services.channels.update(owner.as_str(), &name, input).await?,
        ))
    }

    async fn delete(
        Extension(services): Extension<EdgeServices>,
        owner: Owner,
        Path(name): Path<String>,
    ) -> AppResult<StatusCode> {
        services.channels.delete(owner.as_str(), &name).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
