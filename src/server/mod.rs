use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router, ServiceExt,
    extract::Request,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tokio::signal;
use tower::Layer;
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{config::AppConfig, database::RedisDatabase};

use self::{
    api::{
        channel_controller::ChannelController, health_controller::health_endpoint,
        metrics_controller::metrics_endpoint, relay_controller::RelayController,
        visit_controller::VisitController, watch_controller::WatchController,
    },
    extractors::OWNER_HEADER,
    services::edge_services::EdgeServices,
};

pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// cors for the json api, the relay sets its own wildcard headers
    fn api_cors(config: &AppConfig) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static(OWNER_HEADER),
            ]);

        match config.allowed_origins() {
            None => cors.allow_origin(Any),
            Some(origins) => {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|origin| match origin.parse() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!("Ignoring invalid cors origin: {}", origin);
                            None
                        }
                    })
                    .collect();
                cors.allow_origin(origins)
            }
        }
    }

    /// every route the server answers, `metrics` is None when no recorder is installed
    pub fn router(services: EdgeServices, metrics: Option<PrometheusHandle>) -> Router {
        let api_routes = Router::new()
            .nest("/channels", ChannelController::app())
            .nest("/watch-progress", WatchController::app())
            .nest("/visits", VisitController::app())
            .route("/relay/sign", post(RelayController::sign))
            .layer(Self::api_cors(&services.config))
            // added after the cors layer so relay responses keep their own headers
            .nest("/relay", RelayController::app());

        let mut router = Router::new()
            .route("/health", get(health_endpoint))
            .nest("/api/v1", api_routes);

        if let Some(handle) = metrics {
            router = router.route(
                "/metrics",
                get(metrics_endpoint).layer(Extension(handle)),
            );
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(Extension(services))
    }

    pub async fn serve(config: Arc<AppConfig>, redis_db: Option<RedisDatabase>) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let metrics = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to install prometheus recorder, /metrics disabled: {}", e);
                None
            }
        };

        let services = EdgeServices::new(redis_db, config.clone())?;
        let router = Self::router(services, metrics);

        // trailing slashes are trimmed before routing, so it has to wrap the router itself
        let app = NormalizePathLayer::trim_trailing_slash().layer(router);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("routes initialized, listening on port {}", config.port);

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while starting server")?;

        info!("server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
