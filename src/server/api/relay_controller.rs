use axum::{
    Json, Router,
    body::Body,
    extract::Query,
    http::{HeaderMap, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::TryStreamExt;
use metrics::counter;
use tracing::{debug, error, warn};

use crate::server::{
    dtos::relay_dto::{RelayFailureDto, RelayQuery, SignRelayDto, SignedRelayDto},
    error::{AppResult, Error},
    extractors::{ClientIdentity, EdgeAuthentication, ValidatedJson, verify_signed_link},
    services::{edge_services::EdgeServices, rate_limit_services::RateLimitResult},
    utils::{
        relay_utils::{
            RelayProfile, apply_cors, copy_response_headers, decode_target_url,
            encode_target_url, ensure_public_target, forward_request_headers, parse_http_url,
        },
        signature_utils::SignatureUtil,
    },
};

const DEFAULT_SIGNED_TTL_HOURS: i64 = 12;
const RELAY_PATH: &str = "/api/v1/relay";

pub struct RelayController;

impl RelayController {
    /// stream routes, every response (errors and extractor rejections included) carries the
    /// wildcard cors headers so players on any origin can read it
    pub fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(Self::relay)
                    .head(Self::relay)
                    .options(Self::preflight),
            )
            .layer(middleware::map_response(Self::with_cors))
    }

    async fn with_cors(mut response: Response) -> Response {
        apply_cors(response.headers_mut());
        response
    }

    async fn preflight() -> StatusCode {
        StatusCode::OK
    }

    async fn relay(
        EdgeAuthentication(identity, services): EdgeAuthentication,
        Query(params): Query<RelayQuery>,
        method: Method,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let url_param = params
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::BadRequest("Please provide a URL parameter.".to_string()))?;

        let target_url = decode_target_url(url_param)?;
        let profile = RelayProfile::from_param(params.profile.as_deref())?;

        // the signature covers the profile too, a signed link can't be replayed under another one
        let signed = verify_signed_link(&services.signature_util, &identity, profile.as_str())?;

        if services.config.require_signed_relay && !signed {
            warn!("Unsigned relay request refused for {}", identity.client_id);
            return Err(Error::Unauthorized);
        }

        if services.config.relay_block_private_networks {
            ensure_public_target(&target_url).await?;
        }

        Self::enforce_rate_limit(&services, &identity).await?;

        counter!("relay_requests_total", "profile" => profile.as_str()).increment(1);
        debug!("Relaying {} (profile={}): {}", method, profile, target_url);

        let mut outbound = forward_request_headers(&headers);
        outbound.extend(profile.identity_headers(&headers, &services.config.relay_default_referer));

        let upstream = match services
            .relay_http
            .request(method.clone(), target_url.clone())
            .headers(outbound)
            .send()
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(
                    "User: {}, relay request to {} failed: {}",
                    identity.client_id, target_url, e
                );
                counter!("relay_transport_errors_total").increment(1);
                Self::record_error(&services, &identity, "relay_request_failed");

                return Ok((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(RelayFailureDto {
                        error: "Failed to fetch the requested URL.".to_string(),
                        details: e.to_string(),
                    }),
                )
                    .into_response());
            }
        };

        let status = upstream.status();
        debug!("Received upstream response with status: {}", status);

        let response_headers = if status.is_client_error() || status.is_server_error() {
            // the body is still relayed, it's often a cloudflare page that clogs the logs
            error!(
                "User: {}, upstream {} answered {}",
                identity.client_id, target_url, status
            );
            counter!("relay_upstream_failures_total").increment(1);

            // upstream 5xx isn't the client's fault
            if status.is_client_error() {
                Self::record_error(&services, &identity, "relay_upstream_client_error");
            }

            let mut failure_headers = HeaderMap::new();
            if let Some(content_type) = upstream.headers().get(header::CONTENT_TYPE) {
                failure_headers.insert(header::CONTENT_TYPE, content_type.clone());
            }
            failure_headers
        } else {
            copy_response_headers(upstream.headers())
        };

        let body = if method == Method::HEAD || status == StatusCode::NO_CONTENT {
            Body::empty()
        } else {
            let client_id = identity.client_id.clone();
            Body::from_stream(upstream.bytes_stream().inspect_err(move |e| {
                warn!("User: {}, upstream body interrupted: {}", client_id, e);
            }))
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;

        Ok(response)
    }

    /// issues a link the caller can hand to a player, valid for this client only
    pub async fn sign(
        EdgeAuthentication(identity, services): EdgeAuthentication,
        ValidatedJson(body): ValidatedJson<SignRelayDto>,
    ) -> AppResult<Json<SignedRelayDto>> {
        let target_url = parse_http_url(&body.url)?;
        let profile = RelayProfile::from_param(body.profile.as_deref())?;

        if services.config.relay_block_private_networks {
            ensure_public_target(&target_url).await?;
        }

        let expires_at =
            SignatureUtil::generate_expiry(body.ttl_hours.unwrap_or(DEFAULT_SIGNED_TTL_HOURS));
        let encoded_url = encode_target_url(&target_url);
        let signature = services.signature_util.generate_signature(
            &identity.client_id,
            expires_at,
            &encoded_url,
            profile.as_str(),
        );

        debug!(
            "Signed relay link for {} until {}",
            identity.client_id, expires_at
        );

        Ok(Json(SignedRelayDto {
            path: format!(
                "{}?url={}&profile={}&sig={}&exp={}&client={}",
                RELAY_PATH, encoded_url, profile, signature, expires_at, identity.client_id
            ),
            expires_at,
        }))
    }

    async fn enforce_rate_limit(services: &EdgeServices, identity: &ClientIdentity) -> AppResult<()> {
        match services.rate_limit.check_rate_limit(&identity.client_id).await {
            RateLimitResult::Allowed { .. } => Ok(()),
            RateLimitResult::RateLimited { retry_after } => {
                warn!("Client {} rate limited", identity.client_id);
                Err(Error::TooManyRequests { retry_after })
            }
            RateLimitResult::TimedOut { reason, .. } => {
                warn!("Client {} is timed out: {}", identity.client_id, reason);
                Err(Error::Forbidden(reason))
            }
        }
    }

    /// spawned so the response isn't held up by the bookkeeping
    fn record_error(services: &EdgeServices, identity: &ClientIdentity, error_type: &'static str) {
        let rate_limit = services.rate_limit.clone();
        let client_id = identity.client_id.clone();

        tokio::spawn(async move {
            rate_limit.record_error(&client_id, error_type).await;
        });
    }
}

