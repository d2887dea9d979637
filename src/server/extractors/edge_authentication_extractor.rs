use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use axum::Extension;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::server::error::{AppResult, Error};
use crate::server::services::edge_services::EdgeServices;
use crate::server::utils::signature_utils::SignatureUtil;

#[derive(Deserialize)]
struct SignedUrlQuery {
    sig: Option<String>,
    exp: Option<String>,
    // client id the link was signed for
    client: Option<String>,
}

/// signature parts of a relay link, checked by the handler once the url itself is known to be
/// usable
#[derive(Debug, Clone)]
pub struct SignedLink {
    pub sig: String,
    pub exp: String,
    pub client: Option<String>,
    /// raw (still encoded) `url` query value
    pub url: Option<String>,
}

/// who is calling, derived without any database
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// hash of ip + user agent
    pub client_id: String,
    /// present when the request carried both `sig` and `exp`
    pub link: Option<SignedLink>,
}

pub struct EdgeAuthentication(pub ClientIdentity, pub EdgeServices);

/// generates a client identifier from IP address and user-agent
pub fn generate_client_id(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    ip.unwrap_or("unknown").hash(&mut hasher);
    user_agent.unwrap_or("unknown").hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// X-Forwarded-For (first hop), then X-Real-IP, then the socket address
pub fn client_ip(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
}

pub fn client_id_from_parts(parts: &Parts) -> String {
    let user_agent = parts.headers.get(USER_AGENT).and_then(|h| h.to_str().ok());
    generate_client_id(client_ip(parts).as_deref(), user_agent)
}

/// raw (still encoded) `url` query value, signatures are computed over exactly this string
fn raw_url_param(parts: &Parts) -> Option<&str> {
    parts.uri.query().and_then(|q| {
        q.split('&')
            .find_map(|param| param.strip_prefix("url="))
    })
}

/// verifies a signed relay link, `Ok(false)` when the request carried no signature at all
pub fn verify_signed_link(
    signature_util: &SignatureUtil,
    identity: &ClientIdentity,
    profile: &str,
) -> AppResult<bool> {
    let Some(link) = &identity.link else {
        return Ok(false);
    };

    let expiry = link.exp.parse::<i64>().map_err(|_| {
        warn!("Invalid expiry timestamp on signed link");
        Error::Unauthorized
    })?;

    let url_param = link.url.as_deref().ok_or_else(|| {
        warn!("Signed link without url parameter");
        Error::Unauthorized
    })?;

    // links stay valid when the client's ip changes mid stream, the signed client id wins
    let signature_client_id = link.client.as_deref().unwrap_or(&identity.client_id);

    if !signature_util.verify_signature(signature_client_id, expiry, url_param, profile, &link.sig)
    {
        warn!(
            "Signature invalid - client: {}, expiry: {}",
            signature_client_id, expiry
        );
        return Err(Error::Unauthorized);
    }

    debug!("Signature verified for client: {}", signature_client_id);
    Ok(true)
}

/// resolves the caller and collects any link signature, nothing is rejected here so the handler
/// can validate its own params first
impl<S> FromRequestParts<S> for EdgeAuthentication
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let client_id = client_id_from_parts(parts);
        debug!("Resolved client_id: {}", client_id);

        let link = Query::<SignedUrlQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Query(query)| match (query.sig, query.exp) {
                (Some(sig), Some(exp)) => Some(SignedLink {
                    sig,
                    exp,
                    client: query.client,
                    url: raw_url_param(parts).map(str::to_string),
                }),
                _ => None,
            });

        Ok(EdgeAuthentication(ClientIdentity { client_id, link }, services))
    }
}
