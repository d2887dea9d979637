// header and url plumbing for the relay controller, kept free of any request state so it can be
// tested on its own
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use url::{Host, Url};

use crate::server::error::{AppResult, Error};

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0";
const DESKTOP_CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// client request headers that are safe and useful to pass on, everything else is dropped
const FORWARDED_REQUEST_HEADERS: [HeaderName; 6] = [
    header::RANGE,
    header::IF_RANGE,
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, Range";
pub const CORS_EXPOSE_HEADERS: &str = "Content-Length, Content-Range, Accept-Ranges";

/// upstream header preset, picked with the `profile` query param
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayProfile {
    /// keeps the client's user agent and referer
    #[default]
    Passthrough,
    /// poses as the bilibili.tv web player
    Bilibili,
}

impl RelayProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Bilibili => "bilibili",
        }
    }

    /// parses an optional profile param, missing means passthrough
    pub fn from_param(param: Option<&str>) -> AppResult<Self> {
        match param.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p.parse(),
            None => Ok(Self::default()),
        }
    }

    /// upstream identity headers for this profile
    pub fn identity_headers(&self, client_headers: &HeaderMap, default_referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        match self {
            Self::Passthrough => {
                let user_agent = client_headers
                    .get(header::USER_AGENT)
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_USER_AGENT));
                let referer = client_headers
                    .get(header::REFERER)
                    .cloned()
                    .or_else(|| HeaderValue::from_str(default_referer).ok());

                headers.insert(header::USER_AGENT, user_agent);
                if let Some(referer) = referer {
                    headers.insert(header::REFERER, referer);
                }
            }
            Self::Bilibili => {
                headers.insert(
                    header::ORIGIN,
                    HeaderValue::from_static("https://www.bilibili.tv"),
                );
                headers.insert(
                    header::REFERER,
                    HeaderValue::from_static("https://www.bilibili.tv/"),
                );
                headers.insert(
                    header::USER_AGENT,
                    HeaderValue::from_static(DESKTOP_CHROME_USER_AGENT),
                );
            }
        }

        headers
    }
}

impl FromStr for RelayProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "bilibili" => Ok(Self::Bilibili),
            other => Err(Error::BadRequest(format!("Unknown relay profile: {}", other))),
        }
    }
}

impl fmt::Display for RelayProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// accepts a plain (optionally percent encoded) http(s) url or the unpadded url-safe base64
/// form that signed links carry
pub fn decode_target_url(url_param: &str) -> AppResult<Url> {
    let url_param = url_param.trim();

    let lower = url_param.to_ascii_lowercase();

    // query extraction already percent-decoded once, a plain url is used as is
    let decoded = if lower.starts_with("http://") || lower.starts_with("https://") {
        url_param.to_string()
    } else if lower.starts_with("http%3a") || lower.starts_with("https%3a") {
        urlencoding::decode(url_param)
            .map(|s| s.into_owned())
            .map_err(|_| Error::BadRequest("Invalid URL encoding".to_string()))?
    } else {
        let bytes = URL_SAFE_NO_PAD
            .decode(url_param.trim_end_matches('='))
            .map_err(|_| Error::BadRequest("Invalid URL encoding".to_string()))?;
        String::from_utf8(bytes)
            .map_err(|_| Error::BadRequest("Invalid URL encoding".to_string()))?
    };

    parse_http_url(&decoded)
}

pub fn parse_http_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw).map_err(|_| Error::BadRequest("Invalid URL format".to_string()))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(Error::BadRequest("Invalid URL format".to_string())),
    }
}

fn is_non_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier grade nat
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_non_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_non_public_v4(v4);
    }

    let first = ip.segments()[0];

    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// loopback, private, link-local, unspecified or otherwise not reachable on the public internet
pub fn is_non_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_non_public_v4(v4),
        IpAddr::V6(v6) => is_non_public_v6(v6),
    }
}

/// resolves the target host and refuses it when any address is non public
pub async fn ensure_public_target(url: &Url) -> AppResult<()> {
    let refused = || Error::Forbidden("Relay target is not a public address".to_string());

    let addresses: Vec<IpAddr> = match url.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        Some(Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|_| Error::BadRequest(format!("Could not resolve host: {}", domain)))?
                .map(|addr| addr.ip())
                .collect()
        }
        None => return Err(Error::BadRequest("Invalid URL format".to_string())),
    };

    if addresses.is_empty() || addresses.into_iter().any(is_non_public_address) {
        return Err(refused());
    }

    Ok(())
}

pub fn encode_target_url(url: &Url) -> String {
    URL_SAFE_NO_PAD.encode(url.as_str().as_bytes())
}

/// the subset of client headers that go upstream
pub fn forward_request_headers(client_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for name in FORWARDED_REQUEST_HEADERS {
        for value in client_headers.get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }

    headers
}

/// upstream response headers minus hop-by-hop, cookies and upstream cors
pub fn copy_response_headers(upstream: &HeaderMap) -> HeaderMap {
    // anything listed in Connection is hop-by-hop for this response too
    let connection_listed: Vec<String> = upstream
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();

    let mut headers = HeaderMap::new();

    for (name, value) in upstream {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower)
            || connection_listed.iter().any(|listed| listed == lower)
            || *name == header::SET_COOKIE
            || lower.starts_with("access-control-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers
}

pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(CORS_EXPOSE_HEADERS),
    );
}
