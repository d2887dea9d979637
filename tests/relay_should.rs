mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use flame_edge::{
    AppConfig,
    server::{
        extractors::generate_client_id,
        services::rate_limit_services::{
            LocalRateLimitService, RateLimitConfig, RateLimitServiceTrait,
        },
        utils::signature_utils::SignatureUtil,
    },
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header as has_header, method, path},
};

use common::{
    TEST_USER_AGENT, body_bytes, body_json, default_app, get, json_request, send, test_app,
    test_app_with_rate_limit,
};

fn relay_uri(target: &str) -> String {
    format!("/api/v1/relay?url={}", urlencoding::encode(target))
}

fn assert_cors(response: &axum::http::Response<Body>) {
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(),
        "Content-Length, Content-Range, Accept-Ranges"
    );
}

#[tokio::test]
async fn relay_the_body_verbatim_with_passthrough_identity() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/index.m3u8"))
        .and(has_header("user-agent", TEST_USER_AGENT))
        .and(has_header("referer", "https://example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.apple.mpegurl")
                .insert_header("set-cookie", "session=secret")
                .insert_header("access-control-allow-origin", "https://upstream.example")
                .set_body_string("#EXTM3U\n#EXT-X-VERSION:3\n"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let app = default_app();
    let response = send(
        &app,
        get(&relay_uri(&format!("{}/live/index.m3u8", upstream.uri()))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.apple.mpegurl"
    );
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_bytes(response).await, b"#EXTM3U\n#EXT-X-VERSION:3\n");
}

#[tokio::test]
async fn relay_with_bilibili_identity() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seg.m4s"))
        .and(has_header("origin", "https://www.bilibili.tv"))
        .and(has_header("referer", "https://www.bilibili.tv/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 3]))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = default_app();
    let uri = format!(
        "{}&profile=bilibili",
        relay_uri(&format!("{}/seg.m4s", upstream.uri()))
    );
    let response = send(&app, get(&uri)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, vec![0u8, 1, 2, 3]);
}

#[tokio::test]
async fn forward_range_requests() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(has_header("range", "bytes=0-3"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-3/100")
                .insert_header("accept-ranges", "bytes")
                .set_body_string("abcd"),
        )
        .mount(&upstream)
        .await;

    let app = default_app();
    let request = Request::builder()
        .uri(relay_uri(&format!("{}/video.mp4", upstream.uri())))
        .header(header::RANGE, "bytes=0-3")
        .header(header::COOKIE, "mine=private")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get(header::CONTENT_RANGE).unwrap(),
        "bytes 0-3/100"
    );
    assert_eq!(body_bytes(response).await, b"abcd");

    let received = upstream.received_requests().await.unwrap();
    assert!(received[0].headers.get("cookie").is_none());
}

#[tokio::test]
async fn keep_the_upstream_failure_status() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/expired.m3u8"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("content-type", "text/plain")
                .set_body_string("gone"),
        )
        .mount(&upstream)
        .await;

    let app = default_app();
    let response = send(
        &app,
        get(&relay_uri(&format!("{}/expired.m3u8", upstream.uri()))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_cors(&response);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain");
    assert_eq!(body_bytes(response).await, b"gone");
}

#[tokio::test]
async fn report_transport_failures_as_json() {
    let app = default_app();
    // nothing listens on port 1
    let response = send(&app, get(&relay_uri("http://127.0.0.1:1/live.m3u8"))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to fetch the requested URL.");
    assert!(body["details"].as_str().is_some());
}

#[tokio::test]
async fn answer_head_without_a_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/seg.ts"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-segment", "7"))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = default_app();
    let request = Request::builder()
        .method("HEAD")
        .uri(relay_uri(&format!("{}/seg.ts", upstream.uri())))
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-segment").unwrap(), "7");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn answer_preflight_without_calling_upstream() {
    let app = default_app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/relay")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "GET, HEAD, OPTIONS"
    );
}

#[tokio::test]
async fn reject_a_missing_url() {
    let app = default_app();
    let response = send(&app, get("/api/v1/relay")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_cors(&response);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Please provide a URL parameter." })
    );
}

#[tokio::test]
async fn reject_bad_targets_and_profiles() {
    let app = default_app();

    let response = send(&app, get(&relay_uri("ftp://example.com/file"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        get(&format!("{}&profile=netflix", relay_uri("https://example.com/a.m3u8"))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn relay_signed_links_and_refuse_tampered_ones() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/signed.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
        .mount(&upstream)
        .await;

    let app = test_app(AppConfig {
        require_signed_relay: true,
        ..AppConfig::default()
    });
    let target = format!("{}/signed.m3u8", upstream.uri());

    // unsigned requests are refused outright
    let response = send(&app, get(&relay_uri(&target))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_cors(&response);

    let response = send(
        &app,
        json_request("POST", "/api/v1/relay/sign", json!({ "url": target, "ttl_hours": 2 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let signed = body_json(response).await;
    let path = signed["path"].as_str().unwrap().to_string();
    assert!(path.starts_with("/api/v1/relay?url="));
    assert!(signed["expires_at"].as_i64().unwrap() > chrono::Utc::now().timestamp());

    let response = send(&app, get(&path)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"#EXTM3U");

    let tampered = path.replace("sig=", "sig=00");
    let response = send(&app, get(&tampered)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // the link was signed for passthrough, it can't be replayed with another identity
    assert!(path.contains("profile=passthrough"));
    let reprofiled = path.replace("profile=passthrough", "profile=bilibili");
    let response = send(&app, get(&reprofiled)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refuse_links_whose_client_digits_were_moved_into_the_expiry() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
        .mount(&upstream)
        .await;

    let app = test_app(AppConfig {
        require_signed_relay: true,
        ..AppConfig::default()
    });
    let util = SignatureUtil::new(AppConfig::default().access_token_secret);
    let url = URL_SAFE_NO_PAD.encode(format!("{}/moved.m3u8", upstream.uri()));
    let link = |client: &str, exp: &str, sig: &str| {
        format!(
            "/api/v1/relay?url={}&profile=passthrough&sig={}&exp={}&client={}",
            url, sig, exp, client
        )
    };

    // a valid link for client "c0ffee1" works
    let live = SignatureUtil::generate_expiry(1);
    let signature = util.generate_signature("c0ffee1", live, &url, "passthrough");
    let response = send(&app, get(&link("c0ffee1", &live.to_string(), &signature))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // an expired one can't be revived by shifting the client's last digit into `exp`
    let expired = chrono::Utc::now().timestamp() - 60;
    let signature = util.generate_signature("c0ffee1", expired, &url, "passthrough");

    let response = send(&app, get(&link("c0ffee1", &expired.to_string(), &signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, get(&link("c0ffee", &format!("1{}", expired), &signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn check_the_url_before_the_signature() {
    let app = default_app();

    let response = send(&app, get("/api/v1/relay?sig=abcdef&exp=1234567890")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_cors(&response);
    assert_eq!(
        body_json(response).await["error"],
        "Please provide a URL parameter."
    );
}

#[tokio::test]
async fn answer_429_with_retry_after_once_the_window_is_spent() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seg.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ts"))
        .expect(1)
        .mount(&upstream)
        .await;

    let limiter = Arc::new(LocalRateLimitService::new(RateLimitConfig {
        max_requests_per_window: 1,
        window_seconds: 60,
        ..RateLimitConfig::default()
    }));
    let app = test_app_with_rate_limit(AppConfig::default(), limiter);
    let uri = relay_uri(&format!("{}/seg.ts", upstream.uri()));

    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_cors(&response);

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
}

#[tokio::test]
async fn answer_403_with_the_reason_while_timed_out() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let limiter = Arc::new(LocalRateLimitService::default());
    limiter
        .timeout_client(
            &generate_client_id(None, Some(TEST_USER_AGENT)),
            "Too many broken streams",
            60,
        )
        .await;
    let app = test_app_with_rate_limit(AppConfig::default(), limiter);

    let response = send(
        &app,
        get(&relay_uri(&format!("{}/seg.ts", upstream.uri()))),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_cors(&response);
    assert_eq!(body_json(response).await["error"], "Too many broken streams");
}

#[tokio::test]
async fn refuse_private_targets_when_asked_to() {
    // wiremock listens on loopback
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let app = test_app(AppConfig {
        relay_block_private_networks: true,
        ..AppConfig::default()
    });
    let target = format!("{}/live.m3u8", upstream.uri());

    let response = send(&app, get(&relay_uri(&target))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_cors(&response);

    let response = send(&app, get(&relay_uri("http://169.254.169.254/latest/meta-data"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        json_request("POST", "/api/v1/relay/sign", json!({ "url": target })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refuse_to_sign_invalid_requests() {
    let app = default_app();

    let response = send(
        &app,
        json_request("POST", "/api/v1/relay/sign", json!({ "url": "not a url" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(
        &app,
        json_request(
            "POST",
            "/api/v1/relay/sign",
            json!({ "url": "https://example.com/a.m3u8", "ttl_hours": 72 }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
