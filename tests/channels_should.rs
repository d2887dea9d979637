mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};

use common::{TEST_USER_AGENT, body_json, default_app, get, json_request, send};

const OWNER: &str = "user-123";

fn owned(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-owner-id", OWNER.parse().unwrap());
    request
}

fn hls_channel(name: &str) -> Value {
    json!({
        "name": name,
        "manifestUri": "https://cdn.example.com/live/index.m3u8",
        "type": "hls",
        "logo": "https://cdn.example.com/logo.png"
    })
}

#[tokio::test]
async fn add_and_list_channels_newest_first() {
    let app = default_app();

    let response = send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("First")))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = body_json(response).await;
    assert_eq!(first["category"], "Custom");
    assert!(first["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(first["createdAt"].as_str().is_some());

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let response = send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("Second")))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, owned(get("/api/v1/channels"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let names: Vec<String> = body_json(response)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Second", "First"]);
}

#[tokio::test]
async fn keep_owners_apart() {
    let app = default_app();

    send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("Mine")))).await;

    // anonymous callers get their own namespace
    let response = send(&app, get("/api/v1/channels")).await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn reject_duplicate_names() {
    let app = default_app();

    send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("News")))).await;
    let response = send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("News")))).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reject_blank_required_fields() {
    let app = default_app();
    let mut input = hls_channel("  ");
    input["logo"] = json!("");

    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert!(body["details"]["name"].is_array());
    assert!(body["details"]["logo"].is_array());
}

#[tokio::test]
async fn name_missing_and_mistyped_fields() {
    let app = default_app();

    let mut input = hls_channel("News");
    input.as_object_mut().unwrap().remove("name");
    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "validation failed");
    assert!(body["details"]["name"].is_array());

    let mut input = hls_channel("News");
    input["type"] = json!("rtmp");
    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["details"]["type"].is_array());
}

#[tokio::test]
async fn keep_malformed_json_a_bad_request() {
    let app = default_app();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/channels")
        .header(header::USER_AGENT, TEST_USER_AGENT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = send(&app, owned(request)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/channels")
        .header(header::USER_AGENT, TEST_USER_AGENT)
        .body(Body::from(hls_channel("News").to_string()))
        .unwrap();
    let response = send(&app, owned(request)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn parse_clear_keys_for_dash_channels() {
    let app = default_app();
    let input = json!({
        "name": "Sports",
        "manifestUri": "https://cdn.example.com/sports.mpd",
        "type": "mpd",
        "logo": "https://cdn.example.com/logo.png",
        "clearKey": " 436b69f987924fcbbc06d40a69c2799a : c63d5b0d7e52335b61aeba4f6537d54d "
    });

    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await["clearKey"],
        json!({ "436b69f987924fcbbc06d40a69c2799a": "c63d5b0d7e52335b61aeba4f6537d54d" })
    );

    let bad = json!({
        "name": "Broken",
        "manifestUri": "https://cdn.example.com/broken.mpd",
        "type": "mpd",
        "logo": "https://cdn.example.com/logo.png",
        "clearKey": "no-separator"
    });
    let response = send(&app, owned(json_request("POST", "/api/v1/channels", bad))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn ignore_clear_keys_for_other_types() {
    let app = default_app();
    let mut input = hls_channel("Plain");
    input["clearKey"] = json!("aa:bb");

    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(body_json(response).await.get("clearKey").is_none());
}

#[tokio::test]
async fn derive_youtube_embeds() {
    let app = default_app();
    let input = json!({
        "name": "Live Music",
        "manifestUri": "https://www.youtube.com/channel/UC4R8DWoMoI7CAwX8_LjQHig",
        "type": "youtube",
        "logo": "https://cdn.example.com/logo.png"
    });

    let response = send(&app, owned(json_request("POST", "/api/v1/channels", input))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let channel = body_json(response).await;
    assert_eq!(
        channel["embedUrl"],
        "https://www.youtube.com/embed/live_stream?channel=UC4R8DWoMoI7CAwX8_LjQHig"
    );
    assert_eq!(channel["youtubeChannelId"], "UC4R8DWoMoI7CAwX8_LjQHig");
    assert_eq!(channel["hasMultipleStreams"], true);
}

#[tokio::test]
async fn update_merges_and_keeps_identity() {
    let app = default_app();

    let created = body_json(
        send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("Old Name")))).await,
    )
    .await;

    let response = send(
        &app,
        owned(json_request(
            "PUT",
            "/api/v1/channels/Old%20Name",
            json!({ "name": "New Name", "category": "News" }),
        )),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await;
    assert_eq!(updated["name"], "New Name");
    assert_eq!(updated["category"], "News");
    assert_eq!(updated["manifestUri"], created["manifestUri"]);
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let names: Vec<Value> = body_json(send(&app, owned(get("/api/v1/channels"))).await)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("New Name")]);
}

#[tokio::test]
async fn refuse_renames_onto_existing_channels() {
    let app = default_app();

    send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("One")))).await;
    send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("Two")))).await;

    let response = send(
        &app,
        owned(json_request("PUT", "/api/v1/channels/One", json!({ "name": "Two" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &app,
        owned(json_request("PUT", "/api/v1/channels/Missing", json!({ "category": "x" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = default_app();

    send(&app, owned(json_request("POST", "/api/v1/channels", hls_channel("Gone")))).await;

    for _ in 0..2 {
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/channels/Gone")
            .header(header::USER_AGENT, TEST_USER_AGENT)
            .body(Body::empty())
            .unwrap();
        let response = send(&app, owned(request)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = send(&app, owned(get("/api/v1/channels"))).await;
    assert_eq!(body_json(response).await, json!([]));
}
