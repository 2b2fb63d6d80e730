//! Gateway tests with a mock upstream registry

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use std::sync::Arc;
use tag_guard::config::{PolicyConfig, TagPolicyConfig, UpstreamConfig};
use tag_guard::filter::TagFilter;
use tag_guard::policy::{PolicySet, PolicyStore};
use tag_guard::proxy::UpstreamClient;
use tag_guard::server;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Gateway in front of `upstream_url` with a whitelist on `team/app`
fn gateway(upstream_url: &str) -> Router {
    let mut config = PolicyConfig::new();
    config.insert(
        "team/app".to_string(),
        TagPolicyConfig {
            black_list: vec!["^latest$".to_string()],
            white_list: vec!["^v[0-9]".to_string()],
        },
    );
    let policies = PolicySet::new(&config).unwrap();
    let filter = TagFilter::new(Arc::new(PolicyStore::new(policies)));

    let upstream = UpstreamClient::new(&UpstreamConfig {
        url: upstream_url.to_string(),
        timeout_secs: 5,
        verify_ssl: true,
    })
    .unwrap();

    server::router(filter, Arc::new(upstream))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_allowed_push_is_forwarded() {
    let mock_server = MockServer::start().await;
    let manifest = r#"{"schemaVersion":2}"#;

    Mock::given(method("PUT"))
        .and(path("/v2/team/app/manifests/v1.0"))
        .and(header_is("content-type", "application/vnd.oci.image.manifest.v1+json"))
        .and(header_is("x-forwarded-host", "registry.example.com"))
        .and(body_string(manifest))
        .respond_with(
            ResponseTemplate::new(201).insert_header("docker-content-digest", "sha256:abc"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v2/team/app/manifests/v1.0")
        .header(header::HOST, "registry.example.com")
        .header(
            header::CONTENT_TYPE,
            "application/vnd.oci.image.manifest.v1+json",
        )
        .body(Body::from(manifest))
        .unwrap();

    let response = gateway(&mock_server.uri()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("docker-content-digest").unwrap(),
        "sha256:abc"
    );
}

#[tokio::test]
async fn test_rejected_push_never_reaches_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = gateway(&mock_server.uri());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v2/team/app/manifests/latest")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(
        body_text(response).await,
        "The image tag is in blackList. Any push request is prohibited."
    );

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v2/team/app/manifests/dev-1")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(
        body_text(response).await,
        "The image tag is not in whiteList. Any push request is prohibited."
    );
}

#[tokio::test]
async fn test_percent_encoded_tag_never_reaches_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v2/team/app/manifests/%6Catest")
        .body(Body::from("{}"))
        .unwrap();
    let response = gateway(&mock_server.uri()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(
        body_text(response).await,
        "The image tag is in blackList. Any push request is prohibited."
    );
}

#[tokio::test]
async fn test_reads_are_forwarded_with_query() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/team/app/tags/list"))
        .and(query_param("n", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tags":["v1"]}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .uri("/v2/team/app/tags/list?n=5")
        .body(Body::empty())
        .unwrap();
    let response = gateway(&mock_server.uri()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"{"tags":["v1"]}"#);
}

#[tokio::test]
async fn test_upstream_redirects_are_passed_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/team/app/blobs/sha256:abc"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", "https://storage.example.com/blob"),
        )
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .uri("/v2/team/app/blobs/sha256:abc")
        .body(Body::empty())
        .unwrap();
    let response = gateway(&mock_server.uri()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://storage.example.com/blob"
    );
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Grab a free port and release it so nothing is listening there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let request = Request::builder()
        .uri("/v2/")
        .body(Body::empty())
        .unwrap();
    let response = gateway(&format!("http://127.0.0.1:{}", port))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_text(response).await.contains("Upstream registry unavailable"));
}

#[tokio::test]
async fn test_health_and_stats_endpoints() {
    let mock_server = MockServer::start().await;
    let app = gateway(&mock_server.uri());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/-/healthy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/v2/team/app/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    let response = app
        .oneshot(Request::builder().uri("/-/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(stats["inspected"], 1);
    assert_eq!(stats["denied_blacklist"], 1);
    assert_eq!(stats["projects"][0]["project"], "team/app");
    assert_eq!(stats["projects"][0]["denied"], 1);
}
