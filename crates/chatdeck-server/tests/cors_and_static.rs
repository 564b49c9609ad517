use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chatdeck_db::{create_memory_pool, run_migrations};
use chatdeck_server::{app, config::Config, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn build_app(widget_dir: &str) -> Router {
    let pool = create_memory_pool().unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    let mut config = Config::default();
    config.server.widget_dir = widget_dir.to_string();
    app(AppState::new(pool, &config))
}

#[tokio::test]
async fn preflight_is_answered_on_every_route() {
    let app = build_app("/nonexistent/chatdeck-widget");

    for uri in ["/api/chatbots", "/api/chat", "/api/chatbots/abc/messages", "/api/transcribe"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(uri)
                    .header(header::ORIGIN, "https://shop.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{uri}");
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }
}

#[tokio::test]
async fn responses_allow_any_origin() {
    let app = build_app("/nonexistent/chatdeck-widget");

    let ok = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/chatbots")
                .header(header::ORIGIN, "https://shop.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(ok.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let missing = app
        .oneshot(
            Request::builder()
                .uri("/api/chatbots/missing")
                .header(header::ORIGIN, "https://shop.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn health_reports_version() {
    let app = build_app("/nonexistent/chatdeck-widget");
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn widget_bundle_is_served_when_present() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("embed.js"), "window.chatdeck = {};").unwrap();
    let app = build_app(dir.path().to_str().unwrap());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/embed.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"window.chatdeck = {};");

    let response = app
        .oneshot(Request::builder().uri("/missing.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
