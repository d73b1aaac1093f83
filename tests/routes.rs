use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use party_lobby::{
    config::AppConfig,
    dao::lobby_store::memory::MemoryLobbyStore,
    routes,
    state::{AppState, credentials::MemoryCredentialStore},
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> axum::Router {
    let store = MemoryLobbyStore::new();
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(store.clone()),
        Arc::new(store.hub()),
        Arc::new(MemoryCredentialStore::default()),
    );
    routes::router(state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthcheck_reports_ok() {
    let response = app()
        .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn fresh_device_shows_home() {
    let response = app()
        .oneshot(Request::get("/view").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["view"]["screen"], "home");
    assert_eq!(body["role"], Value::Null);
}

#[tokio::test]
async fn host_controls_need_a_hosted_session() {
    let response = app()
        .oneshot(json_request("POST", "/host/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_session_then_read_links() {
    let app = app();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/host/sessions", json!({"language": "en"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let room_code = created["room_code"].as_str().unwrap().to_string();
    assert_eq!(created["view"]["view"]["screen"], "host_lobby");

    let response = app
        .oneshot(Request::get("/links").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let links = body_json(response).await;
    assert_eq!(links["room_code"], room_code.as_str());
    assert!(
        links["qr_url"]
            .as_str()
            .unwrap()
            .contains("size=300x300&data=http%3A%2F%2Flocalhost%3A5173%2Fjoin%2F")
    );
}

#[tokio::test]
async fn out_of_range_capacity_is_rejected() {
    let response = app()
        .oneshot(json_request("POST", "/host/sessions", json!({"max_players": 40})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_room_code_maps_to_invalid_code() {
    let response = app()
        .oneshot(json_request("POST", "/join/QQQQQQ", json!({"nickname": "Sam"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "invalid_code");
}
