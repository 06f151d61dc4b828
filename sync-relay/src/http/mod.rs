//! HTTP endpoints for the relay.
//!
//! Lobby creation and info, the control-channel WebSocket, health checks
//! and metrics.

pub mod health;
pub mod lobbies;
mod metrics;
pub mod ws;

use crate::server::LobbyRelay;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use health::HealthStatus;
pub use lobbies::{CreateLobbyRequest, CreateLobbyResponse};

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<LobbyRelay>) -> Router {
    Router::new()
        .route("/lobbies", post(lobbies::create_lobby_handler))
        .route("/lobbies/:code", get(lobbies::lobby_info_handler))
        .route("/lobbies/:code/ws", get(ws::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OpenVerifier;
    use crate::config::Config;
    use crate::storage::SqliteStorage;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    async fn test_relay() -> Arc<LobbyRelay> {
        let storage = SqliteStorage::in_memory().await.unwrap();
        Arc::new(LobbyRelay::new(
            Config::default(),
            storage,
            Arc::new(OpenVerifier::new(60)),
        ))
    }

    fn create(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/lobbies")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["lobbies"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_relay().await);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_lobby_returns_201_with_code() {
        let app = build_router(test_relay().await);

        let response = app.oneshot(create(Some("alice"), "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json(response).await;
        assert_eq!(body["code"].as_str().unwrap().len(), 6);
        assert!(body["createdAt"].as_u64().is_some());
    }

    #[tokio::test]
    async fn create_lobby_requires_credential() {
        let app = build_router(test_relay().await);
        let response = app.oneshot(create(None, "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn create_with_code_owned_by_other_identity_conflicts() {
        let relay = test_relay().await;
        let app = build_router(relay);

        let first = app
            .clone()
            .oneshot(create(Some("alice"), r#"{"code":"abc234"}"#))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let created = json(first).await;
        assert_eq!(created["code"], "ABC234");

        let again = app
            .clone()
            .oneshot(create(Some("alice"), r#"{"code":"ABC234"}"#))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CREATED);
        assert_eq!(json(again).await["createdAt"], created["createdAt"]);

        let other = app
            .oneshot(create(Some("mallory"), r#"{"code":"ABC234"}"#))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_with_bad_code_is_400() {
        let app = build_router(test_relay().await);
        let response = app
            .oneshot(create(Some("alice"), r#"{"code":"O0O0O0"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn info_returns_lobby_or_404() {
        let relay = test_relay().await;
        let app = build_router(relay.clone());

        let response = app
            .clone()
            .oneshot(create(Some("alice"), r#"{"code":"XYZ789"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/lobbies/xyz789").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info = json(response).await;
        assert_eq!(info["code"], "XYZ789");
        assert_eq!(info["capacity"], 6);
        assert_eq!(info["suspended"], false);
        assert_eq!(info["members"].as_array().unwrap().len(), 0);

        let response = app
            .oneshot(Request::builder().uri("/lobbies/ABC234").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
