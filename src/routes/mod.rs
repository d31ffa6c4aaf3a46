//! Route modules for the persistence API

pub mod annotations;
pub mod auth;
pub mod health;
pub mod progress;

use axum::{middleware, routing::get, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// `?documentId=` query shared by the document-scoped endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub document_id: String,
}

/// Full application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .merge(progress::router())
        .merge(annotations::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum_test::TestServer;

    use super::create_router;
    use crate::db::{connect_in_memory, SessionRepository};
    use crate::state::AppState;

    pub const TOKEN: &str = "tok-reader";
    pub const OTHER_TOKEN: &str = "tok-other";

    /// Server with two registered users, `u1` and `u2`
    pub async fn server() -> TestServer {
        let pool = connect_in_memory().await.unwrap();
        let sessions = SessionRepository::new(&pool);
        sessions.create("u1", TOKEN).await.unwrap();
        sessions.create("u2", OTHER_TOKEN).await.unwrap();
        TestServer::new(create_router(AppState::new(pool))).unwrap()
    }

    pub fn bearer(token: &str) -> axum::http::HeaderValue {
        axum::http::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_health_is_public() {
        let pool = connect_in_memory().await.unwrap();
        let app = create_router(AppState::new(pool));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_bearer() {
        let server = test_support::server().await;

        server
            .get("/api/v1/reading-position")
            .add_query_param("documentId", "doc")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/api/v1/annotations")
            .add_query_param("documentId", "doc")
            .add_header(axum::http::header::AUTHORIZATION, test_support::bearer("unknown"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
