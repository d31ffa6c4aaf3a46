//! Reading position API routes

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};

use super::auth::AuthUser;
use super::DocumentQuery;
use crate::cfi;
use crate::db::PositionRepository;
use crate::error::{AppError, Result};
use crate::remote::{PositionRecord, PositionUpdate};
use crate::state::AppState;

/// Create the reading position router
pub fn router() -> Router<AppState> {
    Router::new().route("/reading-position", get(get_position).put(put_position))
}

/// Saved position, or `null` when the user has none for the document
async fn get_position(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Option<PositionRecord>>> {
    let repo = PositionRepository::new(state.db());
    let position = repo.get(&user_id, &query.document_id).await?;
    Ok(Json(position))
}

/// Overwrite the saved position
async fn put_position(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(update): Json<PositionUpdate>,
) -> Result<Json<PositionRecord>> {
    if update.document_id.trim().is_empty() {
        return Err(AppError::BadRequest("documentId is required".to_string()));
    }
    cfi::parse(&update.address)
        .map_err(|e| AppError::BadRequest(format!("Invalid address: {}", e)))?;
    if let Some(percentage) = update.percentage {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(AppError::BadRequest(format!(
                "percentage must be between 0 and 100, got {}",
                percentage
            )));
        }
    }

    let repo = PositionRepository::new(state.db());
    let position = repo.upsert(&user_id, &update).await?;
    tracing::debug!("Saved position for {} on {}: {}", user_id, update.document_id, position.address);
    Ok(Json(position))
}

#[cfg(test)]
mod tests {
    use axum::http::{header::AUTHORIZATION, StatusCode};
    use serde_json::json;

    use crate::remote::PositionRecord;
    use crate::routes::test_support::{bearer, server, OTHER_TOKEN, TOKEN};

    #[tokio::test]
    async fn test_get_returns_null_before_first_save() {
        let server = server().await;
        let response = server
            .get("/api/v1/reading-position")
            .add_query_param("documentId", "doc")
            .add_header(AUTHORIZATION, bearer(TOKEN))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Option<PositionRecord>>(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_is_per_user() {
        let server = server().await;
        for (address, percentage) in [("epubcfi(/6/2!/4/2/1:0)", 0.0), ("epubcfi(/6/4!/4/2/1:30)", 40.0)] {
            server
                .put("/api/v1/reading-position")
                .add_header(AUTHORIZATION, bearer(TOKEN))
                .json(&json!({ "documentId": "doc", "address": address, "percentage": percentage }))
                .await
                .assert_status_ok();
        }

        let saved = server
            .get("/api/v1/reading-position")
            .add_query_param("documentId", "doc")
            .add_header(AUTHORIZATION, bearer(TOKEN))
            .await
            .json::<Option<PositionRecord>>()
            .unwrap();
        assert_eq!(saved.address, "epubcfi(/6/4!/4/2/1:30)");
        assert_eq!(saved.percentage, Some(40.0));

        let other = server
            .get("/api/v1/reading-position")
            .add_query_param("documentId", "doc")
            .add_header(AUTHORIZATION, bearer(OTHER_TOKEN))
            .await
            .json::<Option<PositionRecord>>();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_put_rejects_bad_input() {
        let server = server().await;
        server
            .put("/api/v1/reading-position")
            .add_header(AUTHORIZATION, bearer(TOKEN))
            .json(&json!({ "documentId": "doc", "address": "page 12", "percentage": 10.0 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .put("/api/v1/reading-position")
            .add_header(AUTHORIZATION, bearer(TOKEN))
            .json(&json!({ "documentId": "doc", "address": "epubcfi(/6/2!/4/2/1:0)", "percentage": 140.0 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
