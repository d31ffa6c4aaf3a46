//! Annotation API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};

use super::auth::AuthUser;
use super::DocumentQuery;
use crate::cfi;
use crate::db::AnnotationRepository;
use crate::error::{AppError, Result};
use crate::remote::{AnnotationRecord, NewAnnotation};
use crate::state::AppState;

/// Create the annotations router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/annotations", get(list_annotations).post(create_annotation))
        .route("/annotations/:id", delete(delete_annotation))
}

async fn list_annotations(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Vec<AnnotationRecord>>> {
    let repo = AnnotationRepository::new(state.db());
    let annotations = repo.list(&user_id, &query.document_id).await?;
    Ok(Json(annotations))
}

async fn create_annotation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(annotation): Json<NewAnnotation>,
) -> Result<(StatusCode, Json<AnnotationRecord>)> {
    if annotation.document_id.trim().is_empty() {
        return Err(AppError::BadRequest("documentId is required".to_string()));
    }
    if annotation.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }
    let address = cfi::parse(&annotation.range_address)
        .map_err(|e| AppError::BadRequest(format!("Invalid rangeAddress: {}", e)))?;
    if !address.is_range() {
        return Err(AppError::BadRequest("rangeAddress must be a range".to_string()));
    }

    let repo = AnnotationRepository::new(state.db());
    let created = repo.create(&user_id, &annotation).await?;
    tracing::debug!("Created annotation {} for {}", created.id, user_id);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_annotation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let repo = AnnotationRepository::new(state.db());
    if repo.delete(&user_id, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Annotation not found: {}", id)))
    }
}
