//! Bearer authentication middleware
//!
//! Resolves the `Authorization: Bearer <token>` header to a user through the
//! sessions table and hands the user to handlers as an [`AuthUser`]
//! extension. Requests without a known token get 401.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::db::SessionRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// The user behind the request's bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

fn bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response> {
    let token = bearer_token(&req).ok_or(AppError::Unauthorized)?;
    let user_id = SessionRepository::new(state.db())
        .user_for_token(&token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
