//! HTTP implementation of the persistence API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use super::{AnnotationRecord, AuthContext, NewAnnotation, PersistenceApi, PositionRecord, PositionUpdate};
use crate::error::{ReaderError, ReaderResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPersistence {
    /// Client for the API under `base_url`; `None` without a bearer credential
    pub fn new(base_url: &str, auth: &AuthContext) -> Option<Self> {
        let token = auth.bearer()?.to_string();
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client: {}", e);
                return None;
            }
        };
        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ReaderResult<Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(unavailable)
    }
}

fn unavailable(e: reqwest::Error) -> ReaderError {
    ReaderError::PersistenceUnavailable(e.to_string())
}

fn ensure_success(response: Response) -> ReaderResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ReaderError::PersistenceUnavailable(format!(
            "{} returned {}",
            response.url().path(),
            status
        )))
    }
}

#[async_trait]
impl PersistenceApi for HttpPersistence {
    async fn get_position(&self, document_id: &str) -> ReaderResult<Option<PositionRecord>> {
        let request = self
            .client
            .get(self.url("/reading-position"))
            .query(&[("documentId", document_id)]);
        let response = ensure_success(self.send(request).await?)?;
        response.json().await.map_err(unavailable)
    }

    async fn put_position(&self, update: &PositionUpdate) -> ReaderResult<PositionRecord> {
        let request = self.client.put(self.url("/reading-position")).json(update);
        let response = ensure_success(self.send(request).await?)?;
        response.json().await.map_err(unavailable)
    }

    async fn list_annotations(&self, document_id: &str) -> ReaderResult<Vec<AnnotationRecord>> {
        let request = self
            .client
            .get(self.url("/annotations"))
            .query(&[("documentId", document_id)]);
        let response = ensure_success(self.send(request).await?)?;
        response.json().await.map_err(unavailable)
    }

    async fn create_annotation(&self, annotation: &NewAnnotation) -> ReaderResult<AnnotationRecord> {
        let request = self.client.post(self.url("/annotations")).json(annotation);
        let response = ensure_success(self.send(request).await?)?;
        response.json().await.map_err(unavailable)
    }

    async fn delete_annotation(&self, id: &str) -> ReaderResult<()> {
        let path = format!("/annotations/{}", urlencoding::encode(id));
        let response = self.send(self.client.delete(self.url(&path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ReaderError::AnnotationNotFound(id.to_string()));
        }
        ensure_success(response)?;
        Ok(())
    }
}
