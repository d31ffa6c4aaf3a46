//! Persistence API client
//!
//! The reading engine stores positions and annotations through
//! [`PersistenceApi`]. Every call is scoped to the user behind the bearer
//! credential in the [`AuthContext`]; without a credential the engine runs
//! against its local cache only.

mod http;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::AnnotationKind;
use crate::error::ReaderResult;

pub use http::HttpPersistence;
pub use memory::InMemoryPersistence;

/// User identity and bearer credential supplied by the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    token: Option<String>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: Some(token.into()),
        }
    }

    /// A reader with no credential; positions stay on this device
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            token: None,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }
}

/// Stored reading position as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub address: String,
    pub percentage: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub document_id: String,
    pub address: String,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    pub id: String,
    pub range_address: String,
    pub text: String,
    pub kind: AnnotationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnotation {
    pub document_id: String,
    pub range_address: String,
    pub text: String,
    pub kind: AnnotationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Remote store for positions and annotations
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    /// Saved position for `document_id`, `None` if the user never read it
    async fn get_position(&self, document_id: &str) -> ReaderResult<Option<PositionRecord>>;

    /// Overwrite the saved position
    async fn put_position(&self, update: &PositionUpdate) -> ReaderResult<PositionRecord>;

    async fn list_annotations(&self, document_id: &str) -> ReaderResult<Vec<AnnotationRecord>>;

    async fn create_annotation(&self, annotation: &NewAnnotation) -> ReaderResult<AnnotationRecord>;

    /// Fails with [`ReaderError::AnnotationNotFound`](crate::error::ReaderError::AnnotationNotFound)
    /// when no such annotation exists
    async fn delete_annotation(&self, id: &str) -> ReaderResult<()>;
}

/// HTTP client for `base_url`, or `None` when the reader runs local-only
pub fn connect(base_url: Option<&str>, auth: &AuthContext) -> Option<Arc<dyn PersistenceApi>> {
    let base_url = base_url.filter(|u| !u.trim().is_empty())?;
    if !auth.is_authenticated() {
        tracing::debug!("No credential for {}, persistence is local-only", auth.user_id);
        return None;
    }
    HttpPersistence::new(base_url, auth).map(|client| Arc::new(client) as Arc<dyn PersistenceApi>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_bearer() {
        assert!(!AuthContext::anonymous().is_authenticated());
        assert!(!AuthContext::new("u1", "").is_authenticated());
        assert_eq!(AuthContext::new("u1", "tok").bearer(), Some("tok"));
    }

    #[test]
    fn test_connect_requires_url_and_credential() {
        let auth = AuthContext::new("u1", "tok");
        assert!(connect(None, &auth).is_none());
        assert!(connect(Some(""), &auth).is_none());
        assert!(connect(Some("http://localhost:3000"), &AuthContext::anonymous()).is_none());
        assert!(connect(Some("http://localhost:3000"), &auth).is_some());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let update = PositionUpdate {
            document_id: "doc-1".into(),
            address: "epubcfi(/6/2!/4/2/1:0)".into(),
            percentage: Some(12.5),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["documentId"], "doc-1");
        assert_eq!(json["percentage"], 12.5);

        let record: AnnotationRecord = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "rangeAddress": "epubcfi(/6/2!/4/2,/1:0,/1:5)",
            "text": "Hello",
            "kind": "emphasis",
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.kind, AnnotationKind::Emphasis);
        assert_eq!(record.color, None);
    }
}
