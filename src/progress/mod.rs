//! Reading progress
//!
//! Persists where the reader is, locally on every save and remotely when a
//! credential is present, and decides where a reopened document starts.

mod cache;
mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cache::{FileCache, LocalCache, MemoryCache};
pub use tracker::{ProgressTracker, StartPosition, StartSource, DEFAULT_SAVE_INTERVAL};

/// Which store wins when both have a saved position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// This device's cache, falling back to the remote store
    #[default]
    LocalFirst,
    /// Whichever store saved last
    MostRecent,
}

impl std::str::FromStr for ResumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "local_first" | "local" => Ok(ResumePolicy::LocalFirst),
            "most_recent" | "recent" => Ok(ResumePolicy::MostRecent),
            other => Err(format!("unknown resume policy: {}", other)),
        }
    }
}

/// Identifies one saved position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub user_id: String,
    pub document_id: String,
}

impl PositionKey {
    pub fn new(user_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            document_id: document_id.into(),
        }
    }
}

/// Local cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub address: String,
    pub percentage: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// The saved position for one (user, document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    pub document_id: String,
    pub user_id: String,
    pub address: String,
    /// 0 to 100; `None` while the location index was still building
    pub percentage: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ReadingPosition {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.user_id.clone(), self.document_id.clone())
    }

    pub fn to_cache_entry(&self) -> CacheEntry {
        CacheEntry {
            address: self.address.clone(),
            percentage: self.percentage,
            timestamp: self.updated_at,
        }
    }
}
