//! EPUB loading
//!
//! Reads an EPUB container into an immutable [`Document`]: the spine of content
//! sections (each parsed into a [`ContentTree`]), the table of contents with
//! resolved targets, and the package metadata.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cfi::Cfi;
use crate::error::{ReaderError, ReaderResult};

pub mod content;
mod parser;

#[cfg(test)]
pub(crate) mod fixtures;

pub use content::{ContentNode, ContentTree, ElementNode, TextChunk};
pub use parser::parse_container;

#[derive(Error, Debug)]
pub enum EpubError {
    #[error("Failed to read ZIP archive: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("XML parse error: {0}")]
    XmlError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub creators: Vec<String>,
    pub language: Option<String>,
    pub identifier: Option<String>,
}

/// One spine entry with its parsed content
#[derive(Debug, Clone)]
pub struct Section {
    /// Manifest id (the spine `idref`)
    pub id: String,
    /// Archive path of the content document
    pub href: String,
    pub linear: bool,
    pub content: Vec<u8>,
    pub tree: ContentTree,
}

impl Section {
    pub fn text(&self) -> &str {
        &self.tree.text
    }

    pub fn char_len(&self) -> usize {
        self.tree.char_len
    }
}

/// Table of contents entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub label: String,
    pub href: String,
    /// Resolved address; `None` when the href names no spine section
    pub target: Option<Cfi>,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Depth-first iteration over this entry and its descendants
    pub fn flatten(&self) -> Vec<&TocEntry> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// A loaded EPUB
#[derive(Debug, Clone)]
pub struct Document {
    pub metadata: BookMetadata,
    pub sections: Vec<Section>,
    pub toc: Vec<TocEntry>,
}

impl Document {
    /// Parse an EPUB held in memory
    pub fn from_bytes(data: &[u8]) -> Result<Self, EpubError> {
        parse_container(data)
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn section_by_id(&self, id: &str) -> Option<(usize, &Section)> {
        self.sections.iter().enumerate().find(|(_, s)| s.id == id)
    }

    pub fn section_by_href(&self, href: &str) -> Option<(usize, &Section)> {
        self.sections.iter().enumerate().find(|(_, s)| s.href == href)
    }

    /// Total characters across all sections
    pub fn char_len(&self) -> usize {
        self.sections.iter().map(Section::char_len).sum()
    }

    /// The TOC entry whose target is the last one at or before `point`
    pub fn toc_entry_for(&self, point: &crate::cfi::TextPoint) -> Option<&TocEntry> {
        let mut best: Option<(&TocEntry, crate::cfi::TextPoint)> = None;
        for entry in self.toc.iter().flat_map(|e| e.flatten()) {
            let Some(target) = entry.target.as_ref() else {
                continue;
            };
            let Ok(resolved) = crate::cfi::resolve(self, target) else {
                continue;
            };
            let start = resolved.start();
            if start <= *point && best.as_ref().map_or(true, |(_, b)| start >= *b) {
                best = Some((entry, start));
            }
        }
        best.map(|(entry, _)| entry)
    }
}

/// Load a document from a URL or filesystem path
///
/// `http://` and `https://` URLs are fetched, `file://` URLs and bare paths
/// are read from disk. Any failure is reported as
/// [`ReaderError::DocumentUnreadable`].
pub async fn load(url: &str) -> ReaderResult<Document> {
    let bytes = fetch(url).await?;
    tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);

    let document = tokio::task::spawn_blocking(move || Document::from_bytes(&bytes))
        .await
        .map_err(|e| ReaderError::DocumentUnreadable(format!("parse task failed: {}", e)))??;

    tracing::info!(
        "Loaded \"{}\": {} sections, {} toc entries",
        document.metadata.title,
        document.sections.len(),
        document.toc.len()
    );
    Ok(document)
}

async fn fetch(url: &str) -> ReaderResult<Vec<u8>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReaderError::DocumentUnreadable(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReaderError::DocumentUnreadable(e.to_string()))?;
        return Ok(bytes.to_vec());
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    tokio::fs::read(path)
        .await
        .map_err(|e| ReaderError::DocumentUnreadable(format!("{}: {}", path, e)))
}
