//! Annotation store
//!
//! Keeps the annotations for one (user, document), persists them through the
//! remote API when there is one, and places them on the renderer. An
//! annotation whose address no longer matches its text is re-anchored by
//! searching for the text; one that cannot be found stays listed but is not
//! drawn.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::types::{Annotation, AnnotationKind, AnnotationView, DEFAULT_HIGHLIGHT_COLOR};
use crate::cfi::{self, Cfi};
use crate::epub::Document;
use crate::error::{ReaderError, ReaderResult};
use crate::remote::{AnnotationRecord, NewAnnotation, PersistenceApi};
use crate::render::{RenderedRange, Renderer};

pub struct AnnotationStore {
    document_id: String,
    user_id: String,
    remote: Option<Arc<dyn PersistenceApi>>,
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new(
        document_id: impl Into<String>,
        user_id: impl Into<String>,
        remote: Option<Arc<dyn PersistenceApi>>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            user_id: user_id.into(),
            remote,
            annotations: Vec::new(),
        }
    }

    /// Cached annotations, oldest first
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn from_record(&self, record: AnnotationRecord) -> Annotation {
        Annotation {
            id: record.id,
            document_id: self.document_id.clone(),
            user_id: self.user_id.clone(),
            range_address: record.range_address,
            text: record.text,
            kind: record.kind,
            color: record.color,
            created_at: record.created_at,
        }
    }

    /// Refresh from the remote store and decorate everything that resolves
    ///
    /// When the remote store is unreachable the cached list is used.
    pub async fn list(&mut self, document: &Document, renderer: &mut Renderer) -> Vec<AnnotationView> {
        if let Some(remote) = self.remote.clone() {
            match remote.list_annotations(&self.document_id).await {
                Ok(records) => {
                    let mut annotations: Vec<Annotation> =
                        records.into_iter().map(|r| self.from_record(r)).collect();
                    annotations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                    // Drop decorations for annotations removed elsewhere
                    for stale in &self.annotations {
                        renderer.remove_decoration(&stale.id);
                    }
                    self.annotations = annotations;
                }
                Err(e) => tracing::warn!("Listing annotations failed, using cached copy: {}", e),
            }
        }
        self.views(document, renderer)
    }

    /// Place every cached annotation on the renderer
    pub fn views(&self, document: &Document, renderer: &mut Renderer) -> Vec<AnnotationView> {
        self.annotations
            .iter()
            .map(|annotation| {
                let view = anchor(document, annotation);
                if let Some(range) = view.resolved {
                    decorate(document, renderer, annotation, &range);
                } else {
                    tracing::debug!("Annotation {} is unresolvable", annotation.id);
                }
                view
            })
            .collect()
    }

    pub async fn create(
        &mut self,
        document: &Document,
        renderer: &mut Renderer,
        range: &RenderedRange,
        text: &str,
        kind: AnnotationKind,
        color: Option<String>,
    ) -> ReaderResult<Annotation> {
        if range.is_empty() || text.trim().is_empty() {
            return Err(ReaderError::EmptySelection);
        }
        let address = cfi::from_selection(document, range)?;
        let color = match kind {
            AnnotationKind::Highlight => {
                Some(color.unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string()))
            }
            AnnotationKind::Emphasis => None,
        };

        let annotation = match self.remote.as_ref() {
            Some(remote) => {
                let record = remote
                    .create_annotation(&NewAnnotation {
                        document_id: self.document_id.clone(),
                        range_address: address.to_string(),
                        text: text.to_string(),
                        kind,
                        color,
                    })
                    .await?;
                self.from_record(record)
            }
            None => Annotation {
                id: Uuid::new_v4().to_string(),
                document_id: self.document_id.clone(),
                user_id: self.user_id.clone(),
                range_address: address.to_string(),
                text: text.to_string(),
                kind,
                color,
                created_at: Utc::now(),
            },
        };

        tracing::debug!("Created {} {} at {}", kind.as_str(), annotation.id, address);
        decorate(document, renderer, &annotation, range);
        self.annotations.push(annotation.clone());
        Ok(annotation)
    }

    /// Remove an annotation; deleting one that is already gone succeeds
    pub async fn delete(&mut self, renderer: &mut Renderer, id: &str) -> ReaderResult<()> {
        if let Some(remote) = self.remote.as_ref() {
            match remote.delete_annotation(id).await {
                Ok(()) => {}
                Err(ReaderError::AnnotationNotFound(_)) => {
                    tracing::debug!("Annotation {} already deleted", id);
                }
                Err(e) => return Err(e),
            }
        }
        self.annotations.retain(|a| a.id != id);
        renderer.remove_decoration(id);
        Ok(())
    }

    /// Address to navigate to for "jump to annotation"
    pub fn jump_target(&self, document: &Document, id: &str) -> ReaderResult<Cfi> {
        let annotation = self
            .annotations
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ReaderError::AnnotationNotFound(id.to_string()))?;
        let range = anchor(document, annotation).resolved.ok_or_else(|| {
            ReaderError::ResolutionFailed(format!("annotation {} cannot be placed", id))
        })?;
        cfi::from_point(document, &range.start_point())
    }
}

fn decorate(document: &Document, renderer: &mut Renderer, annotation: &Annotation, range: &RenderedRange) {
    let result = cfi::from_selection(document, range)
        .and_then(|address| renderer.add_decoration(annotation.id.clone(), &address, annotation.decoration_style()));
    if let Err(e) = result {
        tracing::warn!("Could not decorate annotation {}: {}", annotation.id, e);
    }
}

/// Locate `annotation` in `document`
pub fn anchor(document: &Document, annotation: &Annotation) -> AnnotationView {
    let parsed = cfi::parse(&annotation.range_address).ok();

    if let Some(range) = parsed.as_ref().and_then(|address| stored_range(document, address)) {
        let matches = document
            .section(range.section)
            .map(|s| s.tree.slice(range.start..range.end) == annotation.text)
            .unwrap_or(false);
        if matches {
            return AnnotationView {
                annotation: annotation.clone(),
                resolved: Some(range),
                reanchored: false,
            };
        }
    }

    let preferred = parsed.as_ref().and_then(Cfi::spine_index);
    let resolved = search(document, &annotation.text, preferred);
    if resolved.is_some() {
        tracing::debug!("Re-anchored annotation {} by its text", annotation.id);
    }
    AnnotationView {
        annotation: annotation.clone(),
        resolved,
        reanchored: resolved.is_some(),
    }
}

fn stored_range(document: &Document, address: &Cfi) -> Option<RenderedRange> {
    let target = cfi::resolve(document, address).ok()?;
    let (start, end) = (target.start(), target.end());
    (start.section == end.section).then(|| RenderedRange::new(start.section, start.offset, end.offset))
}

/// First occurrence of `needle`, looking in `preferred` before the rest
fn search(document: &Document, needle: &str, preferred: Option<usize>) -> Option<RenderedRange> {
    if needle.is_empty() {
        return None;
    }
    let order = preferred
        .into_iter()
        .chain((0..document.sections.len()).filter(|i| Some(*i) != preferred));

    for index in order {
        let Some(section) = document.section(index) else {
            continue;
        };
        if let Some(byte) = section.text().find(needle) {
            let start = section.text()[..byte].chars().count();
            return Some(RenderedRange::new(index, start, start + needle.chars().count()));
        }
    }
    None
}
