//! User annotations
//!
//! Highlights and emphasis over text ranges, addressed by range CFIs with a
//! snapshot of the covered text for re-anchoring.

mod store;
mod types;

pub use store::{anchor, AnnotationStore};
pub use types::{Annotation, AnnotationKind, AnnotationView, DEFAULT_HIGHLIGHT_COLOR};
