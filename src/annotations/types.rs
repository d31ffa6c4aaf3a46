//! Annotation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::render::{DecorationStyle, RenderedRange};

/// Colour used when a highlight is created without one
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ffeb3b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Highlight,
    Emphasis,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Emphasis => "emphasis",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "highlight" => Some(AnnotationKind::Highlight),
            "emphasis" => Some(AnnotationKind::Emphasis),
            _ => None,
        }
    }
}

/// A stored annotation
///
/// Immutable once created; the only change is deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    /// Range address, kept as text so unparseable records survive a round trip
    pub range_address: String,
    /// Snapshot of the annotated text
    pub text: String,
    pub kind: AnnotationKind,
    /// Highlight colour; always `None` for emphasis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    pub fn decoration_style(&self) -> DecorationStyle {
        match self.kind {
            AnnotationKind::Highlight => DecorationStyle::Highlight {
                color: self
                    .color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string()),
            },
            AnnotationKind::Emphasis => DecorationStyle::Emphasis,
        }
    }
}

/// An annotation as seen against the live document
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationView {
    pub annotation: Annotation,
    /// Where the annotation currently sits; `None` when it cannot be placed
    pub resolved: Option<RenderedRange>,
    /// Set when the text was found somewhere other than the stored address
    pub reanchored: bool,
}

impl AnnotationView {
    pub fn is_resolvable(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn id(&self) -> &str {
        &self.annotation.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        for kind in [AnnotationKind::Highlight, AnnotationKind::Emphasis] {
            assert_eq!(AnnotationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AnnotationKind::parse("underline"), None);
        assert_eq!(
            serde_json::to_string(&AnnotationKind::Emphasis).unwrap(),
            "\"emphasis\""
        );
    }

    #[test]
    fn test_highlight_without_color_uses_default() {
        let annotation = Annotation {
            id: "a1".into(),
            document_id: "doc".into(),
            user_id: "u1".into(),
            range_address: "epubcfi(/6/2!/4/2,/1:0,/1:5)".into(),
            text: "Hello".into(),
            kind: AnnotationKind::Highlight,
            color: None,
            created_at: Utc::now(),
        };
        assert_eq!(
            annotation.decoration_style(),
            DecorationStyle::Highlight {
                color: DEFAULT_HIGHLIGHT_COLOR.into()
            }
        );
    }
}
