//! Rendering
//!
//! Lays a [`Document`](crate::epub::Document) out against a [`TextSurface`]
//! in paginated or continuous-scroll mode, tracks the resting position and
//! paints decorations and the current selection.

mod layout;
mod renderer;
mod surface;
mod theme;

use serde::{Deserialize, Serialize};

use crate::cfi::TextPoint;

pub use layout::{Layout, Line, Page};
pub use renderer::{Decoration, DecorationStyle, Renderer, RendererEvent, RendererState};
pub use surface::{Frame, HeadlessSurface, PaintedLine, PaintedSpan, TextSurface, Viewport};
pub use theme::{
    DisplayPreferences, LayoutMode, TextStyle, Theme, ThemeColors, BASE_FONT_SIZE,
    MAX_FONT_SIZE_STEP, MIN_FONT_SIZE_STEP,
};

/// A span of rendered text within one section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderedRange {
    pub section: usize,
    /// First character, inclusive
    pub start: usize,
    /// Last character, exclusive
    pub end: usize,
}

impl RenderedRange {
    pub fn new(section: usize, start: usize, end: usize) -> Self {
        Self { section, start, end }
    }

    pub fn start_point(&self) -> TextPoint {
        TextPoint::new(self.section, self.start)
    }

    pub fn end_point(&self) -> TextPoint {
        TextPoint::new(self.section, self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Overlap with `start..end` of the same section
    pub fn intersect(&self, section: usize, start: usize, end: usize) -> Option<(usize, usize)> {
        if section != self.section {
            return None;
        }
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        (lo < hi).then_some((lo, hi))
    }
}
