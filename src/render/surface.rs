//! Drawing surface abstraction
//!
//! The renderer lays text out against a [`TextSurface`] and hands it finished
//! frames. A windowing toolkit, a terminal or a test harness can sit behind
//! the trait.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::theme::{TextStyle, ThemeColors};

/// Frames kept by [`HeadlessSurface`]
const FRAME_HISTORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// One decorated span on a painted line, in section character offsets
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedSpan {
    pub decoration_id: String,
    pub start: usize,
    pub end: usize,
    /// CSS color for highlights, `None` for emphasis
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaintedLine {
    pub section: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Top of the line relative to the viewport
    pub y: f32,
    pub spans: Vec<PaintedSpan>,
    /// Part of the line is selected
    pub selected: Option<(usize, usize)>,
}

/// Everything visible in the viewport
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub colors: ThemeColors,
    pub style: TextStyle,
    pub lines: Vec<PaintedLine>,
}

pub trait TextSurface: Send {
    fn viewport(&self) -> Viewport;

    fn resize(&mut self, viewport: Viewport);

    /// Rendered width of `text` in pixels
    fn measure(&self, text: &str, style: &TextStyle) -> f32;

    fn line_height(&self, style: &TextStyle) -> f32;

    fn paint(&mut self, frame: &Frame);
}

/// Fixed-advance surface that records what it is asked to paint
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    viewport: Viewport,
    frames: Arc<Mutex<VecDeque<Frame>>>,
}

impl HeadlessSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            frames: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Most recent painted frame
    pub fn last_frame(&self) -> Option<Frame> {
        self.frames.lock().back().cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    fn advance(style: &TextStyle) -> f32 {
        let factor = match style.font_family.to_ascii_lowercase().as_str() {
            "monospace" | "mono" => 0.6,
            "sans-serif" | "sans" => 0.55,
            _ => 0.5,
        };
        style.font_size * factor
    }
}

impl TextSurface for HeadlessSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        text.chars().count() as f32 * Self::advance(style)
    }

    fn line_height(&self, style: &TextStyle) -> f32 {
        style.font_size * 1.5
    }

    fn paint(&mut self, frame: &Frame) {
        let mut frames = self.frames.lock();
        if frames.len() == FRAME_HISTORY {
            frames.pop_front();
        }
        frames.push_back(frame.clone());
    }
}
