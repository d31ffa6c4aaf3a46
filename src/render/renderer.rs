//! Renderer state machine
//!
//! ```text
//! Unmounted ──mount──▶ Loading ──▶ Ready ◀──▶ Navigating
//!                                    │
//!                                 destroy ──▶ Destroyed
//! ```
//!
//! The renderer keeps a logical anchor, the [`TextPoint`] the reader is at.
//! Page and scroll offsets are derived from it after every layout, so font,
//! family or viewport changes never move the reader.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::layout::Layout;
use super::surface::{Frame, PaintedLine, PaintedSpan, TextSurface, Viewport};
use super::theme::{
    DisplayPreferences, LayoutMode, Theme, BASE_FONT_SIZE, FONT_SIZE_STEP_PX, MAX_FONT_SIZE_STEP, MIN_FONT_SIZE_STEP,
};
use super::RenderedRange;
use crate::cfi::{self, Cfi, TextPoint};
use crate::epub::Document;
use crate::error::{ReaderError, ReaderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Unmounted,
    Loading,
    Ready,
    Navigating,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// The view came to rest at a new position
    PositionChanged {
        address: Cfi,
        point: TextPoint,
        /// 0.0 to 1.0 through the current section
        section_progress: f64,
    },
    SelectionChanged(Option<RenderedRange>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationStyle {
    Highlight { color: String },
    Emphasis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub id: String,
    pub range: RenderedRange,
    pub style: DecorationStyle,
}

pub struct Renderer {
    surface: Box<dyn TextSurface>,
    state: RendererState,
    document: Option<Arc<Document>>,
    prefs: DisplayPreferences,
    layout: Option<Layout>,
    anchor: TextPoint,
    page: usize,
    scroll_top: f32,
    decorations: Vec<Decoration>,
    selection: Option<RenderedRange>,
    listeners: Vec<mpsc::UnboundedSender<RendererEvent>>,
}

impl Renderer {
    pub fn new(surface: impl TextSurface + 'static) -> Self {
        Self {
            surface: Box::new(surface),
            state: RendererState::Unmounted,
            document: None,
            prefs: DisplayPreferences::default(),
            layout: None,
            anchor: TextPoint::default(),
            page: 0,
            scroll_top: 0.0,
            decorations: Vec::new(),
            selection: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == RendererState::Ready
    }

    pub fn preferences(&self) -> &DisplayPreferences {
        &self.prefs
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.prefs.layout_mode
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RendererEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    /// Drop every subscriber; later events go nowhere
    pub fn detach_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Lay `document` out and show it at `start` (or its beginning)
    ///
    /// Mounting an already mounted renderer re-lays it out with the new
    /// preferences. An unresolvable `start` falls back to the document start.
    pub fn mount(
        &mut self,
        document: Arc<Document>,
        prefs: DisplayPreferences,
        start: Option<&Cfi>,
    ) -> ReaderResult<()> {
        if self.state == RendererState::Destroyed {
            return Err(ReaderError::NotReady);
        }
        self.state = RendererState::Loading;

        let anchor = match start.map(|cfi| cfi::resolve(&document, cfi)) {
            Some(Ok(target)) => target.start(),
            Some(Err(e)) => {
                tracing::warn!("Start position unusable, opening at the beginning: {}", e);
                TextPoint::default()
            }
            None => TextPoint::default(),
        };

        self.document = Some(document);
        self.prefs = prefs;
        self.selection = None;
        self.anchor = anchor;
        self.relayout();
        self.state = RendererState::Ready;

        tracing::debug!(
            "Mounted in {:?} mode at {}:{}",
            self.prefs.layout_mode,
            anchor.section,
            anchor.offset
        );
        self.emit_position();
        self.paint();
        Ok(())
    }

    /// Tear down; the renderer cannot be mounted again
    pub fn destroy(&mut self) {
        self.detach_listeners();
        self.state = RendererState::Destroyed;
        self.document = None;
        self.layout = None;
        self.decorations.clear();
        self.selection = None;
    }

    pub fn goto(&mut self, cfi: &Cfi) -> ReaderResult<()> {
        let document = self.ready_document()?;
        let target = cfi::resolve(&document, cfi)?;
        self.goto_point(target.start())
    }

    pub fn goto_point(&mut self, point: TextPoint) -> ReaderResult<()> {
        let document = self.ready_document()?;
        if document.section(point.section).map_or(true, |s| point.offset > s.char_len()) {
            return Err(ReaderError::ResolutionFailed(format!(
                "{}:{} is outside the document",
                point.section, point.offset
            )));
        }

        self.state = RendererState::Navigating;
        self.clear_selection_silently();
        self.anchor = point;
        self.sync_view_to_anchor();
        self.state = RendererState::Ready;

        self.emit_position();
        self.paint();
        Ok(())
    }

    /// Next page; paginated mode only. Returns whether the view moved.
    pub fn advance(&mut self) -> bool {
        self.turn_page(1)
    }

    /// Previous page; paginated mode only. Returns whether the view moved.
    pub fn retreat(&mut self) -> bool {
        self.turn_page(-1)
    }

    fn turn_page(&mut self, delta: isize) -> bool {
        if !self.is_ready() || self.prefs.layout_mode != LayoutMode::Paginated {
            return false;
        }
        let Some(layout) = self.layout.as_ref() else {
            return false;
        };
        let target = self.page as isize + delta;
        if target < 0 || target as usize >= layout.page_count() {
            return false;
        }

        self.state = RendererState::Navigating;
        self.page = target as usize;
        self.anchor = layout.pages()[self.page].start_point();
        self.clear_selection_silently();
        self.state = RendererState::Ready;

        self.emit_position();
        self.paint();
        true
    }

    /// Scroll the column by `dy` pixels; continuous mode only
    pub fn scroll_by(&mut self, dy: f32) -> bool {
        if !self.is_ready() || self.prefs.layout_mode != LayoutMode::Continuous {
            return false;
        }
        let Some(layout) = self.layout.as_ref() else {
            return false;
        };

        let max_scroll = (layout.content_height() - layout.viewport().height).max(0.0);
        let target = (self.scroll_top + dy).clamp(0.0, max_scroll);
        if (target - self.scroll_top).abs() < f32::EPSILON {
            return false;
        }

        self.state = RendererState::Navigating;
        self.scroll_top = target;
        let line = layout.lines()[layout.line_at_y(target)];
        self.anchor = TextPoint::new(line.section, line.start);
        self.clear_selection_silently();
        self.state = RendererState::Ready;

        self.emit_position();
        self.paint();
        true
    }

    /// Whether the continuous column is scrolled to the very top
    pub fn at_scroll_top(&self) -> bool {
        self.prefs.layout_mode == LayoutMode::Continuous && self.scroll_top <= 0.0
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.prefs.theme = theme;
        self.paint();
    }

    pub fn set_font_size_step(&mut self, step: i32) {
        self.prefs.font_size_step = step.clamp(MIN_FONT_SIZE_STEP, MAX_FONT_SIZE_STEP);
        self.reflow();
    }

    /// Nearest step to `px`
    pub fn set_font_size(&mut self, px: f32) {
        let step = ((px - BASE_FONT_SIZE) / FONT_SIZE_STEP_PX).round() as i32;
        self.set_font_size_step(step);
    }

    pub fn set_font_family(&mut self, family: impl Into<String>) {
        self.prefs.font_family = family.into();
        self.reflow();
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.surface.resize(viewport);
        self.reflow();
    }

    fn reflow(&mut self) {
        if self.document.is_none() || self.state == RendererState::Destroyed {
            return;
        }
        self.relayout();
        if self.is_ready() {
            self.emit_position();
            self.paint();
        }
    }

    pub fn current_point(&self) -> Option<TextPoint> {
        self.document.as_ref().map(|_| self.anchor)
    }

    pub fn current_address(&self) -> Option<Cfi> {
        let document = self.document.as_ref()?;
        cfi::from_point(document, &self.anchor).ok()
    }

    /// 1-based page number and page count; paginated mode only
    pub fn current_page(&self) -> Option<(usize, usize)> {
        if self.prefs.layout_mode != LayoutMode::Paginated {
            return None;
        }
        let layout = self.layout.as_ref()?;
        Some((self.page + 1, layout.page_count()))
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn add_decoration(&mut self, id: impl Into<String>, cfi: &Cfi, style: DecorationStyle) -> ReaderResult<()> {
        let document = self
            .document
            .as_ref()
            .ok_or(ReaderError::NotReady)?;
        let target = cfi::resolve(document, cfi)?;
        let (start, end) = (target.start(), target.end());
        if start.section != end.section {
            return Err(ReaderError::ResolutionFailed(format!("{} spans sections", cfi)));
        }

        let id = id.into();
        self.decorations.retain(|d| d.id != id);
        self.decorations.push(Decoration {
            id,
            range: RenderedRange::new(start.section, start.offset, end.offset),
            style,
        });
        self.paint();
        Ok(())
    }

    pub fn remove_decoration(&mut self, id: &str) -> bool {
        let before = self.decorations.len();
        self.decorations.retain(|d| d.id != id);
        let removed = self.decorations.len() != before;
        if removed {
            self.paint();
        }
        removed
    }

    pub fn clear_decorations(&mut self) {
        self.decorations.clear();
        self.paint();
    }

    pub fn decorations(&self) -> &[Decoration] {
        &self.decorations
    }

    /// Select characters `start..end` of `section`
    pub fn select(&mut self, section: usize, start: usize, end: usize) -> ReaderResult<RenderedRange> {
        let document = self.ready_document()?;
        let len = document
            .section(section)
            .map(|s| s.char_len())
            .ok_or_else(|| ReaderError::ResolutionFailed(format!("no section {}", section)))?;
        if start > end || end > len {
            return Err(ReaderError::ResolutionFailed(format!(
                "selection {}..{} outside section of {} characters",
                start, end, len
            )));
        }

        let range = RenderedRange::new(section, start, end);
        self.selection = Some(range);
        self.emit(RendererEvent::SelectionChanged(Some(range)));
        self.paint();
        Ok(range)
    }

    pub fn selection(&self) -> Option<RenderedRange> {
        self.selection
    }

    pub fn selected_text(&self) -> Option<String> {
        let range = self.selection?;
        let document = self.document.as_ref()?;
        let section = document.section(range.section)?;
        Some(section.tree.slice(range.start..range.end))
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.emit(RendererEvent::SelectionChanged(None));
            self.paint();
        }
    }

    fn clear_selection_silently(&mut self) {
        if self.selection.take().is_some() {
            self.emit(RendererEvent::SelectionChanged(None));
        }
    }

    fn ready_document(&self) -> ReaderResult<Arc<Document>> {
        if !self.is_ready() {
            return Err(ReaderError::NotReady);
        }
        self.document.clone().ok_or(ReaderError::NotReady)
    }

    fn relayout(&mut self) {
        let Some(document) = self.document.as_ref() else {
            return;
        };
        let style = self.prefs.text_style();
        self.layout = Some(Layout::compute(document, self.surface.as_ref(), &style));
        self.sync_view_to_anchor();
    }

    fn sync_view_to_anchor(&mut self) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        match self.prefs.layout_mode {
            LayoutMode::Paginated => {
                self.page = layout.page_for(&self.anchor);
                self.scroll_top = 0.0;
            }
            LayoutMode::Continuous => {
                let max_scroll = (layout.content_height() - layout.viewport().height).max(0.0);
                self.scroll_top = layout.line_top(layout.line_for(&self.anchor)).min(max_scroll);
                self.page = 0;
            }
        }
    }

    fn emit(&mut self, event: RendererEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_position(&mut self) {
        let Some(document) = self.document.as_ref() else {
            return;
        };
        let address = match cfi::from_point(document, &self.anchor) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("No address for current position: {}", e);
                return;
            }
        };
        let section_progress = document
            .section(self.anchor.section)
            .map(|s| match s.char_len() {
                0 => 0.0,
                len => self.anchor.offset as f64 / len as f64,
            })
            .unwrap_or(0.0);

        self.emit(RendererEvent::PositionChanged {
            address,
            point: self.anchor,
            section_progress,
        });
    }

    fn paint(&mut self) {
        if !self.is_ready() {
            return;
        }
        let (Some(document), Some(layout)) = (self.document.as_ref(), self.layout.as_ref()) else {
            return;
        };

        let visible: Vec<(usize, f32)> = match self.prefs.layout_mode {
            LayoutMode::Paginated => match layout.pages().get(self.page) {
                Some(page) => page
                    .lines
                    .clone()
                    .enumerate()
                    .map(|(row, line)| (line, row as f32 * layout.line_height()))
                    .collect(),
                None => Vec::new(),
            },
            LayoutMode::Continuous => {
                let bottom = self.scroll_top + layout.viewport().height;
                (layout.line_at_y(self.scroll_top)..layout.lines().len())
                    .take_while(|line| layout.line_top(*line) < bottom)
                    .map(|line| (line, layout.line_top(line) - self.scroll_top))
                    .collect()
            }
        };

        let lines = visible
            .into_iter()
            .map(|(index, y)| {
                let line = layout.lines()[index];
                let text = document
                    .section(line.section)
                    .map(|s| s.tree.slice(line.start..line.end))
                    .unwrap_or_default();
                let spans = self
                    .decorations
                    .iter()
                    .filter_map(|d| {
                        let (start, end) = d.range.intersect(line.section, line.start, line.end)?;
                        Some(PaintedSpan {
                            decoration_id: d.id.clone(),
                            start,
                            end,
                            color: match &d.style {
                                DecorationStyle::Highlight { color } => Some(color.clone()),
                                DecorationStyle::Emphasis => None,
                            },
                        })
                    })
                    .collect();
                PaintedLine {
                    section: line.section,
                    start: line.start,
                    end: line.end,
                    text,
                    y,
                    spans,
                    selected: self
                        .selection
                        .and_then(|s| s.intersect(line.section, line.start, line.end)),
                }
            })
            .collect();

        let frame = Frame {
            colors: self.prefs.theme.colors(),
            style: self.prefs.text_style(),
            lines,
        };
        self.surface.paint(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::fixtures;
    use crate::render::surface::HeadlessSurface;

    fn prefs(mode: LayoutMode) -> DisplayPreferences {
        DisplayPreferences {
            font_family: "monospace".into(),
            layout_mode: mode,
            ..Default::default()
        }
    }

    fn mounted(mode: LayoutMode) -> (Renderer, HeadlessSurface, Arc<Document>) {
        let surface = HeadlessSurface::new(Viewport::new(240.0, 240.0));
        let mut renderer = Renderer::new(surface.clone());
        let doc = Arc::new(fixtures::uniform_document(3, 2000));
        renderer.mount(doc.clone(), prefs(mode), None).unwrap();
        (renderer, surface, doc)
    }

    fn positions(rx: &mut mpsc::UnboundedReceiver<RendererEvent>) -> Vec<TextPoint> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RendererEvent::PositionChanged { point, .. } = event {
                out.push(point);
            }
        }
        out
    }

    #[test]
    fn test_state_transitions() {
        let mut renderer = Renderer::new(HeadlessSurface::new(Viewport::new(100.0, 100.0)));
        assert_eq!(renderer.state(), RendererState::Unmounted);
        assert!(!renderer.advance());
        assert_eq!(
            renderer.goto_point(TextPoint::default()),
            Err(ReaderError::NotReady)
        );

        let doc = Arc::new(fixtures::sample_document());
        renderer.mount(doc.clone(), prefs(LayoutMode::Paginated), None).unwrap();
        assert_eq!(renderer.state(), RendererState::Ready);

        renderer.destroy();
        assert_eq!(renderer.state(), RendererState::Destroyed);
        assert!(!renderer.advance());
        assert_eq!(
            renderer.mount(doc, prefs(LayoutMode::Paginated), None),
            Err(ReaderError::NotReady)
        );
    }

    #[test]
    fn test_paginated_advance_and_retreat() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        let mut rx = renderer.subscribe();

        assert_eq!(renderer.current_page().unwrap().0, 1);
        assert!(!renderer.retreat());
        assert!(renderer.advance());
        assert!(renderer.advance());
        assert_eq!(renderer.current_page().unwrap().0, 3);
        assert!(renderer.retreat());

        let seen = positions(&mut rx);
        assert_eq!(seen.len(), 3);
        assert!(seen[0] < seen[1]);
        assert!(seen[2] < seen[1]);
        assert!(!renderer.scroll_by(100.0));
    }

    #[test]
    fn test_last_page_cannot_advance() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        let (_, total) = renderer.current_page().unwrap();
        while renderer.advance() {}
        assert_eq!(renderer.current_page().unwrap(), (total, total));
        assert_eq!(renderer.current_point().unwrap().section, 2);
    }

    #[test]
    fn test_continuous_scroll_samples_position() {
        let (mut renderer, _, _) = mounted(LayoutMode::Continuous);
        let mut rx = renderer.subscribe();

        assert!(renderer.at_scroll_top());
        assert!(!renderer.advance());
        assert!(renderer.scroll_by(240.0));
        assert!(!renderer.at_scroll_top());
        assert!(renderer.scroll_by(240.0));
        assert!(renderer.scroll_by(-10_000.0));
        assert!(renderer.at_scroll_top());

        let seen = positions(&mut rx);
        assert_eq!(seen.len(), 3);
        assert!(seen[0] < seen[1]);
        assert_eq!(seen[2], TextPoint::default());
        assert!(renderer.current_page().is_none());
    }

    #[test]
    fn test_reflow_keeps_logical_position() {
        let (mut renderer, _, doc) = mounted(LayoutMode::Paginated);
        let target = TextPoint::new(1, 777);
        renderer.goto_point(target).unwrap();
        let address = renderer.current_address().unwrap();

        for step in [-2, 0, 3, 6] {
            renderer.set_font_size_step(step);
            assert_eq!(renderer.current_point(), Some(target));
        }
        renderer.set_font_family("serif");
        renderer.set_viewport(Viewport::new(500.0, 300.0));
        assert_eq!(renderer.current_address().unwrap(), address);

        // The visible page always contains the anchor
        let layout = renderer.layout().unwrap();
        let (page, _) = renderer.current_page().unwrap();
        let page = &layout.pages()[page - 1];
        assert_eq!(page.section, 1);
        assert!(page.start <= 777 && 777 <= page.end);
        assert_eq!(cfi::resolve(&doc, &address).unwrap().start(), target);
    }

    #[test]
    fn test_font_size_px_maps_to_steps() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        renderer.set_font_size(20.0);
        assert_eq!(renderer.preferences().font_size_step, 2);
        assert_eq!(renderer.preferences().font_size_px(), 20.0);
        renderer.set_font_size(100.0);
        assert_eq!(renderer.preferences().font_size_step, MAX_FONT_SIZE_STEP);
    }

    #[test]
    fn test_goto_unresolvable_address() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        let bad = cfi::parse("epubcfi(/6/40!/4/2/1:0)").unwrap();
        assert!(matches!(
            renderer.goto(&bad),
            Err(ReaderError::ResolutionFailed(_))
        ));
        assert_eq!(renderer.current_point(), Some(TextPoint::default()));
    }

    #[test]
    fn test_mount_with_bad_start_opens_at_beginning() {
        let surface = HeadlessSurface::new(Viewport::new(240.0, 240.0));
        let mut renderer = Renderer::new(surface);
        let doc = Arc::new(fixtures::sample_document());
        let bad = cfi::parse("epubcfi(/6/2[nope]!/4/2/1:0)").unwrap();
        renderer.mount(doc, prefs(LayoutMode::Paginated), Some(&bad)).unwrap();
        assert_eq!(renderer.current_point(), Some(TextPoint::default()));
    }

    #[test]
    fn test_decorations_are_painted() {
        let (mut renderer, surface, doc) = mounted(LayoutMode::Paginated);
        let range = cfi::from_range(&doc, &TextPoint::new(0, 5), &TextPoint::new(0, 12)).unwrap();
        renderer
            .add_decoration("a1", &range, DecorationStyle::Highlight { color: "#ff0".into() })
            .unwrap();

        let frame = surface.last_frame().unwrap();
        let spans: Vec<&PaintedSpan> = frame.lines.iter().flat_map(|l| l.spans.iter()).collect();
        assert!(!spans.is_empty());
        assert_eq!(spans[0].decoration_id, "a1");
        assert_eq!(spans[0].start, 5);
        assert_eq!(spans.last().unwrap().end, 12);

        assert!(renderer.remove_decoration("a1"));
        assert!(!renderer.remove_decoration("a1"));
        let frame = surface.last_frame().unwrap();
        assert!(frame.lines.iter().all(|l| l.spans.is_empty()));
    }

    #[test]
    fn test_selection_cleared_by_navigation() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        let range = renderer.select(0, 0, 4).unwrap();
        assert_eq!(range, RenderedRange::new(0, 0, 4));
        assert_eq!(renderer.selected_text().as_deref(), Some("abcd"));
        assert!(renderer.select(0, 5, 3).is_err());

        renderer.advance();
        assert!(renderer.selection().is_none());
    }

    #[test]
    fn test_detached_listeners_receive_nothing() {
        let (mut renderer, _, _) = mounted(LayoutMode::Paginated);
        let mut rx = renderer.subscribe();
        renderer.detach_listeners();
        renderer.advance();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_theme_change_repaints() {
        let (mut renderer, surface, _) = mounted(LayoutMode::Paginated);
        renderer.set_theme(Theme::Dark);
        assert_eq!(surface.last_frame().unwrap().colors, Theme::Dark.colors());
    }
}
