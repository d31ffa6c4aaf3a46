//! Line breaking and pagination
//!
//! Section text is wrapped greedily at whitespace against the surface's
//! measured widths; block boundaries always end a line. Pages are runs of
//! whole lines that fit the viewport height, and every section starts on a
//! new page.

use std::ops::Range;

use super::surface::{TextSurface, Viewport};
use super::theme::TextStyle;
use crate::cfi::TextPoint;
use crate::epub::{Document, Section};

/// A laid-out line, in section character offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub section: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub section: usize,
    /// Indices into [`Layout::lines`]
    pub lines: Range<usize>,
    pub start: usize,
    pub end: usize,
}

impl Page {
    pub fn start_point(&self) -> TextPoint {
        TextPoint::new(self.section, self.start)
    }
}

/// The whole document laid out for one style and viewport
#[derive(Debug, Clone)]
pub struct Layout {
    lines: Vec<Line>,
    pages: Vec<Page>,
    section_lines: Vec<Range<usize>>,
    section_pages: Vec<Range<usize>>,
    line_height: f32,
    viewport: Viewport,
}

impl Layout {
    pub fn compute(document: &Document, surface: &dyn TextSurface, style: &TextStyle) -> Self {
        let viewport = surface.viewport();
        let line_height = surface.line_height(style).max(1.0);
        let lines_per_page = ((viewport.height / line_height).floor() as usize).max(1);

        let mut lines = Vec::new();
        let mut pages = Vec::new();
        let mut section_lines = Vec::with_capacity(document.sections.len());
        let mut section_pages = Vec::with_capacity(document.sections.len());

        for (index, section) in document.sections.iter().enumerate() {
            let first_line = lines.len();
            lines.extend(wrap_section(index, section, surface, style, viewport.width));
            section_lines.push(first_line..lines.len());

            let first_page = pages.len();
            let mut line = first_line;
            while line < lines.len() {
                let last = (line + lines_per_page).min(lines.len());
                pages.push(Page {
                    section: index,
                    lines: line..last,
                    start: lines[line].start,
                    end: lines[last - 1].end,
                });
                line = last;
            }
            section_pages.push(first_page..pages.len());
        }

        tracing::debug!(
            "Layout: {} lines, {} pages at {}px in {}x{}",
            lines.len(),
            pages.len(),
            style.font_size,
            viewport.width,
            viewport.height
        );

        Self {
            lines,
            pages,
            section_lines,
            section_pages,
            line_height,
            viewport,
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Total height of the continuous column
    pub fn content_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height
    }

    pub fn line_top(&self, line: usize) -> f32 {
        line as f32 * self.line_height
    }

    /// Line visible at the top when the column is scrolled to `y`
    pub fn line_at_y(&self, y: f32) -> usize {
        let line = (y.max(0.0) / self.line_height).floor() as usize;
        line.min(self.lines.len().saturating_sub(1))
    }

    /// Index of the line holding `point`
    pub fn line_for(&self, point: &TextPoint) -> usize {
        let range = self.clamped_range(&self.section_lines, point.section);
        let within = self.lines[range.clone()].partition_point(|l| l.start <= point.offset);
        range.start + within.saturating_sub(1)
    }

    /// Index of the page holding `point`
    pub fn page_for(&self, point: &TextPoint) -> usize {
        let range = self.clamped_range(&self.section_pages, point.section);
        let within = self.pages[range.clone()].partition_point(|p| p.start <= point.offset);
        range.start + within.saturating_sub(1)
    }

    fn clamped_range(&self, ranges: &[Range<usize>], section: usize) -> Range<usize> {
        let index = section.min(ranges.len().saturating_sub(1));
        ranges.get(index).cloned().unwrap_or(0..0)
    }
}

fn wrap_section(
    index: usize,
    section: &Section,
    surface: &dyn TextSurface,
    style: &TextStyle,
    max_width: f32,
) -> Vec<Line> {
    let chars: Vec<char> = section.text().chars().collect();
    let len = chars.len();

    let mut bounds: Vec<usize> = section
        .tree
        .breaks
        .iter()
        .copied()
        .filter(|b| *b > 0 && *b < len)
        .collect();
    bounds.push(len);

    let mut lines = Vec::new();
    let mut start = 0;
    for end in bounds {
        if end > start {
            wrap_paragraph(index, &chars, start..end, surface, style, max_width, &mut lines);
            start = end;
        }
    }

    if lines.is_empty() {
        lines.push(Line {
            section: index,
            start: 0,
            end: len,
        });
    }
    lines
}

fn char_width(surface: &dyn TextSurface, style: &TextStyle, ch: char) -> f32 {
    let mut buf = [0u8; 4];
    surface.measure(ch.encode_utf8(&mut buf), style)
}

fn wrap_paragraph(
    section: usize,
    chars: &[char],
    span: Range<usize>,
    surface: &dyn TextSurface,
    style: &TextStyle,
    max_width: f32,
    lines: &mut Vec<Line>,
) {
    let mut line_start = span.start;
    let mut width = 0.0;
    let mut last_break: Option<usize> = None;
    let mut i = span.start;

    while i < span.end {
        let w = char_width(surface, style, chars[i]);
        if width + w > max_width && i > line_start {
            let cut = match last_break {
                Some(b) if b > line_start => b,
                _ => i,
            };
            lines.push(Line {
                section,
                start: line_start,
                end: cut,
            });
            line_start = cut;
            last_break = None;
            width = chars[cut..i]
                .iter()
                .map(|c| char_width(surface, style, *c))
                .sum();
            continue;
        }
        width += w;
        if chars[i].is_whitespace() {
            last_break = Some(i + 1);
        }
        i += 1;
    }

    if span.end > line_start {
        lines.push(Line {
            section,
            start: line_start,
            end: span.end,
        });
    }
}
