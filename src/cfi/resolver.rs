//! Mapping addresses back onto a loaded document
//!
//! A CFI resolves to a [`TextPoint`]: a section index and a character offset
//! into that section's flattened text. Nothing about fonts, viewports or
//! layout mode takes part, so an address resolves identically under every
//! render configuration.

use serde::{Deserialize, Serialize};

use super::types::{Cfi, CfiPath, StepType};
use crate::epub::{ContentNode, ContentTree, Document, ElementNode};
use crate::error::{ReaderError, ReaderResult};

/// Logical text position within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TextPoint {
    /// Spine index
    pub section: usize,
    /// Character offset into the section text
    pub offset: usize,
}

impl TextPoint {
    pub fn new(section: usize, offset: usize) -> Self {
        Self { section, offset }
    }
}

/// What an address denotes in the live document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    Point(TextPoint),
    Range(TextPoint, TextPoint),
}

impl ResolvedTarget {
    pub fn start(&self) -> TextPoint {
        match self {
            ResolvedTarget::Point(p) => *p,
            ResolvedTarget::Range(start, _) => *start,
        }
    }

    pub fn end(&self) -> TextPoint {
        match self {
            ResolvedTarget::Point(p) => *p,
            ResolvedTarget::Range(_, end) => *end,
        }
    }
}

fn failed(cfi: &CfiPath, reason: impl std::fmt::Display) -> ReaderError {
    ReaderError::ResolutionFailed(format!("{}: {}", cfi, reason))
}

/// Resolve an address against `document`
pub fn resolve(document: &Document, cfi: &Cfi) -> ReaderResult<ResolvedTarget> {
    if cfi.range.is_none() {
        return resolve_path(document, &cfi.path).map(ResolvedTarget::Point);
    }

    let start = resolve_path(document, &cfi.start_path())?;
    let end = resolve_path(document, &cfi.end_path())?;
    if end < start {
        return Err(failed(&cfi.path, "range end precedes its start"));
    }
    Ok(ResolvedTarget::Range(start, end))
}

fn resolve_path(document: &Document, path: &CfiPath) -> ReaderResult<TextPoint> {
    let steps = &path.steps;

    if steps.first().map(|s| s.step_type) != Some(StepType::Element(6)) {
        return Err(failed(path, "address does not start at the spine"));
    }
    let spine_step = steps
        .get(1)
        .ok_or_else(|| failed(path, "missing spine item step"))?;
    let index = match spine_step.step_type {
        StepType::Element(n) if n >= 2 && n % 2 == 0 => (n / 2 - 1) as usize,
        _ => return Err(failed(path, "invalid spine item step")),
    };
    let section = document
        .section(index)
        .ok_or_else(|| failed(path, format!("spine has no item {}", index)))?;
    if let Some(id) = &spine_step.id_assertion {
        if *id != section.id {
            return Err(failed(
                path,
                format!("spine item {} is {}, not {}", index, section.id, id),
            ));
        }
    }

    let content = match steps.get(2) {
        None => return Ok(TextPoint::new(index, 0)),
        Some(step) if step.is_indirection() => &steps[3..],
        Some(_) => return Err(failed(path, "expected indirection after spine item")),
    };

    let tree = &section.tree;
    let mut indices = Vec::with_capacity(content.len());
    for step in content {
        indices.push(
            step.element_index()
                .ok_or_else(|| failed(path, "nested indirection"))?,
        );
    }

    let body_len = tree.body_steps.len();
    if indices.len() <= body_len {
        // Section or body address
        return if tree.body_steps.starts_with(&indices) {
            Ok(TextPoint::new(index, 0))
        } else {
            Err(failed(path, "path does not lead to the document body"))
        };
    }
    if indices[..body_len] != tree.body_steps[..] {
        return Err(failed(path, "path does not lead to the document body"));
    }

    let offset = path
        .character_offset
        .as_ref()
        .map(|o| o.offset as usize)
        .unwrap_or(0);

    let mut element = &tree.body;
    let rest = &content[body_len..];
    for (i, step) in rest.iter().enumerate() {
        let step_index = indices[body_len + i];
        match element.child(step_index) {
            Some(ContentNode::Element(child)) => {
                element = match &step.id_assertion {
                    Some(id) if child.id.as_deref() != Some(id.as_str()) => relocate(tree, id, path)?,
                    _ => child,
                };
            }
            Some(ContentNode::Text(chunk)) => {
                if i + 1 != rest.len() {
                    return Err(failed(path, "step below a text chunk"));
                }
                if offset > chunk.len {
                    return Err(failed(
                        path,
                        format!("offset {} past text chunk of {} characters", offset, chunk.len),
                    ));
                }
                return Ok(TextPoint::new(index, chunk.start + offset));
            }
            None => match &step.id_assertion {
                Some(id) => element = relocate(tree, id, path)?,
                None => return Err(failed(path, format!("no child at step {}", step_index))),
            },
        }
    }

    // Path ends on an element
    let position = element.text_range.start + offset;
    if position > element.text_range.end {
        return Err(failed(path, "offset past the end of the element"));
    }
    Ok(TextPoint::new(index, position))
}

/// Follow an ID assertion when the positional step no longer matches
fn relocate<'a>(tree: &'a ContentTree, id: &str, path: &CfiPath) -> ReaderResult<&'a ElementNode> {
    tracing::debug!("Relocating {} by id assertion [{}]", path, id);
    tree.find_id(id)
        .map(|(_, element)| element)
        .ok_or_else(|| failed(path, format!("no element with id {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::{from_point, from_range, parse};
    use crate::epub::fixtures;

    fn resolve_str(doc: &Document, s: &str) -> ReaderResult<ResolvedTarget> {
        resolve(doc, &parse(s).unwrap())
    }

    #[test]
    fn test_point_round_trip_over_every_offset() {
        let doc = fixtures::sample_document();
        for (index, section) in doc.sections.iter().enumerate() {
            for offset in 0..=section.char_len() {
                let point = TextPoint::new(index, offset);
                let cfi = from_point(&doc, &point).unwrap();
                let reparsed = parse(&cfi.to_string()).unwrap();
                assert_eq!(
                    resolve(&doc, &reparsed).unwrap(),
                    ResolvedTarget::Point(point),
                    "{}",
                    cfi
                );
            }
        }
    }

    #[test]
    fn test_range_round_trip() {
        let doc = fixtures::sample_document();
        let start = TextPoint::new(1, 20);
        let end = TextPoint::new(1, 40);
        let cfi = from_range(&doc, &start, &end).unwrap();
        assert_eq!(resolve(&doc, &cfi).unwrap(), ResolvedTarget::Range(start, end));
    }

    #[test]
    fn test_toc_targets_resolve() {
        let doc = fixtures::sample_document();
        let chapter_two = doc.toc[1].target.as_ref().unwrap();
        assert_eq!(resolve(&doc, chapter_two).unwrap().start(), TextPoint::new(1, 0));

        let storm = doc.toc[2].children[0].target.as_ref().unwrap();
        let offset = doc.section(2).unwrap().text().find("The Storm").unwrap();
        assert_eq!(resolve(&doc, storm).unwrap().start(), TextPoint::new(2, offset));
    }

    #[test]
    fn test_spine_only_address() {
        let doc = fixtures::sample_document();
        assert_eq!(
            resolve_str(&doc, "epubcfi(/6/6[ch3])").unwrap(),
            ResolvedTarget::Point(TextPoint::new(2, 0))
        );
    }

    #[test]
    fn test_id_assertion_relocates_moved_element() {
        let doc = fixtures::sample_document();
        // The storm heading is really at /6; /8 is the last paragraph
        let target = resolve_str(&doc, "epubcfi(/6/6[ch3]!/4/8[storm]/1:0)").unwrap();
        let offset = doc.section(2).unwrap().text().find("The Storm").unwrap();
        assert_eq!(target.start(), TextPoint::new(2, offset));
    }

    #[test]
    fn test_resolution_failures() {
        let doc = fixtures::sample_document();
        for bad in [
            "epubcfi(/6/20!/4/2/1:0)",
            "epubcfi(/6/4[wrong]!/4/2/1:0)",
            "epubcfi(/6/2[ch1]!/4/2/1:500)",
            "epubcfi(/6/2[ch1]!/4/40/1:0)",
            "epubcfi(/6/2[ch1]!/2/2/1:0)",
            "epubcfi(/4/2!/4)",
            "epubcfi(/6/2[ch1]!/4/2/1/2)",
        ] {
            let err = resolve_str(&doc, bad).unwrap_err();
            assert!(matches!(err, ReaderError::ResolutionFailed(_)), "{}", bad);
        }
    }

    #[test]
    fn test_reversed_range_fails() {
        let doc = fixtures::sample_document();
        assert!(resolve_str(&doc, "epubcfi(/6/2!/4/4,/1:30,/1:2)").is_err());
    }
}
