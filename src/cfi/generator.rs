//! CFI generation from document positions and text selections

use super::resolver::TextPoint;
use super::types::*;
use crate::epub::{ContentNode, ContentTree, Document, Section};
use crate::error::{ReaderError, ReaderResult};
use crate::render::RenderedRange;

/// Builder for constructing CFIs programmatically
#[derive(Debug, Clone, Default)]
pub struct CfiBuilder {
    path: CfiPath,
}

impl CfiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `/6`, the spine in the package document
    pub fn package_step(mut self) -> Self {
        self.path.push(CfiStep::element(6));
        self
    }

    /// Spine item from a 0-based index: 0 -> /2, 1 -> /4, ...
    pub fn spine_item(mut self, index: usize) -> Self {
        self.path.push(CfiStep::element(spine_step(index)));
        self
    }

    pub fn spine_item_with_id(mut self, index: usize, id: impl Into<String>) -> Self {
        self.path
            .push(CfiStep::element_with_id(spine_step(index), id));
        self
    }

    /// `!`, entering the content document
    pub fn indirection(mut self) -> Self {
        self.path.push(CfiStep::indirection());
        self
    }

    /// Step with a raw CFI index (even = element, odd = text chunk)
    pub fn element_raw(mut self, cfi_index: u32) -> Self {
        self.path.push(CfiStep::element(cfi_index));
        self
    }

    pub fn element_raw_with_id(mut self, cfi_index: u32, id: impl Into<String>) -> Self {
        self.path.push(CfiStep::element_with_id(cfi_index, id));
        self
    }

    pub fn character_offset(mut self, offset: u32) -> Self {
        self.path.set_character_offset(offset);
        self
    }

    pub fn build(self) -> Cfi {
        Cfi::new(self.path)
    }

    pub fn path(&self) -> &CfiPath {
        &self.path
    }

    fn into_path(self) -> CfiPath {
        self.path
    }
}

fn spine_step(index: usize) -> u32 {
    ((index + 1) * 2) as u32
}

/// `/6/N[id]!` plus the steps down to `<body>`
pub(crate) fn section_builder(index: usize, section: &Section) -> CfiBuilder {
    let mut builder = CfiBuilder::new()
        .package_step()
        .spine_item_with_id(index, section.id.clone())
        .indirection();
    for step in &section.tree.body_steps {
        builder = builder.element_raw(*step);
    }
    builder
}

/// Push `steps` (relative to body) onto `builder`, asserting element ids
fn push_content_steps(mut builder: CfiBuilder, tree: &ContentTree, steps: &[u32], skip: usize) -> CfiBuilder {
    for depth in skip..steps.len() {
        let id = match tree.node_at(&steps[..=depth]) {
            Some(ContentNode::Element(element)) => element.id.clone(),
            _ => None,
        };
        builder = match id {
            Some(id) => builder.element_raw_with_id(steps[depth], id),
            None => builder.element_raw(steps[depth]),
        };
    }
    builder
}

fn section_for(document: &Document, index: usize) -> ReaderResult<&Section> {
    document
        .section(index)
        .ok_or_else(|| ReaderError::ResolutionFailed(format!("no spine item at index {}", index)))
}

fn locate<'a>(
    section: &'a Section,
    offset: usize,
    prefer_following: bool,
) -> ReaderResult<(Vec<u32>, &'a crate::epub::TextChunk)> {
    section.tree.locate(offset, prefer_following).ok_or_else(|| {
        ReaderError::ResolutionFailed(format!(
            "offset {} is past the end of section {}",
            offset, section.id
        ))
    })
}

/// Canonical point address of a text position
pub fn from_point(document: &Document, point: &TextPoint) -> ReaderResult<Cfi> {
    let section = section_for(document, point.section)?;
    let (steps, chunk) = locate(section, point.offset, true)?;

    let builder = push_content_steps(section_builder(point.section, section), &section.tree, &steps, 0);
    Ok(builder
        .character_offset((point.offset - chunk.start) as u32)
        .build())
}

/// Range address rooted at the lowest common ancestor of both endpoints
///
/// Both endpoints must be in the same section.
pub fn from_range(document: &Document, start: &TextPoint, end: &TextPoint) -> ReaderResult<Cfi> {
    if start.section != end.section {
        return Err(ReaderError::ResolutionFailed(
            "range spans more than one section".to_string(),
        ));
    }
    if end < start {
        return Err(ReaderError::ResolutionFailed(
            "range end precedes its start".to_string(),
        ));
    }

    let section = section_for(document, start.section)?;
    let tree = &section.tree;
    let (start_steps, start_chunk) = locate(section, start.offset, true)?;
    let (end_steps, end_chunk) = locate(section, end.offset, false)?;

    // Each endpoint keeps at least its text step
    let max_common = start_steps.len().min(end_steps.len()) - 1;
    let common = start_steps
        .iter()
        .zip(end_steps.iter())
        .take(max_common)
        .take_while(|(a, b)| a == b)
        .count();

    let parent = push_content_steps(
        section_builder(start.section, section),
        tree,
        &start_steps[..common],
        0,
    );

    let start_rel = push_content_steps(CfiBuilder::new(), tree, &start_steps, common)
        .character_offset((start.offset - start_chunk.start) as u32)
        .into_path();
    let end_rel = push_content_steps(CfiBuilder::new(), tree, &end_steps, common)
        .character_offset((end.offset - end_chunk.start) as u32)
        .into_path();

    Ok(Cfi::with_range(
        parent.into_path(),
        CfiRange {
            start: start_rel,
            end: end_rel,
        },
    ))
}

/// Range address of a rendered selection
pub fn from_selection(document: &Document, range: &RenderedRange) -> ReaderResult<Cfi> {
    from_range(document, &range.start_point(), &range.end_point())
}

/// Address of the first character of the document
pub fn document_start(document: &Document) -> ReaderResult<Cfi> {
    from_point(document, &TextPoint::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::fixtures;

    #[test]
    fn test_builder_with_spine_id() {
        let cfi = CfiBuilder::new()
            .package_step()
            .spine_item_with_id(0, "chapter1")
            .indirection()
            .element_raw(4)
            .element_raw(2)
            .element_raw(1)
            .character_offset(42)
            .build();
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[chapter1]!/4/2/1:42)");
    }

    #[test]
    fn test_spine_index_conversion() {
        let cfi = CfiBuilder::new().package_step().spine_item(4).build();
        assert_eq!(cfi.to_string(), "epubcfi(/6/10)");
        assert_eq!(cfi.spine_index(), Some(4));
    }

    #[test]
    fn test_from_point_inside_paragraph() {
        let doc = fixtures::sample_document();
        // ch2 text: "Chapter Two" (11) + "The hallway smelt of " (21) + ...
        let cfi = from_point(&doc, &TextPoint::new(1, 15)).unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[ch2]!/4/4/1:4)");
    }

    #[test]
    fn test_from_point_asserts_element_ids() {
        let doc = fixtures::sample_document();
        let section = doc.section(2).unwrap();
        let offset = section.text().find("The Storm").unwrap();
        let cfi = from_point(&doc, &TextPoint::new(2, offset)).unwrap();
        assert!(cfi.to_string().contains("[storm]/1:0"), "{}", cfi);
    }

    #[test]
    fn test_from_point_out_of_bounds() {
        let doc = fixtures::sample_document();
        assert!(from_point(&doc, &TextPoint::new(9, 0)).is_err());
        let len = doc.section(0).unwrap().char_len();
        assert!(from_point(&doc, &TextPoint::new(0, len + 1)).is_err());
        assert!(from_point(&doc, &TextPoint::new(0, len)).is_ok());
    }

    #[test]
    fn test_from_range_uses_common_ancestor() {
        let doc = fixtures::sample_document();
        // "smelt of boiled cabbage": the end falls inside <em>
        let text = doc.section(1).unwrap().text();
        let start = text.find("smelt").unwrap();
        let end = text.find(" and old").unwrap();
        let cfi = from_range(&doc, &TextPoint::new(1, start), &TextPoint::new(1, end)).unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[ch2]!/4/4,/1:12,/2/1:14)");
    }

    #[test]
    fn test_from_range_rejects_cross_section() {
        let doc = fixtures::sample_document();
        let err = from_range(&doc, &TextPoint::new(0, 1), &TextPoint::new(1, 1)).unwrap_err();
        assert!(matches!(err, ReaderError::ResolutionFailed(_)));
    }

    #[test]
    fn test_document_start() {
        let doc = fixtures::sample_document();
        let cfi = document_start(&doc).unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[ch1]!/4/2/1:0)");
    }
}
