//! Structural model of a content document
//!
//! Each spine section is parsed into a [`ContentTree`] rooted at `<body>`.
//! Element children are normalized so text chunks and elements alternate:
//!
//! ```text
//! children = [text, elem, text, elem, ..., text]
//!   CFI step  1     2     3     4          2n+1
//! ```
//!
//! A child at vector index `i` is addressed by CFI step `i + 1`; even steps are
//! elements and odd steps are (possibly empty) text chunks, which is exactly
//! the EPUB CFI child-indexing rule. Text chunks also carry their character
//! offset in the flattened section text, which is what makes an address
//! independent of any rendering configuration.

use std::ops::Range;

use roxmltree::{Node, ParsingOptions};

use super::EpubError;

/// Elements that start a new line when laid out
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "nav", "ol",
    "p", "pre", "section", "table", "tr", "ul",
];

/// A node of the content tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    Element(ElementNode),
    Text(TextChunk),
}

/// An element with alternating text/element children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNode {
    pub name: String,
    pub id: Option<String>,
    pub children: Vec<ContentNode>,
    /// Character range of all descendant text in the section text
    pub text_range: Range<usize>,
}

/// A maximal run of text between two sibling elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Offset of the first character in the section text
    pub start: usize,
    /// Length in characters
    pub len: usize,
}

impl ElementNode {
    /// Child addressed by a CFI step (1-based, odd = text)
    pub fn child(&self, step: u32) -> Option<&ContentNode> {
        if step == 0 {
            return None;
        }
        self.children.get(step as usize - 1)
    }
}

impl TextChunk {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Parsed content document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTree {
    /// The `<body>` element (or the root element when there is no body)
    pub body: ElementNode,
    /// CFI steps from the document root element down to `body`
    pub body_steps: Vec<u32>,
    /// Concatenated body text
    pub text: String,
    /// Length of `text` in characters
    pub char_len: usize,
    /// Character offsets where a block boundary forces a line break
    pub breaks: Vec<usize>,
}

impl ContentTree {
    /// Parse an XHTML content document
    pub fn parse(xhtml: &str) -> Result<Self, EpubError> {
        let normalized = normalize_entities(xhtml);
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(&normalized, options)
            .map_err(|e| EpubError::XmlError(e.to_string()))?;

        let root = doc.root_element();
        let body_node = root
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "body")
            .unwrap_or(root);

        let body_steps = steps_from_root(root, body_node);

        let mut builder = TreeBuilder::default();
        let body = builder.build_element(body_node);

        Ok(Self {
            body,
            body_steps,
            char_len: builder.offset,
            text: builder.text,
            breaks: builder.breaks,
        })
    }

    /// Follow CFI child steps (relative to body) to a node
    pub fn node_at(&self, steps: &[u32]) -> Option<&ContentNode> {
        let (first, rest) = steps.split_first()?;
        let mut node = self.body.child(*first)?;
        for step in rest {
            match node {
                ContentNode::Element(element) => node = element.child(*step)?,
                ContentNode::Text(_) => return None,
            }
        }
        Some(node)
    }

    /// Locate the text chunk holding `offset`, returning its CFI steps
    ///
    /// With `prefer_following` the chunk that *starts* at a boundary offset is
    /// chosen (start of a selection or a position); otherwise the chunk that
    /// *ends* there (end of a selection).
    pub fn locate(&self, offset: usize, prefer_following: bool) -> Option<(Vec<u32>, &TextChunk)> {
        if offset > self.char_len {
            return None;
        }
        let mut path = Vec::new();
        let mut found: Option<(Vec<u32>, &TextChunk)> = None;
        locate_in(&self.body, offset, prefer_following, &mut path, &mut found);
        found
    }

    /// Find an element by its `id` attribute, returning its CFI steps
    pub fn find_id(&self, id: &str) -> Option<(Vec<u32>, &ElementNode)> {
        let mut path = Vec::new();
        find_id_in(&self.body, id, &mut path)
    }

    /// Characters `range` of the section text
    pub fn slice(&self, range: Range<usize>) -> String {
        self.text
            .chars()
            .skip(range.start)
            .take(range.end.saturating_sub(range.start))
            .collect()
    }
}

fn locate_in<'a>(
    element: &'a ElementNode,
    offset: usize,
    prefer_following: bool,
    path: &mut Vec<u32>,
    found: &mut Option<(Vec<u32>, &'a TextChunk)>,
) -> bool {
    for (i, child) in element.children.iter().enumerate() {
        path.push(i as u32 + 1);
        let done = match child {
            ContentNode::Text(chunk) => {
                let inside = if prefer_following {
                    chunk.start <= offset && offset < chunk.end()
                } else {
                    chunk.start < offset && offset <= chunk.end()
                };
                if inside {
                    *found = Some((path.clone(), chunk));
                    true
                } else {
                    // Remember a boundary match in case nothing better follows
                    if chunk.start <= offset && offset <= chunk.end() {
                        let replace = match found {
                            None => true,
                            Some(_) => !prefer_following,
                        };
                        if replace {
                            *found = Some((path.clone(), chunk));
                        }
                    }
                    false
                }
            }
            ContentNode::Element(child_element) => {
                if child_element.text_range.start <= offset && offset <= child_element.text_range.end {
                    locate_in(child_element, offset, prefer_following, path, found)
                } else {
                    false
                }
            }
        };
        path.pop();
        if done {
            return true;
        }
    }
    false
}

fn find_id_in<'a>(
    element: &'a ElementNode,
    id: &str,
    path: &mut Vec<u32>,
) -> Option<(Vec<u32>, &'a ElementNode)> {
    for (i, child) in element.children.iter().enumerate() {
        if let ContentNode::Element(child_element) = child {
            path.push(i as u32 + 1);
            if child_element.id.as_deref() == Some(id) {
                return Some((path.clone(), child_element));
            }
            if let Some(hit) = find_id_in(child_element, id, path) {
                return Some(hit);
            }
            path.pop();
        }
    }
    None
}

/// CFI steps from the root element to `target` (empty when they are the same)
fn steps_from_root(root: Node<'_, '_>, target: Node<'_, '_>) -> Vec<u32> {
    let mut steps = Vec::new();
    let mut current = target;
    while current != root {
        let index = current
            .prev_siblings()
            .skip(1)
            .filter(|n| n.is_element())
            .count();
        steps.push(((index + 1) * 2) as u32);
        match current.parent_element() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    steps.reverse();
    steps
}

#[derive(Default)]
struct TreeBuilder {
    text: String,
    offset: usize,
    breaks: Vec<usize>,
}

impl TreeBuilder {
    fn build_element(&mut self, node: Node<'_, '_>) -> ElementNode {
        let name = node.tag_name().name().to_ascii_lowercase();
        let is_block = BLOCK_ELEMENTS.contains(&name.as_str());
        if is_block {
            self.mark_break();
        }

        let start = self.offset;
        let mut children = Vec::new();
        let mut pending = String::new();

        for child in node.children() {
            if child.is_text() {
                if let Some(text) = child.text() {
                    pending.push_str(text);
                }
            } else if child.is_element() {
                children.push(ContentNode::Text(self.push_chunk(std::mem::take(&mut pending))));
                children.push(ContentNode::Element(self.build_element(child)));
            }
        }
        children.push(ContentNode::Text(self.push_chunk(pending)));

        if is_block {
            self.mark_break();
        }

        ElementNode {
            name,
            id: node.attribute("id").map(|s| s.to_string()),
            children,
            text_range: start..self.offset,
        }
    }

    fn push_chunk(&mut self, text: String) -> TextChunk {
        let len = text.chars().count();
        let chunk = TextChunk {
            start: self.offset,
            len,
            text,
        };
        self.text.push_str(&chunk.text);
        self.offset += len;
        chunk
    }

    fn mark_break(&mut self) {
        if self.breaks.last() != Some(&self.offset) {
            self.breaks.push(self.offset);
        }
    }
}

/// Entities every XML parser already understands
const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

/// Rewrite HTML named entities that plain XML does not define
///
/// Known entities become numeric character references. Unknown entities and
/// bare ampersands are escaped so they survive as literal text.
pub fn normalize_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        output.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let name_len = tail[1..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(tail.len() - 1);
        let name = &tail[1..1 + name_len];

        let terminated = tail[1 + name_len..].starts_with(';');
        if tail[1..].starts_with('#') || (terminated && XML_ENTITIES.contains(&name)) {
            output.push('&');
            rest = &tail[1..];
            continue;
        }
        if name.is_empty() || !terminated {
            // Bare ampersand in text
            output.push_str("&amp;");
            rest = &tail[1..];
            continue;
        }

        let entity = &tail[..name_len + 2];
        let decoded = html_escape::decode_html_entities(entity);
        if decoded == entity {
            tracing::debug!("Unknown entity {}, keeping it as text", entity);
            output.push_str("&amp;");
            output.push_str(&entity[1..]);
        } else {
            for ch in decoded.chars() {
                output.push_str(&format!("&#{};", ch as u32));
            }
        }
        rest = &tail[entity.len()..];
    }
    output.push_str(rest);
    output
}
