//! CFI (Canonical Fragment Identifier) types
//!
//! Format: `epubcfi(/6/4[chap01ref]!/4/2/22/3:268)`
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::parser::{parse, CfiParseError};

/// A complete EPUB CFI, either a point or a range
///
/// Serialized as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cfi {
    /// Full path for a point, common ancestor path for a range
    pub path: CfiPath,
    /// Range endpoints relative to `path`
    pub range: Option<CfiRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CfiPath {
    pub steps: Vec<CfiStep>,
    pub character_offset: Option<CharacterOffset>,
    pub temporal_offset: Option<TemporalOffset>,
    pub spatial_offset: Option<SpatialOffset>,
}

/// Range endpoints, each relative to the common ancestor path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfiRange {
    pub start: CfiPath,
    pub end: CfiPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfiStep {
    pub step_type: StepType,
    /// `[id]` following the step
    pub id_assertion: Option<String>,
    pub text_assertion: Option<TextAssertion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    /// `/n`: even n is an element, odd n a text chunk
    Element(u32),
    /// `!`: step into the referenced content document
    Indirection,
}

/// `[prefix,suffix;key=value]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextAssertion {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub parameters: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacterOffset {
    /// Characters from the start of the addressed text chunk
    pub offset: u32,
    pub assertion: Option<TextAssertion>,
}

/// `~seconds` for audio/video targets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalOffset {
    pub seconds: f64,
}

impl Eq for TemporalOffset {}

impl std::hash::Hash for TemporalOffset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.seconds.to_bits().hash(state);
    }
}

/// `@x:y` for image targets, both in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialOffset {
    pub x: f64,
    pub y: f64,
}

impl Eq for SpatialOffset {}

impl std::hash::Hash for SpatialOffset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

impl Cfi {
    pub fn new(path: CfiPath) -> Self {
        Self { path, range: None }
    }

    pub fn with_range(path: CfiPath, range: CfiRange) -> Self {
        Self {
            path,
            range: Some(range),
        }
    }

    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }

    /// 0-based spine index from the `/6/N` prefix
    pub fn spine_index(&self) -> Option<usize> {
        match (self.path.steps.first(), self.path.steps.get(1)) {
            (Some(first), Some(second)) if first.step_type == StepType::Element(6) => {
                match second.step_type {
                    StepType::Element(n) if n >= 2 && n % 2 == 0 => Some((n / 2 - 1) as usize),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// ID asserted on the spine step, if any
    pub fn spine_id(&self) -> Option<&str> {
        self.path.steps.get(1).and_then(|s| s.id_assertion.as_deref())
    }

    /// Absolute path of the first point this CFI covers
    pub fn start_path(&self) -> CfiPath {
        match &self.range {
            Some(range) => self.path.join(&range.start),
            None => self.path.clone(),
        }
    }

    /// Absolute path of the last point this CFI covers
    pub fn end_path(&self) -> CfiPath {
        match &self.range {
            Some(range) => self.path.join(&range.end),
            None => self.path.clone(),
        }
    }

    /// Collapse a range to its start point
    pub fn collapse_to_start(&self) -> Cfi {
        Cfi::new(self.start_path())
    }
}

impl CfiPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<CfiStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn push(&mut self, step: CfiStep) {
        self.steps.push(step);
    }

    pub fn set_character_offset(&mut self, offset: u32) {
        self.character_offset = Some(CharacterOffset {
            offset,
            assertion: None,
        });
    }

    /// Append a relative path; offsets come from `tail`
    pub fn join(&self, tail: &CfiPath) -> CfiPath {
        let mut steps = self.steps.clone();
        steps.extend(tail.steps.iter().cloned());
        CfiPath {
            steps,
            character_offset: tail.character_offset.clone(),
            temporal_offset: tail.temporal_offset,
            spatial_offset: tail.spatial_offset,
        }
    }
}

impl CfiStep {
    pub fn element(index: u32) -> Self {
        Self {
            step_type: StepType::Element(index),
            id_assertion: None,
            text_assertion: None,
        }
    }

    pub fn element_with_id(index: u32, id: impl Into<String>) -> Self {
        Self {
            step_type: StepType::Element(index),
            id_assertion: Some(id.into()),
            text_assertion: None,
        }
    }

    pub fn indirection() -> Self {
        Self {
            step_type: StepType::Indirection,
            id_assertion: None,
            text_assertion: None,
        }
    }

    pub fn is_indirection(&self) -> bool {
        matches!(self.step_type, StepType::Indirection)
    }

    pub fn element_index(&self) -> Option<u32> {
        match self.step_type {
            StepType::Element(n) => Some(n),
            StepType::Indirection => None,
        }
    }
}

/// Characters that must be `^`-escaped inside assertions
const SPECIAL_CHARS: &[char] = &['^', '[', ']', '(', ')', ',', ';', '='];

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for ch in value.chars() {
        if SPECIAL_CHARS.contains(&ch) {
            write!(f, "^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({}", self.path)?;
        if let Some(ref range) = self.range {
            write!(f, ",{},{}", range.start, range.end)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CfiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(ref offset) = self.character_offset {
            write!(f, ":{}", offset.offset)?;
            if let Some(ref assertion) = offset.assertion {
                write!(f, "{}", assertion)?;
            }
        }
        if let Some(ref temporal) = self.temporal_offset {
            write!(f, "~{}", temporal.seconds)?;
        }
        if let Some(ref spatial) = self.spatial_offset {
            write!(f, "@{}:{}", spatial.x, spatial.y)?;
        }
        Ok(())
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_type {
            StepType::Element(n) => write!(f, "/{}", n)?,
            StepType::Indirection => write!(f, "!")?,
        }
        if let Some(ref id) = self.id_assertion {
            write!(f, "[")?;
            write_escaped(f, id)?;
            write!(f, "]")?;
        }
        if let Some(ref assertion) = self.text_assertion {
            write!(f, "{}", assertion)?;
        }
        Ok(())
    }
}

impl fmt::Display for TextAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if let Some(ref prefix) = self.prefix {
            write_escaped(f, prefix)?;
        }
        if self.prefix.is_some() || self.suffix.is_some() {
            write!(f, ",")?;
        }
        if let Some(ref suffix) = self.suffix {
            write_escaped(f, suffix)?;
        }
        for (key, value) in &self.parameters {
            write!(f, ";")?;
            write_escaped(f, key)?;
            write!(f, "=")?;
            write_escaped(f, value)?;
        }
        write!(f, "]")
    }
}

impl FromStr for Cfi {
    type Err = CfiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl Serialize for Cfi {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cfi {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }
}
