//! Position addresses (EPUB CFI)
//!
//! Parsing, generation, comparison and resolution of EPUB Canonical Fragment
//! Identifiers. An address is structural: spine item, element path, text
//! chunk, character offset. It never encodes pixels or pages.
//!
//! ```text
//! epubcfi(/6/4[chapter1]!/4/2/1:42)
//!         │  │          │ │ │ │ └── character offset 42
//!         │  │          │ │ │ └──── text chunk (odd = text)
//!         │  │          │ │ └────── element (even = element)
//!         │  │          │ └──────── body
//!         │  │          └────────── indirection into the content document
//!         │  └───────────────────── spine item with ID assertion
//!         └──────────────────────── spine
//! ```

mod comparator;
mod generator;
mod parser;
mod resolver;
mod types;

pub use types::{
    CharacterOffset, Cfi, CfiPath, CfiRange, CfiStep, SpatialOffset, StepType, TemporalOffset,
    TextAssertion,
};

pub use parser::{parse, try_parse, CfiParseError};

pub use generator::{document_start, from_point, from_range, from_selection, CfiBuilder};
pub(crate) use generator::section_builder;

pub use comparator::{compare, compare_cfi_strings, is_before, is_in_range};

pub use resolver::{resolve, ResolvedTarget, TextPoint};
