//! CFI ordering
//!
//! Structural reading-order comparison, meaningful only between addresses of
//! the same document. Ranges order by their start point, then their end.

use std::cmp::Ordering;

use super::types::*;

impl Ord for Cfi {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_path()
            .cmp(&other.start_path())
            .then_with(|| self.end_path().cmp(&other.end_path()))
            .then_with(|| self.is_range().cmp(&other.is_range()))
    }
}

impl PartialOrd for Cfi {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiPath {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_steps(&self.steps, &other.steps)
            .then_with(|| {
                let a = self.character_offset.as_ref().map(|o| o.offset);
                let b = other.character_offset.as_ref().map(|o| o.offset);
                a.cmp(&b)
            })
            .then_with(|| {
                let a = self.temporal_offset.map(|t| t.seconds);
                let b = other.temporal_offset.map(|t| t.seconds);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            })
            // Assertions do not move a position; keep Ord consistent with Eq
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for CfiPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CfiStep {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.step_type, &other.step_type) {
            (StepType::Indirection, StepType::Indirection) => Ordering::Equal,
            (StepType::Element(a), StepType::Element(b)) => a.cmp(b),
            (StepType::Indirection, StepType::Element(_)) => Ordering::Less,
            (StepType::Element(_), StepType::Indirection) => Ordering::Greater,
        }
    }
}

impl PartialOrd for CfiStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_steps(a: &[CfiStep], b: &[CfiStep]) -> Ordering {
    for (step_a, step_b) in a.iter().zip(b.iter()) {
        let cmp = step_a.cmp(step_b);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    // A prefix (an ancestor) comes before its descendants
    a.len().cmp(&b.len())
}

/// Reading-order comparison of two addresses in the same document
pub fn compare(a: &Cfi, b: &Cfi) -> Ordering {
    a.cmp(b)
}

pub fn is_before(a: &Cfi, b: &Cfi) -> bool {
    a < b
}

/// Whether point `cfi` lies within `range` (inclusive)
pub fn is_in_range(cfi: &Cfi, range: &Cfi) -> bool {
    let point = cfi.start_path();
    point >= range.start_path() && point <= range.end_path()
}

/// `None` if either string fails to parse
pub fn compare_cfi_strings(a: &str, b: &str) -> Option<Ordering> {
    let cfi_a = super::parser::parse(a).ok()?;
    let cfi_b = super::parser::parse(b).ok()?;
    Some(cfi_a.cmp(&cfi_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parser::parse;

    #[test]
    fn test_ordering_same_chapter() {
        let a = parse("epubcfi(/6/4!/4/2/1:10)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1:20)").unwrap();
        assert!(a < b);
        assert!(is_before(&a, &b));
        assert_eq!(compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_ordering_different_chapters() {
        let a = parse("epubcfi(/6/4!/4/10/1:900)").unwrap();
        let b = parse("epubcfi(/6/6!/4/2/1:0)").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_ordering_nested_depth() {
        let a = parse("epubcfi(/6/4!/4/2)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1)").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_id_assertions_do_not_affect_position_order() {
        let a = parse("epubcfi(/6/4[ch2]!/4/2/1:5)").unwrap();
        let b = parse("epubcfi(/6/4!/4/2/1:6)").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_ranges_order_by_start() {
        let early = parse("epubcfi(/6/4!/4/2,/1:0,/1:90)").unwrap();
        let late_point = parse("epubcfi(/6/4!/4/2/1:5)").unwrap();
        let late_range = parse("epubcfi(/6/4!/4,/2/1:3,/4/1:1)").unwrap();
        assert!(early < late_point);
        assert!(early < late_range);
        assert!(late_range < late_point);
    }

    #[test]
    fn test_in_range() {
        let range = parse("epubcfi(/6/4!/4/2,/1:0,/1:100)").unwrap();
        let middle = parse("epubcfi(/6/4!/4/2/1:50)").unwrap();
        let outside = parse("epubcfi(/6/4!/4/2/1:150)").unwrap();
        assert!(is_in_range(&middle, &range));
        assert!(!is_in_range(&outside, &range));
    }

    #[test]
    fn test_sort() {
        let mut cfis = vec![
            parse("epubcfi(/6/8!/4/2/1:50)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:10)").unwrap(),
            parse("epubcfi(/6/6!/4/2/1:30)").unwrap(),
            parse("epubcfi(/6/4!/4/2/1:5)").unwrap(),
        ];
        cfis.sort();
        let sorted: Vec<String> = cfis.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            sorted,
            vec![
                "epubcfi(/6/4!/4/2/1:5)",
                "epubcfi(/6/4!/4/2/1:10)",
                "epubcfi(/6/6!/4/2/1:30)",
                "epubcfi(/6/8!/4/2/1:50)",
            ]
        );
    }

    #[test]
    fn test_compare_cfi_strings() {
        assert_eq!(
            compare_cfi_strings("epubcfi(/6/4!/4/2/1:10)", "epubcfi(/6/4!/4/2/1:20)"),
            Some(Ordering::Less)
        );
        assert_eq!(compare_cfi_strings("invalid", "epubcfi(/6/4!/4/2)"), None);
    }
}
