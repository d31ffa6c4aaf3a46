//! Location index
//!
//! Splits the document into fixed-size character chunks. Chunk starts are
//! numbered in reading order; the count is the denominator of the read
//! percentage. The index is a pure function of the document text, so it is
//! identical under every font size, viewport and layout mode.

use std::sync::Arc;

use tokio::sync::watch;

use crate::cfi::{self, Cfi, TextPoint};
use crate::epub::Document;
use crate::error::ReaderResult;

/// Characters per location unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub point: TextPoint,
    pub cfi: Cfi,
}

/// Ordered chunk starts for one document
#[derive(Debug, Clone)]
pub struct LocationIndex {
    chunk_size: usize,
    locations: Vec<Location>,
    /// Position just past the last character of the document
    end: TextPoint,
}

impl LocationIndex {
    /// Index `document` at `chunk_size` characters per location
    pub fn build(document: &Document, chunk_size: usize) -> ReaderResult<Self> {
        let chunk_size = chunk_size.max(1);
        let mut locations = Vec::new();
        let mut end = TextPoint::default();

        for (index, section) in document.sections.iter().enumerate() {
            let len = section.char_len();
            if len == 0 {
                continue;
            }
            for offset in (0..len).step_by(chunk_size) {
                let point = TextPoint::new(index, offset);
                locations.push(Location {
                    cfi: cfi::from_point(document, &point)?,
                    point,
                });
            }
            end = TextPoint::new(index, len);
        }

        Ok(Self {
            chunk_size,
            locations,
            end,
        })
    }

    pub fn total(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn end(&self) -> TextPoint {
        self.end
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Number of the location holding `point`
    ///
    /// The document start is location 0; a point at or past the last
    /// character of the document is location `total()`.
    pub fn location_number(&self, point: &TextPoint) -> usize {
        if self.locations.is_empty() || *point >= self.end {
            return self.total();
        }
        self.locations
            .partition_point(|l| l.point <= *point)
            .saturating_sub(1)
    }

    /// `None` when `cfi` does not resolve in `document`
    pub fn location_number_for(&self, document: &Document, cfi: &Cfi) -> Option<usize> {
        match cfi::resolve(document, cfi) {
            Ok(target) => Some(self.location_number(&target.start())),
            Err(e) => {
                tracing::debug!("No location for {}: {}", cfi, e);
                None
            }
        }
    }

    /// Read percentage of `point`, 0 to 100
    pub fn percentage(&self, point: &TextPoint) -> f64 {
        if self.locations.is_empty() {
            return 0.0;
        }
        let value = self.location_number(point) as f64 / self.total() as f64 * 100.0;
        value.clamp(0.0, 100.0)
    }

    pub fn percentage_for(&self, document: &Document, cfi: &Cfi) -> Option<f64> {
        cfi::resolve(document, cfi)
            .ok()
            .map(|target| self.percentage(&target.start()))
    }

    /// Address of the start of location `number`
    pub fn cfi_for_location(&self, number: usize) -> Option<&Cfi> {
        self.locations.get(number).map(|l| &l.cfi)
    }

    /// Address of the location closest to `percentage`
    pub fn cfi_for_percentage(&self, percentage: f64) -> Option<&Cfi> {
        if self.locations.is_empty() {
            return None;
        }
        let fraction = percentage.clamp(0.0, 100.0) / 100.0;
        let number = ((self.total() as f64) * fraction).round() as usize;
        self.cfi_for_location(number.min(self.total() - 1))
    }
}

/// A location index being built in the background
///
/// `current()` is `None` until the build completes; consumers treat every
/// location-dependent value as indeterminate until then.
#[derive(Debug, Clone)]
pub struct LocationIndexHandle {
    rx: watch::Receiver<Option<Arc<LocationIndex>>>,
}

impl LocationIndexHandle {
    /// Start indexing on the blocking pool
    pub fn spawn(document: Arc<Document>, chunk_size: usize) -> Self {
        let (tx, rx) = watch::channel(None);

        tokio::task::spawn_blocking(move || {
            let started = std::time::Instant::now();
            match LocationIndex::build(&document, chunk_size) {
                Ok(index) => {
                    tracing::debug!(
                        "Indexed \"{}\": {} locations in {:?}",
                        document.metadata.title,
                        index.total(),
                        started.elapsed()
                    );
                    // Receivers may already be gone if the session closed
                    let _ = tx.send(Some(Arc::new(index)));
                }
                Err(e) => {
                    tracing::warn!("Location indexing failed: {}", e);
                }
            }
        });

        Self { rx }
    }

    /// A handle whose index is already available
    pub fn ready_now(index: LocationIndex) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(index)));
        Self { rx }
    }

    pub fn current(&self) -> Option<Arc<LocationIndex>> {
        self.rx.borrow().clone()
    }

    /// Wait for the build; `None` if it failed
    pub async fn ready(&self) -> Option<Arc<LocationIndex>> {
        let mut rx = self.rx.clone();
        let built = rx.wait_for(|index| index.is_some()).await.map(|index| (*index).clone());
        match built {
            Ok(index) => index,
            Err(_) => rx.borrow().clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<LocationIndex>>> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::fixtures;

    #[test]
    fn test_hundred_locations() {
        let doc = fixtures::uniform_document(1, 1000);
        let index = LocationIndex::build(&doc, 10).unwrap();
        assert_eq!(index.total(), 100);

        assert_eq!(index.location_number(&TextPoint::new(0, 400)), 40);
        assert_eq!(index.location_number(&TextPoint::new(0, 409)), 40);
        assert_eq!(index.percentage(&TextPoint::new(0, 400)), 40.0);
    }

    #[test]
    fn test_endpoints() {
        let doc = fixtures::uniform_document(2, 95);
        let index = LocationIndex::build(&doc, 10).unwrap();
        assert_eq!(index.total(), 20);

        assert_eq!(index.percentage(&TextPoint::default()), 0.0);
        assert_eq!(index.percentage(&index.end()), 100.0);
        assert_eq!(index.percentage(&TextPoint::new(1, 95)), 100.0);
        assert!(index.percentage(&TextPoint::new(1, 94)) < 100.0);
    }

    #[test]
    fn test_location_numbers_are_monotonic() {
        let doc = fixtures::sample_document();
        let index = LocationIndex::build(&doc, 16).unwrap();

        let mut last = 0;
        for (section_index, section) in doc.sections.iter().enumerate() {
            for offset in 0..=section.char_len() {
                let n = index.location_number(&TextPoint::new(section_index, offset));
                assert!(n >= last, "location went backwards at {}:{}", section_index, offset);
                last = n;
            }
        }
        assert_eq!(last, index.total());
    }

    #[test]
    fn test_sections_start_new_locations() {
        let doc = fixtures::uniform_document(3, 25);
        let index = LocationIndex::build(&doc, 10).unwrap();
        assert_eq!(index.total(), 9);
        assert_eq!(index.location_number(&TextPoint::new(1, 0)), 3);
        assert_eq!(index.location_number(&TextPoint::new(0, 24)), 2);
    }

    #[test]
    fn test_location_cfis_resolve_to_their_points() {
        let doc = fixtures::uniform_document(1, 1000);
        let index = LocationIndex::build(&doc, 10).unwrap();

        let cfi = index.cfi_for_location(40).unwrap();
        assert_eq!(index.location_number_for(&doc, cfi), Some(40));
        assert_eq!(index.percentage_for(&doc, cfi), Some(40.0));
        assert_eq!(index.cfi_for_percentage(40.0), Some(cfi));
        assert!(index.cfi_for_location(100).is_none());
    }

    #[test]
    fn test_unresolvable_address_has_no_location() {
        let doc = fixtures::uniform_document(1, 100);
        let index = LocationIndex::build(&doc, 10).unwrap();
        let foreign = cfi::parse("epubcfi(/6/14!/4/2/1:0)").unwrap();
        assert_eq!(index.location_number_for(&doc, &foreign), None);
        assert_eq!(index.percentage_for(&doc, &foreign), None);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let doc = fixtures::uniform_document(1, 5);
        let index = LocationIndex::build(&doc, 0).unwrap();
        assert_eq!(index.chunk_size(), 1);
        assert_eq!(index.total(), 5);
    }

    #[tokio::test]
    async fn test_handle_publishes_when_built() {
        let doc = Arc::new(fixtures::uniform_document(2, 500));
        let handle = LocationIndexHandle::spawn(doc, 100);

        let index = handle.ready().await.unwrap();
        assert_eq!(index.total(), 10);
        assert!(handle.current().is_some());
    }

    #[tokio::test]
    async fn test_ready_after_sender_dropped() {
        let doc = fixtures::uniform_document(1, 50);
        let handle = LocationIndexHandle::ready_now(LocationIndex::build(&doc, 10).unwrap());
        assert_eq!(handle.ready().await.unwrap().total(), 5);

        // Build gave up without publishing
        let (tx, rx) = watch::channel(None);
        drop(tx);
        let failed = LocationIndexHandle { rx };
        assert!(failed.ready().await.is_none());
    }
}
