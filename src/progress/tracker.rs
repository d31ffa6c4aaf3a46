//! Progress tracker
//!
//! Position changes arrive far more often than they are worth saving. The
//! first change after a quiet period arms a timer; when it fires, the latest
//! position is written locally and then pushed to the remote store. Changes
//! while the timer is armed only replace the pending position, so at most one
//! write happens per interval and the last position in a window wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{LocalCache, PositionKey, ReadingPosition, ResumePolicy};
use crate::cfi::{self, Cfi, TextPoint};
use crate::epub::Document;
use crate::error::ReaderResult;
use crate::remote::{PersistenceApi, PositionUpdate};

pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSource {
    LocalCache,
    Remote,
    DocumentStart,
}

/// Where a reopened document should open
#[derive(Debug, Clone, PartialEq)]
pub struct StartPosition {
    pub address: Cfi,
    pub point: TextPoint,
    pub source: StartSource,
    /// Percentage saved with the position, if any
    pub percentage: Option<f64>,
}

/// Pending position shared with the timer task
#[derive(Debug, Default)]
struct Slot {
    position: Option<ReadingPosition>,
    armed: bool,
}

#[derive(Clone)]
struct Sink {
    key: PositionKey,
    cache: Arc<dyn LocalCache>,
    remote: Option<Arc<dyn PersistenceApi>>,
}

impl Sink {
    fn write_local(&self, position: &ReadingPosition) {
        match self.cache.store(&self.key, &position.to_cache_entry()) {
            Ok(()) => tracing::debug!(
                "Saved position for {} locally: {}",
                self.key.document_id,
                position.address
            ),
            Err(e) => tracing::warn!("Local position save failed: {}", e),
        }
    }

    async fn write_remote(&self, position: &ReadingPosition) {
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        let update = PositionUpdate {
            document_id: position.document_id.clone(),
            address: position.address.clone(),
            percentage: position.percentage,
        };
        if let Err(e) = remote.put_position(&update).await {
            tracing::warn!("Remote position save failed, keeping local copy: {}", e);
        }
    }

    async fn write(&self, position: &ReadingPosition) {
        self.write_local(position);
        self.write_remote(position).await;
    }
}

pub struct ProgressTracker {
    sink: Sink,
    interval: Duration,
    policy: ResumePolicy,
    slot: Arc<Mutex<Slot>>,
    timer: Option<JoinHandle<()>>,
    latest: Option<ReadingPosition>,
    closed: bool,
}

impl ProgressTracker {
    pub fn new(
        key: PositionKey,
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn PersistenceApi>>,
    ) -> Self {
        Self {
            sink: Sink { key, cache, remote },
            interval: DEFAULT_SAVE_INTERVAL,
            policy: ResumePolicy::default(),
            slot: Arc::new(Mutex::new(Slot::default())),
            timer: None,
            latest: None,
            closed: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: ResumePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key(&self) -> &PositionKey {
        &self.sink.key
    }

    pub fn is_remote(&self) -> bool {
        self.sink.remote.is_some()
    }

    /// Most recent position seen, saved or not
    pub fn latest(&self) -> Option<&ReadingPosition> {
        self.latest.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().position.is_some()
    }

    pub fn on_position_changed(&mut self, address: &Cfi, percentage: Option<f64>) {
        if self.closed {
            return;
        }
        let position = ReadingPosition {
            document_id: self.sink.key.document_id.clone(),
            user_id: self.sink.key.user_id.clone(),
            address: address.to_string(),
            percentage: percentage.map(|p| p.clamp(0.0, 100.0)),
            updated_at: Utc::now(),
        };
        self.latest = Some(position.clone());

        let mut slot = self.slot.lock();
        slot.position = Some(position);
        if slot.armed {
            return;
        }
        // Outside a runtime the position waits for flush or teardown
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                slot.armed = true;
                drop(slot);
                self.timer = Some(self.spawn_timer(&handle));
            }
            Err(_) => tracing::debug!(
                "No runtime for {}, position held until teardown",
                self.sink.key.document_id
            ),
        }
    }

    fn spawn_timer(&self, handle: &tokio::runtime::Handle) -> JoinHandle<()> {
        let slot = self.slot.clone();
        let sink = self.sink.clone();
        let interval = self.interval;

        handle.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let position = {
                    let mut slot = slot.lock();
                    let position = slot.position.take();
                    if position.is_none() {
                        slot.armed = false;
                    }
                    position
                };
                match position {
                    Some(position) => sink.write(&position).await,
                    None => break,
                }
            }
        })
    }

    fn cancel_timer(&mut self) -> Option<ReadingPosition> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let mut slot = self.slot.lock();
        slot.armed = false;
        slot.position.take()
    }

    /// Write the pending position now, locally and remotely
    pub async fn flush(&mut self) {
        if let Some(position) = self.cancel_timer() {
            self.sink.write(&position).await;
        }
    }

    /// Stop saving; the pending position, if any, is written to this
    /// tracker's own local entry before returning
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let Some(position) = self.cancel_timer() else {
            return;
        };
        self.sink.write_local(&position);

        if self.sink.remote.is_some() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let sink = self.sink.clone();
                handle.spawn(async move { sink.write_remote(&position).await });
            }
        }
    }

    /// Pick the position to open `document` at
    ///
    /// Saved addresses that no longer resolve are skipped; with nothing
    /// usable the document opens at its start.
    pub async fn resolve_start(&self, document: &Document) -> ReaderResult<StartPosition> {
        let local = match self.sink.cache.load(&self.sink.key) {
            Ok(entry) => entry.map(|e| (StartSource::LocalCache, e.address, e.percentage, e.timestamp)),
            Err(e) => {
                tracing::warn!("Local position unreadable: {}", e);
                None
            }
        };

        let wants_remote = local.is_none() || self.policy == ResumePolicy::MostRecent;
        let remote = match (&self.sink.remote, wants_remote) {
            (Some(remote), true) => match remote.get_position(&self.sink.key.document_id).await {
                Ok(record) => record.map(|r| (StartSource::Remote, r.address, r.percentage, r.updated_at)),
                Err(e) => {
                    tracing::warn!("Remote position unavailable: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut candidates: Vec<(StartSource, String, Option<f64>, DateTime<Utc>)> =
            local.into_iter().chain(remote).collect();
        if self.policy == ResumePolicy::MostRecent {
            candidates.sort_by(|a, b| b.3.cmp(&a.3));
        }

        for (source, address, percentage, _) in candidates {
            let resolved = cfi::parse(&address)
                .map_err(Into::into)
                .and_then(|parsed| cfi::resolve(document, &parsed).map(|target| (parsed, target)));
            match resolved {
                Ok((address, target)) => {
                    tracing::debug!("Resuming {} from {:?} at {}", self.sink.key.document_id, source, address);
                    return Ok(StartPosition {
                        address,
                        point: target.start(),
                        source,
                        percentage,
                    });
                }
                Err(e) => tracing::warn!("Saved position {} unusable: {}", address, e),
            }
        }

        Ok(StartPosition {
            address: cfi::document_start(document)?,
            point: TextPoint::default(),
            source: StartSource::DocumentStart,
            percentage: Some(0.0),
        })
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
