//! Reader session
//!
//! Owns one open document and wires the renderer's events into progress
//! saving, the location index into the progress display, and input into
//! navigation. A session never fails to open: an unreadable document is kept
//! as a terminal error on the view.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::annotations::{self, Annotation, AnnotationKind, AnnotationStore, AnnotationView};
use crate::cfi::Cfi;
use crate::config::Config;
use crate::epub::{self, Document, TocEntry};
use crate::error::{ReaderError, ReaderResult};
use crate::locations::{LocationIndex, LocationIndexHandle, DEFAULT_CHUNK_SIZE};
use crate::navigation::{DeviceClass, InputEvent, NavAction, NavOutcome, NavigationController, NavigationThresholds};
use crate::progress::{FileCache, LocalCache, PositionKey, ProgressTracker, ResumePolicy, DEFAULT_SAVE_INTERVAL};
use crate::remote::{self, AuthContext, PersistenceApi};
use crate::render::{
    DisplayPreferences, LayoutMode, RenderedRange, Renderer, RendererEvent, RendererState, TextSurface, Theme,
    Viewport,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub document_id: String,
    /// URL or filesystem path of the EPUB
    pub url: String,
    pub device: DeviceClass,
    pub viewport: Viewport,
    pub preferences: DisplayPreferences,
    pub chunk_size: usize,
    pub save_interval: Duration,
    pub resume_policy: ResumePolicy,
    pub thresholds: NavigationThresholds,
}

impl SessionOptions {
    pub fn new(document_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            url: url.into(),
            device: DeviceClass::Pointer,
            viewport: Viewport::new(800.0, 600.0),
            preferences: DisplayPreferences::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            save_interval: DEFAULT_SAVE_INTERVAL,
            resume_policy: ResumePolicy::default(),
            thresholds: NavigationThresholds::default(),
        }
    }

    pub fn from_config(config: &Config, document_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            chunk_size: config.reader.chunk_size,
            save_interval: config.reader.save_interval(),
            resume_policy: config.reader.resume_policy,
            thresholds: config.navigation,
            ..Self::new(document_id, url)
        }
    }
}

/// Selected text awaiting an annotate action
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPopup {
    pub range: RenderedRange,
    pub text: String,
}

/// Everything the reader chrome shows
#[derive(Debug, Clone)]
pub struct ReaderView {
    pub title: String,
    pub section_label: Option<String>,
    /// `None` until the location index is built
    pub percentage: Option<f64>,
    pub percentage_text: String,
    /// 1-based page and page count in paginated mode
    pub page: Option<(usize, usize)>,
    pub page_text: Option<String>,
    pub annotations: Vec<AnnotationView>,
    pub selection_popup: Option<SelectionPopup>,
    pub refresh_hint: bool,
    pub error: Option<ReaderError>,
    pub state: RendererState,
    pub layout_mode: LayoutMode,
}

pub struct ReaderSession {
    options: SessionOptions,
    auth: AuthContext,
    renderer: Renderer,
    events: mpsc::UnboundedReceiver<RendererEvent>,
    navigation: NavigationController,
    tracker: ProgressTracker,
    annotations: AnnotationStore,
    annotation_views: Vec<AnnotationView>,
    document: Option<Arc<Document>>,
    locations: Option<LocationIndexHandle>,
    error: Option<ReaderError>,
    refresh_hint: bool,
    selection: Option<RenderedRange>,
    closed: bool,
}

impl ReaderSession {
    /// Open `options.url` and show it at the saved position
    ///
    /// Touch devices always read in continuous mode.
    pub async fn open(
        mut options: SessionOptions,
        auth: AuthContext,
        surface: impl TextSurface + 'static,
        cache: Arc<dyn LocalCache>,
        remote: Option<Arc<dyn PersistenceApi>>,
    ) -> Self {
        if options.device == DeviceClass::Touch {
            options.preferences.layout_mode = LayoutMode::Continuous;
        }

        let mut renderer = Renderer::new(surface);
        renderer.set_viewport(options.viewport);
        let events = renderer.subscribe();

        let key = PositionKey::new(auth.user_id.clone(), options.document_id.clone());
        let tracker = ProgressTracker::new(key, cache, remote.clone())
            .with_interval(options.save_interval)
            .with_policy(options.resume_policy);
        let annotations = AnnotationStore::new(options.document_id.clone(), auth.user_id.clone(), remote);
        let navigation = NavigationController::new(options.device, options.thresholds, options.viewport.width);

        let mut session = Self {
            options,
            auth,
            renderer,
            events,
            navigation,
            tracker,
            annotations,
            annotation_views: Vec::new(),
            document: None,
            locations: None,
            error: None,
            refresh_hint: false,
            selection: None,
            closed: false,
        };
        session.load().await;
        session
    }

    /// Open with settings, cache directory and persistence API from `config`
    ///
    /// Without a configured base URL or a credential the session is
    /// local-only.
    pub async fn open_with_config(
        config: &Config,
        document_id: impl Into<String>,
        url: impl Into<String>,
        auth: AuthContext,
        surface: impl TextSurface + 'static,
    ) -> Self {
        let options = SessionOptions::from_config(config, document_id, url);
        let cache = Arc::new(FileCache::new(config.reader.cache_dir.clone()));
        let persistence = remote::connect(config.reader.remote_base_url.as_deref(), &auth);
        if persistence.is_none() {
            tracing::debug!("Session for {} is local-only", options.document_id);
        }
        Self::open(options, auth, surface, cache, persistence).await
    }

    async fn load(&mut self) {
        match self.try_load().await {
            Ok(()) => self.error = None,
            Err(e) => {
                tracing::error!("Opening {} failed: {}", self.options.url, e);
                self.error = Some(e);
            }
        }
    }

    async fn try_load(&mut self) -> ReaderResult<()> {
        let document = Arc::new(epub::load(&self.options.url).await?);
        let locations = LocationIndexHandle::spawn(document.clone(), self.options.chunk_size);

        let start = self.tracker.resolve_start(&document).await?;
        tracing::info!(
            "Opening {} for {} from {:?}",
            self.options.document_id,
            self.auth.user_id,
            start.source
        );

        self.renderer
            .mount(document.clone(), self.options.preferences.clone(), Some(&start.address))?;
        // The opening position is already saved; only movement after it counts
        while self.events.try_recv().is_ok() {}
        self.selection = None;

        self.document = Some(document.clone());
        self.locations = Some(locations);
        self.annotation_views = self.annotations.list(&document, &mut self.renderer).await;
        Ok(())
    }

    /// Forward queued renderer events
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                RendererEvent::PositionChanged { address, point, .. } => {
                    let percentage = self
                        .locations
                        .as_ref()
                        .and_then(LocationIndexHandle::current)
                        .map(|index| index.percentage(&point));
                    self.tracker.on_position_changed(&address, percentage);
                }
                RendererEvent::SelectionChanged(range) => self.selection = range,
            }
        }
    }

    pub async fn handle_input(&mut self, event: InputEvent) -> NavOutcome {
        let event = match event {
            InputEvent::PullMove { distance, .. } => InputEvent::PullMove {
                distance,
                at_scroll_top: self.renderer.at_scroll_top(),
            },
            other => other,
        };
        let mode = self.renderer.layout_mode();
        let outcome = self.navigation.handle(event, mode);

        match outcome.action {
            NavAction::Advance | NavAction::Retreat if !self.renderer.is_ready() => {
                tracing::debug!("Ignoring {:?} while {:?}", outcome.action, self.renderer.state());
            }
            NavAction::Advance => {
                self.renderer.advance();
            }
            NavAction::Retreat => {
                self.renderer.retreat();
            }
            NavAction::ShowRefreshHint => self.refresh_hint = true,
            NavAction::HideRefreshHint => self.refresh_hint = false,
            NavAction::Reload => {
                self.refresh_hint = false;
                self.reload().await;
            }
            NavAction::None => {
                if let (InputEvent::Wheel { delta_y }, LayoutMode::Continuous) = (event, mode) {
                    self.renderer.scroll_by(delta_y);
                }
            }
        }

        self.pump();
        outcome
    }

    /// Continuous mode only; returns whether the view moved
    pub fn scroll_by(&mut self, dy: f32) -> bool {
        let moved = self.renderer.scroll_by(dy);
        self.pump();
        moved
    }

    pub fn goto(&mut self, address: &Cfi) -> ReaderResult<()> {
        let result = self.renderer.goto(address);
        self.pump();
        result
    }

    pub fn goto_toc(&mut self, entry: &TocEntry) -> ReaderResult<()> {
        let target = entry.target.clone().ok_or_else(|| {
            ReaderError::ResolutionFailed(format!("{} names no section", entry.href))
        })?;
        self.goto(&target)
    }

    /// Fails with `NotReady` while locations are still being computed
    pub fn goto_percentage(&mut self, percentage: f64) -> ReaderResult<()> {
        let index = self.current_locations().ok_or(ReaderError::NotReady)?;
        let target = index
            .cfi_for_percentage(percentage)
            .cloned()
            .ok_or_else(|| ReaderError::ResolutionFailed("document has no text".to_string()))?;
        self.goto(&target)
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.options.preferences.theme = theme;
        self.renderer.set_theme(theme);
        self.pump();
    }

    pub fn set_font_size_step(&mut self, step: i32) {
        self.renderer.set_font_size_step(step);
        self.options.preferences.font_size_step = self.renderer.preferences().font_size_step;
        self.pump();
    }

    pub fn set_font_family(&mut self, family: impl Into<String>) {
        let family = family.into();
        self.options.preferences.font_family = family.clone();
        self.renderer.set_font_family(family);
        self.pump();
    }

    /// Re-mount in `mode` at the current address
    ///
    /// Touch devices stay in continuous mode.
    pub fn set_layout_mode(&mut self, mode: LayoutMode) -> ReaderResult<()> {
        if self.options.device == DeviceClass::Touch && mode == LayoutMode::Paginated {
            tracing::debug!("Paginated mode is unavailable on touch devices");
            return Ok(());
        }
        if self.renderer.layout_mode() == mode {
            return Ok(());
        }
        let document = self.document.clone().ok_or(ReaderError::NotReady)?;
        let address = self.renderer.current_address();

        self.options.preferences.layout_mode = mode;
        self.renderer
            .mount(document, self.options.preferences.clone(), address.as_ref())?;
        self.pump();
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.options.viewport = viewport;
        self.navigation.set_viewport_width(viewport.width);
        self.renderer.set_viewport(viewport);
        self.pump();
    }

    pub fn select(&mut self, section: usize, start: usize, end: usize) -> ReaderResult<RenderedRange> {
        let range = self.renderer.select(section, start, end)?;
        self.pump();
        Ok(range)
    }

    pub fn clear_selection(&mut self) {
        self.renderer.clear_selection();
        self.pump();
    }

    /// Annotate the current selection and dismiss it
    pub async fn annotate_selection(&mut self, kind: AnnotationKind, color: Option<String>) -> ReaderResult<Annotation> {
        let range = self.selection.ok_or(ReaderError::EmptySelection)?;
        let document = self.document.clone().ok_or(ReaderError::NotReady)?;
        let text = self.renderer.selected_text().unwrap_or_default();

        let annotation = self
            .annotations
            .create(&document, &mut self.renderer, &range, &text, kind, color)
            .await?;
        self.annotation_views.push(annotations::anchor(&document, &annotation));
        self.clear_selection();
        Ok(annotation)
    }

    pub async fn delete_annotation(&mut self, id: &str) -> ReaderResult<()> {
        self.annotations.delete(&mut self.renderer, id).await?;
        self.annotation_views.retain(|view| view.id() != id);
        Ok(())
    }

    pub fn jump_to_annotation(&mut self, id: &str) -> ReaderResult<()> {
        let document = self.document.clone().ok_or(ReaderError::NotReady)?;
        let target = self.annotations.jump_target(&document, id)?;
        self.goto(&target)
    }

    pub async fn refresh_annotations(&mut self) {
        if let Some(document) = self.document.clone() {
            self.annotation_views = self.annotations.list(&document, &mut self.renderer).await;
        }
    }

    /// Wait for the location index; `None` if there is no document or the build failed
    pub async fn locations_ready(&self) -> Option<Arc<LocationIndex>> {
        self.locations.as_ref()?.ready().await
    }

    fn current_locations(&self) -> Option<Arc<LocationIndex>> {
        self.locations.as_ref().and_then(LocationIndexHandle::current)
    }

    /// Save progress, then load the document again at the saved position
    pub async fn reload(&mut self) {
        if self.closed {
            return;
        }
        self.pump();
        self.tracker.flush().await;
        self.renderer.clear_decorations();
        self.load().await;
    }

    pub fn view(&self) -> ReaderView {
        let point = self.renderer.current_point();
        let percentage = match (self.current_locations(), point) {
            (Some(index), Some(point)) => Some(index.percentage(&point)),
            _ => None,
        };
        let page = self.renderer.current_page();

        let section_label = match (self.document.as_ref(), point) {
            (Some(document), Some(point)) => document.toc_entry_for(&point).map(|e| e.label.clone()),
            _ => None,
        };
        let selection_popup = self.selection.and_then(|range| {
            self.renderer
                .selected_text()
                .map(|text| SelectionPopup { range, text })
        });

        ReaderView {
            title: self
                .document
                .as_ref()
                .map(|d| d.metadata.title.clone())
                .unwrap_or_default(),
            section_label,
            percentage,
            percentage_text: percentage.map_or_else(|| "--".to_string(), |p| format!("{:.0}%", p)),
            page,
            page_text: page.map(|(current, total)| format!("{} / {}", current, total)),
            annotations: self.annotation_views.clone(),
            selection_popup,
            refresh_hint: self.refresh_hint,
            error: self.error.clone(),
            state: self.renderer.state(),
            layout_mode: self.renderer.layout_mode(),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        self.document.as_ref()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn error(&self) -> Option<&ReaderError> {
        self.error.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop listening, save the pending position under this session's own
    /// key and destroy the renderer
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.renderer.detach_listeners();
        self.pump();
        self.tracker.teardown();
        self.renderer.destroy();
        tracing::debug!("Closed {}", self.options.document_id);
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.close();
    }
}
