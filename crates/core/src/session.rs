//! Viewer session
//!
//! One [`ViewerSession`] exists per (document, user). It wires the renderer
//! adapter, page layout, zoom/scroll coordination, touch gestures and the
//! overlay engine together, and owns the frame scheduler and the in-flight
//! request registry. Input handlers only mutate state and queue frame tasks;
//! layout, recentering and scale correction run from
//! [`ViewerSession::on_animation_frame`] and [`ViewerSession::on_timer`].

use crate::config::EngineConfig;
use crate::events::{EventKind, OverlayEvent, Subscription};
use crate::geometry::{Point, Rect};
use crate::gesture::{GestureOutcome, GestureRecognizer, PointerEvent, PointerKind};
use crate::layout::PageLayout;
use crate::overlay::{Key, OverlayEngine};
use crate::renderer::{DocumentRenderer, RendererError, RendererEvent};
use crate::store::AnnotationStore;
use crate::surface::OverlaySurface;
use crate::zoom::{ScrollState, WheelInput, WheelOutcome, ZoomCoordinator};
use annotator_scheduler::{CancellationToken, FrameScheduler, RequestId, RequestKind, RequestRegistry};
use std::time::Instant;

/// Work deferred to the next animation frame or a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameTask {
    FullLayout,
    PageHeight(u32),
    ScaleCorrection,
    Gesture,
    Recenter,
}

/// Where the document load stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// Handle for one document load
///
/// Returned by [`ViewerSession::open_document`]; the host passes it back to
/// [`ViewerSession::complete_document_load`]. The token lets a fetch running
/// elsewhere notice cancellation early.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    id: RequestId,
    file_id: u64,
    user_id: u64,
    token: CancellationToken,
}

impl LoadTicket {
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Result of completing a load ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Cancelled or superseded; nothing was touched
    Stale,
    Failed(String),
    Loaded { annotations: usize },
}

pub struct ViewerSession<R: DocumentRenderer> {
    renderer: R,
    config: EngineConfig,
    layout: PageLayout,
    zoom: ZoomCoordinator,
    scroll: ScrollState,
    gestures: GestureRecognizer,
    frames: FrameScheduler<FrameTask>,
    requests: RequestRegistry,
    surface: Option<Box<dyn OverlaySurface>>,
    engine: Option<OverlayEngine>,
    load_state: LoadState,
    document: Option<(u64, u64)>,
    content_offset_x: f32,
    destroyed: bool,
}

impl<R: DocumentRenderer> ViewerSession<R> {
    pub fn new(renderer: R, surface: Box<dyn OverlaySurface>, config: EngineConfig) -> Self {
        let zoom = ZoomCoordinator::new(renderer.scale());
        Self {
            renderer,
            config,
            layout: PageLayout::new(),
            zoom,
            scroll: ScrollState::default(),
            gestures: GestureRecognizer::new(),
            frames: FrameScheduler::new(),
            requests: RequestRegistry::new(),
            surface: Some(surface),
            engine: None,
            load_state: LoadState::Idle,
            document: None,
            content_offset_x: 0.0,
            destroyed: false,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Mutable renderer access for the host; report changes as events
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn zoom(&self) -> &ZoomCoordinator {
        &self.zoom
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    pub fn engine(&self) -> Option<&OverlayEngine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut OverlayEngine> {
        self.engine.as_mut()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Left margin that centers narrow content
    pub fn content_offset_x(&self) -> f32 {
        self.content_offset_x
    }

    /// Subscribe to engine events; `None` until the engine exists
    pub fn on(&self, kind: EventKind, handler: impl FnMut(&OverlayEvent) + 'static) -> Option<Subscription> {
        self.engine.as_ref().map(|engine| engine.on(kind, handler))
    }

    // Loading --------------------------------------------------------------

    /// Start loading a document
    ///
    /// Any in-flight load is cancelled and the current document's engine is
    /// torn down, so nothing stays interactive until the new load completes.
    pub fn open_document(&mut self, file_id: u64, user_id: u64) -> Option<LoadTicket> {
        if self.destroyed {
            return None;
        }
        let cancelled = self.requests.cancel_kind(RequestKind::DocumentLoad)
            + self.requests.cancel_kind(RequestKind::AnnotationLoad);
        if cancelled > 0 {
            tracing::debug!(cancelled, "superseded in-flight document load");
        }
        self.release_document();
        let (id, token) = self.requests.register(RequestKind::DocumentLoad);
        self.load_state = LoadState::Loading;
        Some(LoadTicket { id, file_id, user_id, token })
    }

    /// Cancel the in-flight document load, if any
    pub fn cancel_document_load(&mut self) -> bool {
        let cancelled = self.requests.cancel_kind(RequestKind::DocumentLoad) > 0;
        if cancelled && self.load_state == LoadState::Loading {
            self.load_state = LoadState::Idle;
        }
        cancelled
    }

    /// Finish a document load and fetch its annotations from `store`
    ///
    /// A cancelled or superseded ticket is ignored: no engine is created and
    /// the store is never called. Any failure moves the session to
    /// [`LoadState::Failed`] without an engine.
    pub fn complete_document_load<S: AnnotationStore>(
        &mut self,
        ticket: &LoadTicket,
        document: Result<(), RendererError>,
        store: &S,
    ) -> LoadOutcome {
        if self.destroyed || !self.requests.is_live(ticket.id) {
            tracing::debug!(file_id = ticket.file_id, "ignoring stale document load");
            return LoadOutcome::Stale;
        }
        self.requests.complete(ticket.id);

        if let Err(err) = document {
            return self.fail_load(format!("document load failed: {err}"));
        }

        let (request, _token) = self.requests.register(RequestKind::AnnotationLoad);
        let loaded = store.load(ticket.file_id, ticket.user_id);
        self.requests.complete(request);
        let pages = match loaded {
            Ok(pages) => pages,
            Err(err) => return self.fail_load(format!("annotation load failed: {err}")),
        };

        let Some(surface) = self.surface.take() else {
            return self.fail_load("overlay surface unavailable".to_owned());
        };
        let engine = self.engine.insert(OverlayEngine::init(self.config.clone(), surface));
        engine.replace_all(pages, &self.layout);
        let annotations = engine.len();

        self.document = Some((ticket.file_id, ticket.user_id));
        self.load_state = LoadState::Ready;
        self.frames.request_frame(FrameTask::FullLayout);
        tracing::debug!(file_id = ticket.file_id, annotations, "document loaded");
        LoadOutcome::Loaded { annotations }
    }

    fn fail_load(&mut self, reason: String) -> LoadOutcome {
        tracing::warn!(%reason, "load failed");
        self.release_document();
        self.load_state = LoadState::Failed(reason.clone());
        LoadOutcome::Failed(reason)
    }

    /// Drop the engine and everything tied to the current document
    ///
    /// The surface is kept for the next engine.
    fn release_document(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.surface = Some(engine.into_surface());
            tracing::debug!("released document engine");
        }
        self.document = None;
        self.layout.clear();
    }

    /// Persist the engine's annotations for the loaded document
    ///
    /// Returns `Ok(false)` when nothing is loaded.
    pub fn save<S: AnnotationStore>(&mut self, store: &S) -> Result<bool, S::Error> {
        let (Some(engine), Some((file_id, user_id))) = (self.engine.as_ref(), self.document) else {
            return Ok(false);
        };
        let (request, _token) = self.requests.register(RequestKind::AnnotationSave);
        let result = engine.save(store, file_id, user_id);
        self.requests.complete(request);
        result.map(|()| true)
    }

    // Scheduling -----------------------------------------------------------

    /// Feed a renderer event; heavy work is deferred
    pub fn handle_renderer_event(&mut self, event: RendererEvent, now: Instant) {
        if self.destroyed {
            return;
        }
        match event {
            RendererEvent::DocumentReady { page_count } => {
                tracing::debug!(page_count, "document ready");
                self.frames.request_frame(FrameTask::FullLayout);
            }
            RendererEvent::PageGeometryReady { page } => {
                if self.layout.is_missing(page) {
                    self.frames.request_frame(FrameTask::FullLayout);
                }
            }
            RendererEvent::PageRendered { page } => {
                self.frames.request_frame(FrameTask::PageHeight(page));
            }
            RendererEvent::ScaleChanged { scale } => {
                if scale != self.zoom.scale() {
                    self.frames.request_frame(FrameTask::ScaleCorrection);
                }
                self.frames
                    .debounce(FrameTask::FullLayout, now, self.config.layout_debounce());
            }
        }
    }

    /// Whether the host should request an animation frame
    pub fn wants_frame(&self) -> bool {
        self.frames.has_frame_work()
    }

    /// Earliest timer deadline the host should arm
    pub fn next_deadline(&self) -> Option<Instant> {
        self.frames.next_deadline()
    }

    /// Run the work queued for this animation frame
    pub fn on_animation_frame(&mut self) {
        for task in self.frames.take_frame() {
            match task {
                FrameTask::FullLayout => self.run_full_layout(),
                FrameTask::PageHeight(page) => self.run_page_height(page),
                FrameTask::ScaleCorrection => self.run_scale_correction(),
                FrameTask::Gesture => self.run_gesture(),
                FrameTask::Recenter => self.recenter(),
            }
        }
    }

    /// Run expired timers
    pub fn on_timer(&mut self, now: Instant) {
        for task in self.frames.take_due(now) {
            if task == FrameTask::FullLayout {
                self.run_full_layout();
            }
        }
    }

    fn run_full_layout(&mut self) {
        let pass = self
            .layout
            .recompute(&self.renderer, self.config.padding, self.config.page_gap);
        if let Some(engine) = self.engine.as_mut() {
            engine.apply_layout(&pass.changed, &self.layout);
            if !self.layout.all().is_empty() {
                engine.complete_init();
            }
        }
        self.propagate_height();
    }

    fn run_page_height(&mut self, page: u32) {
        let pass = self.layout.update_page_height(&self.renderer, page);
        if !pass.missing.is_empty() {
            self.frames.request_frame(FrameTask::FullLayout);
            return;
        }
        if pass.is_noop() {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.apply_layout(&pass.changed, &self.layout);
        }
        self.propagate_height();
    }

    fn propagate_height(&mut self) {
        let (width, height) = self.layout.content_extent();
        self.scroll.set_content_size(width, height);
        self.recenter();
    }

    fn recenter(&mut self) {
        self.content_offset_x = self.zoom.center_horizontally(&mut self.scroll).content_offset_x;
    }

    fn run_scale_correction(&mut self) {
        let observed = self.renderer.scale();
        if let Some(corrected) = self.zoom.correct(observed) {
            tracing::debug!(observed, corrected, "correcting out-of-range scale");
            self.write_renderer_scale(corrected);
        }
    }

    fn run_gesture(&mut self) {
        match self.gestures.apply_frame(self.zoom.scale(), &mut self.scroll) {
            GestureOutcome::Idle => {}
            GestureOutcome::Panned { dx, .. } => self.zoom.note_manual_horizontal_scroll(dx),
            GestureOutcome::Pinched { scale } => {
                self.apply_scale(scale);
            }
        }
    }

    fn write_renderer_scale(&mut self, scale: f32) {
        if let Err(err) = self.renderer.set_scale(scale) {
            tracing::warn!(scale, %err, "renderer rejected scale");
        }
    }

    /// Route a scale request through the clamp and schedule correction
    fn apply_scale(&mut self, requested: f32) -> bool {
        if self.destroyed || self.zoom.set_scale(requested).is_none() {
            return false;
        }
        self.write_renderer_scale(self.zoom.scale());
        self.frames.request_frame(FrameTask::ScaleCorrection);
        true
    }

    // Viewport and zoom ----------------------------------------------------

    /// Update the scroll containers' client rects
    pub fn set_viewports(&mut self, horizontal: Rect, vertical: Rect) {
        self.scroll.horizontal_viewport = horizontal;
        self.scroll.vertical_viewport = vertical;
        self.frames.request_frame(FrameTask::Recenter);
    }

    /// The host scrolled the inner container natively
    pub fn note_horizontal_scroll(&mut self, scroll_left: f32) {
        let delta = scroll_left - self.scroll.scroll_left;
        self.scroll.set_scroll_left(scroll_left);
        self.zoom.note_manual_horizontal_scroll(delta);
    }

    /// The host scrolled the outer container natively
    pub fn note_vertical_scroll(&mut self, scroll_top: f32) {
        self.scroll.set_scroll_top(scroll_top);
    }

    pub fn set_scale(&mut self, scale: f32) -> bool {
        self.apply_scale(scale)
    }

    pub fn zoom_in(&mut self) -> bool {
        self.apply_scale(self.zoom.scale() * crate::zoom::ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.apply_scale(self.zoom.scale() / crate::zoom::ZOOM_STEP)
    }

    /// Scale the current page to the viewport width and re-enable centering
    pub fn fit_width(&mut self) -> bool {
        let page = self.renderer.current_page();
        let Some(metrics) = self.layout.metrics(page).or_else(|| self.layout.all().values().next())
        else {
            return false;
        };
        let (base_width, _) = metrics.base_size();
        let available = self.scroll.horizontal_viewport.width - 2.0 * self.config.padding;
        let changed = self.zoom.fit_width(available, base_width);
        if let Some(previous) = changed {
            tracing::debug!(previous, scale = self.zoom.scale(), "fit to width");
            self.write_renderer_scale(self.zoom.scale());
            self.frames.request_frame(FrameTask::ScaleCorrection);
        }
        self.frames.request_frame(FrameTask::Recenter);
        changed.is_some()
    }

    pub fn wheel(&mut self, input: WheelInput) -> WheelOutcome {
        if self.destroyed {
            return WheelOutcome::Ignored;
        }
        let before = self.zoom.scale();
        let outcome = self.zoom.on_wheel(input, &mut self.scroll);
        if let WheelOutcome::Zoomed { to, .. } = outcome {
            if to != before {
                self.write_renderer_scale(to);
                self.frames.request_frame(FrameTask::ScaleCorrection);
            }
        }
        outcome
    }

    // Pointer routing ------------------------------------------------------

    /// Map a viewport point into overlay pixels
    pub fn to_overlay(&self, position: Point) -> Point {
        Point::new(
            position.x - self.scroll.horizontal_viewport.x + self.scroll.scroll_left
                - self.content_offset_x,
            position.y - self.scroll.vertical_viewport.y + self.scroll.scroll_top,
        )
    }

    pub fn pointer_down(&mut self, event: PointerEvent) -> bool {
        if self.destroyed {
            return false;
        }
        if event.kind == PointerKind::Touch {
            if self.gestures.pointer_down(&event) {
                self.frames.request_frame(FrameTask::Gesture);
            }
            return true;
        }
        let point = self.to_overlay(event.position);
        let consumed = self.engine.as_mut().is_some_and(|e| e.pointer_down(point));
        let free_to_pan = self
            .engine
            .as_ref()
            .map_or(true, |e| e.mode() == crate::mode::Mode::None);
        if !consumed && free_to_pan {
            self.zoom.drag_start(event.position);
            return true;
        }
        consumed
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> bool {
        if self.destroyed {
            return false;
        }
        if event.kind == PointerKind::Touch {
            if self.gestures.pointer_move(&event) {
                self.frames.request_frame(FrameTask::Gesture);
            }
            return self.gestures.is_tracking(event.id);
        }
        if self.zoom.is_dragging() {
            return self.zoom.drag_move(event.position, &mut self.scroll);
        }
        let point = self.to_overlay(event.position);
        self.engine.as_mut().is_some_and(|e| e.pointer_move(point))
    }

    pub fn pointer_up(&mut self, event: PointerEvent) -> bool {
        if self.destroyed {
            return false;
        }
        if event.kind == PointerKind::Touch {
            return self.gestures.pointer_up(event.id);
        }
        if self.zoom.is_dragging() {
            self.zoom.drag_end();
            return true;
        }
        let point = self.to_overlay(event.position);
        self.engine.as_mut().is_some_and(|e| e.pointer_up(point))
    }

    /// Drop touch tracking and any drag pan for a cancelled pointer
    pub fn pointer_cancel(&mut self, id: u32) {
        self.gestures.pointer_up(id);
        self.zoom.drag_end();
    }

    pub fn key_down(&mut self, key: Key) -> bool {
        if self.destroyed {
            return false;
        }
        self.engine.as_mut().is_some_and(|e| e.key_down(key))
    }

    // Teardown -------------------------------------------------------------

    /// Cancel every scheduled callback and in-flight request, release the
    /// engine and detach all subscriptions
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let callbacks = self.frames.close();
        let requests = self.requests.cancel_all();
        self.release_document();
        self.gestures.reset();
        self.zoom.drag_end();
        self.load_state = LoadState::Idle;
        self.destroyed = true;
        tracing::debug!(callbacks, requests, "viewer session destroyed");
    }
}

impl<R: DocumentRenderer> Drop for ViewerSession<R> {
    fn drop(&mut self) {
        self.destroy();
    }
}
