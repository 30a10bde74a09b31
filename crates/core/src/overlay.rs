//! Annotation overlay engine
//!
//! Owns the annotation set, the drawing mode, selection and undo history for
//! one document. Pointer input arrives in overlay pixels and is mapped
//! through the page groups placed by the last [`OverlayEngine::apply_layout`];
//! geometry is stored in normalized page space.
//!
//! Calls into the [`OverlaySurface`] never fail an operation: surface errors
//! are logged and the in-memory state stays authoritative.

use crate::annotation::{
    new_annotation_id, timestamp_now, Annotation, AnnotationGeometry, AnnotationId, AnnotationKind,
    CoordinateSpace, HighlightShape, PageAnnotations, PagePoint, PageRect, TextStyle,
};
use crate::config::{EngineConfig, HighlightSettings, InkSettings};
use crate::events::{EventBus, EventKind, OverlayEvent, Subscription};
use crate::geometry::Point;
use crate::history::{UndoEntry, UndoStack};
use crate::layout::{PageLayout, PageMetrics};
use crate::mode::{transition, Mode, ModeEffect, ModeEvent};
use crate::store::AnnotationStore;
use crate::surface::{OverlaySurface, SurfaceError};
use std::collections::BTreeMap;

/// Lifecycle of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created; waiting for the first layout pass
    AwaitingLayout,
    Ready,
    Destroyed,
}

/// Keys the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Delete,
    Backspace,
}

/// Stroke being drawn in ink or highlight mode
#[derive(Debug, Clone)]
struct ActiveStroke {
    id: AnnotationId,
    page: u32,
    mode: Mode,
    points: Vec<PagePoint>,
    created_at: String,
}

/// Free-text box waiting for its text
#[derive(Debug, Clone)]
struct PendingText {
    page: u32,
    rect: PageRect,
    /// Annotation being re-edited
    editing: Option<Annotation>,
}

pub struct OverlayEngine {
    config: EngineConfig,
    state: EngineState,
    mode: Mode,
    pages: PageAnnotations,
    selection: Option<AnnotationId>,
    history: UndoStack,
    stroke: Option<ActiveStroke>,
    pending_text: Option<PendingText>,
    erasing: bool,
    /// Where each page group was last placed
    groups: BTreeMap<u32, PageMetrics>,
    ink: InkSettings,
    highlight: HighlightSettings,
    text_style: TextStyle,
    surface: Box<dyn OverlaySurface>,
    events: EventBus,
}

impl std::fmt::Debug for OverlayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayEngine")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("annotations", &self.len())
            .field("selection", &self.selection)
            .finish()
    }
}

impl OverlayEngine {
    /// Create an engine that waits for the first layout pass
    pub fn init(config: EngineConfig, surface: Box<dyn OverlaySurface>) -> Self {
        tracing::debug!("overlay engine created");
        Self {
            history: UndoStack::new(config.history_limit),
            ink: config.ink,
            highlight: config.highlight,
            text_style: config.text.clone(),
            config,
            state: EngineState::AwaitingLayout,
            mode: Mode::None,
            pages: PageAnnotations::new(),
            selection: None,
            stroke: None,
            pending_text: None,
            erasing: false,
            groups: BTreeMap::new(),
            surface,
            events: EventBus::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Mark the engine ready after the first full layout pass
    pub fn complete_init(&mut self) -> bool {
        if self.state != EngineState::AwaitingLayout {
            return false;
        }
        self.state = EngineState::Ready;
        self.events.emit(&OverlayEvent::Ready);
        true
    }

    pub fn on(&self, kind: EventKind, handler: impl FnMut(&OverlayEvent) + 'static) -> Subscription {
        self.events.on(kind, handler)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Data ---------------------------------------------------------------

    /// Swap the whole annotation set (document load or reload)
    ///
    /// History and selection are cleared; legacy records on pages whose
    /// metrics are known are migrated immediately.
    pub fn replace_all(&mut self, pages: PageAnnotations, layout: &PageLayout) {
        if self.state == EngineState::Destroyed {
            return;
        }
        self.discard_stroke();
        self.pending_text = None;
        self.erasing = false;
        self.select(None);
        self.history.clear();
        self.surface_call("clear", |s| s.clear());

        self.pages = pages;
        self.pages.retain(|_, list| !list.is_empty());
        let count = self.len();
        tracing::debug!(count, "annotations replaced");

        self.groups.clear();
        let known: Vec<u32> = layout.all().keys().copied().collect();
        self.apply_layout(&known, layout);

        self.events.emit(&OverlayEvent::AnnotationsReplaced { count });
        self.emit_history();
    }

    /// Reposition the groups of changed pages and redraw their annotations
    ///
    /// Groups of pages the layout no longer knows are dropped. Legacy
    /// records on a repositioned page are migrated here, once.
    pub fn apply_layout(&mut self, changed: &[u32], layout: &PageLayout) {
        if self.state == EngineState::Destroyed {
            return;
        }
        self.groups.retain(|page, _| layout.metrics(*page).is_some());
        for page in changed {
            let Some(metrics) = layout.metrics(*page).copied() else {
                continue;
            };
            self.groups.insert(*page, metrics);
            self.surface_call("place group", |s| s.place_group(&metrics));

            let (base_width, base_height) = metrics.base_size();
            let Some(list) = self.pages.get_mut(page) else {
                continue;
            };
            let migrated = list
                .iter_mut()
                .filter(|a| a.space() == CoordinateSpace::LegacyPixels)
                .map(|a| a.migrate_legacy(base_width, base_height))
                .filter(|migrated| *migrated)
                .count();
            if migrated > 0 {
                tracing::debug!(page, migrated, "migrated legacy annotations");
            }

            let drawable: Vec<Annotation> = list
                .iter()
                .filter(|a| a.is_renderable(Some(&metrics)))
                .cloned()
                .collect();
            for annotation in &drawable {
                self.surface_call("draw", |s| s.draw(annotation, &metrics));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every annotation in page order, drawing order within a page
    pub fn all_annotations(&self) -> Vec<Annotation> {
        self.pages.values().flatten().cloned().collect()
    }

    pub fn pages(&self) -> &PageAnnotations {
        &self.pages
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.pages.values().flatten().find(|a| a.id() == id)
    }

    /// Persist the whole set through `store`
    ///
    /// Errors come back unchanged and the in-memory set is not touched.
    pub fn save<S: AnnotationStore>(&self, store: &S, file_id: u64, user_id: u64) -> Result<(), S::Error> {
        let annotations = self.all_annotations();
        tracing::debug!(file_id, count = annotations.len(), "saving annotations");
        store.save(file_id, user_id, &annotations)
    }

    // Modes and styles -----------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.apply_mode_event(ModeEvent::Select(mode));
    }

    fn apply_mode_event(&mut self, event: ModeEvent) {
        if self.state == EngineState::Destroyed {
            return;
        }
        let from = self.mode;
        let outcome = transition(from, event);
        self.mode = outcome.next;
        for effect in &outcome.effects {
            match effect {
                ModeEffect::CancelStroke => self.discard_stroke(),
                ModeEffect::CancelTextEdit => self.pending_text = None,
                ModeEffect::ClearSelection => self.select(None),
                ModeEffect::NotifyModeChanged => {
                    self.events.emit(&OverlayEvent::ModeChanged { from, to: outcome.next })
                }
            }
        }
    }

    pub fn ink_settings(&self) -> InkSettings {
        self.ink
    }

    pub fn highlight_settings(&self) -> HighlightSettings {
        self.highlight
    }

    pub fn text_style(&self) -> &TextStyle {
        &self.text_style
    }

    /// Set the ink style; a selected ink annotation is restyled
    pub fn set_ink_settings(&mut self, settings: InkSettings) {
        self.ink = settings;
        self.restyle_selection(AnnotationKind::Ink, |geometry| {
            if let AnnotationGeometry::Ink { color, width, .. } = geometry {
                *color = settings.color;
                *width = settings.width;
            }
        });
    }

    pub fn set_highlight_settings(&mut self, settings: HighlightSettings) {
        self.highlight = settings;
        self.restyle_selection(AnnotationKind::Highlight, |geometry| {
            if let AnnotationGeometry::Highlight { color, width, opacity, .. } = geometry {
                *color = settings.color;
                *width = settings.width;
                *opacity = settings.opacity;
            }
        });
    }

    pub fn set_text_style(&mut self, style: TextStyle) {
        self.text_style = style.clone();
        self.restyle_selection(AnnotationKind::FreeText, move |geometry| {
            if let AnnotationGeometry::FreeText { style: current, .. } = geometry {
                *current = style.clone();
            }
        });
    }

    fn restyle_selection(&mut self, kind: AnnotationKind, apply: impl Fn(&mut AnnotationGeometry)) {
        let Some(selected) = self.selected_annotation().cloned() else {
            return;
        };
        if selected.kind() != kind {
            return;
        }
        let mut geometry = selected.geometry().clone();
        apply(&mut geometry);
        if geometry == *selected.geometry() {
            return;
        }
        self.modify(selected.with_geometry(geometry));
    }

    // Selection ------------------------------------------------------------

    pub fn selection(&self) -> Option<&AnnotationId> {
        self.selection.as_ref()
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.selection.as_deref().and_then(|id| self.annotation(id))
    }

    /// Select an annotation by id; unknown ids clear the selection
    pub fn select(&mut self, id: Option<AnnotationId>) {
        let id = id.filter(|id| self.annotation(id).is_some());
        if id == self.selection {
            return;
        }
        self.selection = id.clone();
        self.surface_call("set selection", |s| s.set_selection(id.as_ref()));
        self.events.emit(&OverlayEvent::SelectionChanged(id));
    }

    /// Topmost annotation under an overlay point (last drawn wins)
    pub fn hit_test(&self, point: &Point) -> Option<AnnotationId> {
        let tolerance = self.config.hit_tolerance;
        self.pages.iter().rev().find_map(|(page, list)| {
            let metrics = self.groups.get(page)?;
            list.iter()
                .rev()
                .find(|a| a.hit_test(point, metrics, tolerance))
                .map(|a| a.id().to_owned())
        })
    }

    fn page_at(&self, point: &Point) -> Option<PageMetrics> {
        self.groups.values().find(|m| m.rect().contains(point, 0.0)).copied()
    }

    // Pointer input --------------------------------------------------------

    /// Press at an overlay point
    ///
    /// Returns `true` when the press was consumed (an annotation was hit,
    /// a stroke or text box started, or something was erased). In mode none
    /// an unconsumed press is free for drag panning.
    pub fn pointer_down(&mut self, point: Point) -> bool {
        if !self.is_ready() {
            return false;
        }
        match self.mode {
            Mode::None => {
                let hit = self.hit_test(&point);
                let consumed = hit.is_some();
                self.select(hit);
                consumed
            }
            Mode::Ink | Mode::Highlight => {
                let Some(metrics) = self.page_at(&point) else {
                    return false;
                };
                self.discard_stroke();
                self.stroke = Some(ActiveStroke {
                    id: new_annotation_id(),
                    page: metrics.page,
                    mode: self.mode,
                    points: vec![metrics.from_overlay(point).clamped()],
                    created_at: timestamp_now(),
                });
                self.draw_stroke_preview(&metrics);
                true
            }
            Mode::FreeText => {
                let Some(metrics) = self.page_at(&point) else {
                    return false;
                };
                let anchor = metrics.from_overlay(point).clamped();
                let (width, height) = self.config.text_box_size;
                let rect = PageRect::new(
                    anchor.x.min(1.0 - width).max(0.0),
                    anchor.y.min(1.0 - height).max(0.0),
                    width,
                    height,
                );
                self.open_text_editor(metrics.page, rect, String::new(), None);
                true
            }
            Mode::Eraser => {
                self.erasing = true;
                self.erase_at(&point)
            }
        }
    }

    pub fn pointer_move(&mut self, point: Point) -> bool {
        if !self.is_ready() {
            return false;
        }
        match self.mode {
            Mode::Ink | Mode::Highlight => {
                let Some(stroke) = self.stroke.as_mut() else {
                    return false;
                };
                let Some(metrics) = self.groups.get(&stroke.page).copied() else {
                    return false;
                };
                stroke.points.push(metrics.from_overlay(point).clamped());
                self.draw_stroke_preview(&metrics);
                true
            }
            Mode::Eraser if self.erasing => self.erase_at(&point),
            _ => false,
        }
    }

    /// Release; finalizes a stroke into one add entry
    pub fn pointer_up(&mut self, point: Point) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.erasing = false;
        let Some(mut stroke) = self.stroke.take() else {
            return false;
        };
        if let Some(metrics) = self.groups.get(&stroke.page) {
            let last = metrics.from_overlay(point).clamped();
            if stroke.points.last() != Some(&last) {
                stroke.points.push(last);
            }
        }

        let geometry = self.stroke_geometry(stroke.mode, stroke.points);
        if let Err(err) = geometry.validate() {
            tracing::warn!(%err, "discarding invalid stroke");
            self.surface_call("remove", |s| s.remove(&stroke.id));
            return false;
        }
        let annotation = Annotation::from_parts(
            stroke.id,
            stroke.page,
            CoordinateSpace::Normalized,
            geometry,
            stroke.created_at,
            None,
        );
        self.add(annotation);
        true
    }

    fn stroke_geometry(&self, mode: Mode, points: Vec<PagePoint>) -> AnnotationGeometry {
        match mode {
            Mode::Highlight => AnnotationGeometry::Highlight {
                shape: HighlightShape::Stroke(points),
                color: self.highlight.color,
                width: self.highlight.width,
                opacity: self.highlight.opacity,
            },
            _ => AnnotationGeometry::Ink {
                points,
                color: self.ink.color,
                width: self.ink.width,
            },
        }
    }

    fn draw_stroke_preview(&mut self, metrics: &PageMetrics) {
        let Some(stroke) = &self.stroke else {
            return;
        };
        let preview = Annotation::from_parts(
            stroke.id.clone(),
            stroke.page,
            CoordinateSpace::Normalized,
            self.stroke_geometry(stroke.mode, stroke.points.clone()),
            stroke.created_at.clone(),
            None,
        );
        self.surface_call("draw", |s| s.draw(&preview, metrics));
    }

    fn discard_stroke(&mut self) {
        if let Some(stroke) = self.stroke.take() {
            self.surface_call("remove", |s| s.remove(&stroke.id));
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.stroke.is_some()
    }

    fn erase_at(&mut self, point: &Point) -> bool {
        match self.hit_test(point) {
            Some(id) => self.remove(&id).is_some(),
            None => false,
        }
    }

    // Free text ------------------------------------------------------------

    fn open_text_editor(&mut self, page: u32, rect: PageRect, initial: String, editing: Option<Annotation>) {
        self.surface_call("open text editor", |s| s.open_text_editor(page, rect, &initial));
        let editing_id = editing.as_ref().map(|a| a.id().to_owned());
        self.pending_text = Some(PendingText { page, rect, editing });
        self.events.emit(&OverlayEvent::TextEditRequested {
            page,
            rect,
            initial,
            editing: editing_id,
        });
    }

    /// Re-open the selected free-text annotation for editing
    pub fn edit_selected_text(&mut self) -> bool {
        let Some(selected) = self.selected_annotation().cloned() else {
            return false;
        };
        let AnnotationGeometry::FreeText { rect, text, .. } = selected.geometry() else {
            return false;
        };
        let (rect, text) = (*rect, text.clone());
        self.open_text_editor(selected.page(), rect, text, Some(selected));
        true
    }

    pub fn has_pending_text(&self) -> bool {
        self.pending_text.is_some()
    }

    /// Commit the pending text box
    ///
    /// Empty text discards the box. A new box becomes one add entry, a
    /// re-edit one modify entry; free-text mode then returns to none.
    pub fn commit_text(&mut self, text: &str) -> Option<AnnotationId> {
        let pending = self.pending_text.take()?;
        if text.trim().is_empty() {
            tracing::debug!(page = pending.page, "empty text discarded");
            return None;
        }

        let id = match pending.editing {
            Some(original) => {
                let AnnotationGeometry::FreeText { rect, style, .. } = original.geometry() else {
                    return None;
                };
                let geometry = AnnotationGeometry::FreeText {
                    rect: *rect,
                    text: text.to_owned(),
                    style: style.clone(),
                };
                let id = original.id().to_owned();
                if geometry != *original.geometry() {
                    self.modify(original.with_geometry(geometry));
                }
                id
            }
            None => {
                let annotation = Annotation::new(
                    pending.page,
                    AnnotationGeometry::FreeText {
                        rect: pending.rect,
                        text: text.to_owned(),
                        style: self.text_style.clone(),
                    },
                );
                let id = annotation.id().to_owned();
                self.add(annotation);
                id
            }
        };
        self.apply_mode_event(ModeEvent::FreeTextCommitted);
        Some(id)
    }

    pub fn cancel_text(&mut self) {
        self.pending_text = None;
    }

    // Keyboard -------------------------------------------------------------

    /// Handle a key press; returns `true` when handled
    ///
    /// Shortcuts are ignored while a text box is being edited.
    pub fn key_down(&mut self, key: Key) -> bool {
        if self.state == EngineState::Destroyed {
            return false;
        }
        match key {
            Key::Escape => {
                self.apply_mode_event(ModeEvent::Escape);
                true
            }
            _ if self.pending_text.is_some() => false,
            Key::Delete | Key::Backspace => self.delete_selected(),
            Key::Char(c) if Mode::from_shortcut(c).is_some() => {
                self.apply_mode_event(ModeEvent::Shortcut(c));
                true
            }
            Key::Char(_) => false,
        }
    }

    // Edits ----------------------------------------------------------------

    /// Remove the selected annotation (mode none only)
    pub fn delete_selected(&mut self) -> bool {
        if self.mode != Mode::None {
            return false;
        }
        match self.selection.clone() {
            Some(id) => self.remove(&id).is_some(),
            None => false,
        }
    }

    fn add(&mut self, annotation: Annotation) {
        self.insert_raw(annotation.clone(), None);
        self.history.push(UndoEntry::Add { annotation });
        self.emit_history();
    }

    fn remove(&mut self, id: &str) -> Option<Annotation> {
        let (annotation, index) = self.remove_raw(id)?;
        self.history.push(UndoEntry::Remove { annotation: annotation.clone(), index });
        self.emit_history();
        Some(annotation)
    }

    fn modify(&mut self, after: Annotation) {
        let Some(before) = self.replace_raw(after.clone()) else {
            return;
        };
        self.history.push(UndoEntry::Modify { before, after });
        self.emit_history();
    }

    fn draw(&mut self, annotation: &Annotation) {
        let Some(metrics) = self.groups.get(&annotation.page()).copied() else {
            return;
        };
        if annotation.is_renderable(Some(&metrics)) {
            self.surface_call("draw", |s| s.draw(annotation, &metrics));
        }
    }

    fn insert_raw(&mut self, annotation: Annotation, index: Option<usize>) {
        self.draw(&annotation);
        let list = self.pages.entry(annotation.page()).or_default();
        let index = index.unwrap_or(list.len()).min(list.len());
        list.insert(index, annotation.clone());
        self.events.emit(&OverlayEvent::AnnotationAdded(annotation));
    }

    fn remove_raw(&mut self, id: &str) -> Option<(Annotation, usize)> {
        let (page, index) = self.pages.iter().find_map(|(page, list)| {
            list.iter().position(|a| a.id() == id).map(|index| (*page, index))
        })?;
        let list = self.pages.get_mut(&page)?;
        let annotation = list.remove(index);
        if list.is_empty() {
            self.pages.remove(&page);
        }
        if self.selection.as_deref() == Some(id) {
            self.select(None);
        }
        self.surface_call("remove", |s| s.remove(id));
        self.events.emit(&OverlayEvent::AnnotationRemoved { id: id.to_owned(), page });
        Some((annotation, index))
    }

    fn replace_raw(&mut self, annotation: Annotation) -> Option<Annotation> {
        let slot = self
            .pages
            .get_mut(&annotation.page())?
            .iter_mut()
            .find(|a| a.id() == annotation.id())?;
        let before = std::mem::replace(slot, annotation.clone());
        self.draw(&annotation);
        self.events.emit(&OverlayEvent::AnnotationModified(annotation));
        Some(before)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Reverse the newest entry
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.undo() else {
            return false;
        };
        match entry {
            UndoEntry::Add { annotation } => {
                self.remove_raw(annotation.id());
            }
            UndoEntry::Remove { annotation, index } => self.insert_raw(annotation, Some(index)),
            UndoEntry::Modify { before, .. } => {
                self.replace_raw(before);
            }
        }
        self.emit_history();
        true
    }

    /// Replay the newest undone entry
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.redo() else {
            return false;
        };
        match entry {
            UndoEntry::Add { annotation } => self.insert_raw(annotation, None),
            UndoEntry::Remove { annotation, .. } => {
                self.remove_raw(annotation.id());
            }
            UndoEntry::Modify { after, .. } => {
                self.replace_raw(after);
            }
        }
        self.emit_history();
        true
    }

    fn emit_history(&self) {
        self.events.emit(&OverlayEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }

    // Teardown -------------------------------------------------------------

    /// Release all annotation state and detach every listener
    pub fn destroy(&mut self) {
        if self.state == EngineState::Destroyed {
            return;
        }
        self.events.clear();
        self.stroke = None;
        self.pending_text = None;
        self.selection = None;
        self.pages.clear();
        self.groups.clear();
        self.history.clear();
        self.surface_call("clear", |s| s.clear());
        self.state = EngineState::Destroyed;
        tracing::debug!("overlay engine destroyed");
    }

    /// Destroy the engine and hand back its surface for the next document
    pub fn into_surface(mut self) -> Box<dyn OverlaySurface> {
        self.destroy();
        self.surface
    }

    fn surface_call(
        &mut self,
        op: &'static str,
        call: impl FnOnce(&mut dyn OverlaySurface) -> Result<(), SurfaceError>,
    ) {
        if let Err(err) = call(self.surface.as_mut()) {
            tracing::warn!(op, %err, "overlay surface call failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::annotation::{group_by_page, Color};
    use crate::layout::tests::StubRenderer;
    use crate::store::tests::MemoryStore;
    use crate::surface::NullSurface;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Surface that records calls and can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub log: Rc<RefCell<Vec<String>>>,
        pub fail: bool,
    }

    impl OverlaySurface for RecordingSurface {
        fn place_group(&mut self, metrics: &PageMetrics) -> Result<(), SurfaceError> {
            self.log.borrow_mut().push(format!("place {}", metrics.page));
            if self.fail {
                return Err(SurfaceError::MissingGroup(metrics.page));
            }
            Ok(())
        }

        fn draw(&mut self, annotation: &Annotation, _metrics: &PageMetrics) -> Result<(), SurfaceError> {
            self.log.borrow_mut().push(format!("draw {}", annotation.id()));
            if self.fail {
                return Err(SurfaceError::Backend("draw failed".into()));
            }
            Ok(())
        }

        fn remove(&mut self, id: &str) -> Result<(), SurfaceError> {
            self.log.borrow_mut().push(format!("remove {id}"));
            Ok(())
        }

        fn set_selection(&mut self, _id: Option<&AnnotationId>) -> Result<(), SurfaceError> {
            Ok(())
        }

        fn open_text_editor(&mut self, page: u32, _rect: PageRect, _initial: &str) -> Result<(), SurfaceError> {
            self.log.borrow_mut().push(format!("editor {page}"));
            Ok(())
        }

        fn clear(&mut self) -> Result<(), SurfaceError> {
            self.log.borrow_mut().push("clear".into());
            Ok(())
        }
    }

    /// Two 600x800 pages at scale 1, page 1 at y 0, page 2 at y 810
    pub(crate) fn layout() -> PageLayout {
        let renderer = StubRenderer::stacked(2, 600.0, 800.0, 1.0);
        let mut layout = PageLayout::new();
        layout.recompute(&renderer, 0.0, 10.0);
        layout
    }

    pub(crate) fn ready_engine() -> OverlayEngine {
        let mut engine = OverlayEngine::init(EngineConfig::default(), Box::new(NullSurface));
        engine.apply_layout(&[1, 2], &layout());
        engine.complete_init();
        engine
    }

    fn draw_ink(engine: &mut OverlayEngine, from: (f32, f32), to: (f32, f32)) {
        engine.set_mode(Mode::Ink);
        engine.pointer_down(Point::new(from.0, from.1));
        engine.pointer_move(Point::new((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0));
        engine.pointer_up(Point::new(to.0, to.1));
    }

    #[test]
    fn test_input_ignored_until_ready() {
        let mut engine = OverlayEngine::init(EngineConfig::default(), Box::new(NullSurface));
        assert_eq!(engine.state(), EngineState::AwaitingLayout);
        engine.set_mode(Mode::Ink);
        assert!(!engine.pointer_down(Point::new(100.0, 100.0)));

        let ready = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&ready);
        let _sub = engine.on(EventKind::Ready, move |_| *flag.borrow_mut() = true);
        assert!(engine.complete_init());
        assert!(!engine.complete_init());
        assert!(*ready.borrow());
        assert!(engine.is_ready());
    }

    #[test]
    fn test_ink_stroke_creates_one_annotation() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));

        let all = engine.all_annotations();
        assert_eq!(all.len(), 1);
        let annotation = &all[0];
        assert_eq!(annotation.page(), 1);
        let AnnotationGeometry::Ink { points, color, .. } = annotation.geometry() else {
            panic!("expected ink");
        };
        assert_eq!(*color, Color::RED);
        assert_eq!(points.len(), 3);
        assert!((points[0].x - 0.1).abs() < 1e-6 && (points[0].y - 0.1).abs() < 1e-6);
        assert!((points[2].x - 0.5).abs() < 1e-6 && (points[2].y - 0.5).abs() < 1e-6);
        assert_eq!(engine.history.undo_count(), 1);
    }

    #[test]
    fn test_stroke_points_clamp_to_page() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::Highlight);
        engine.pointer_down(Point::new(300.0, 400.0));
        engine.pointer_up(Point::new(900.0, -50.0));

        let all = engine.all_annotations();
        let AnnotationGeometry::Highlight { shape: HighlightShape::Stroke(points), opacity, .. } =
            all[0].geometry()
        else {
            panic!("expected highlight stroke");
        };
        assert_eq!(points.last(), Some(&PagePoint::new(1.0, 0.0)));
        assert_eq!(*opacity, engine.highlight_settings().opacity);
    }

    #[test]
    fn test_press_outside_pages_is_ignored() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::Ink);
        assert!(!engine.pointer_down(Point::new(700.0, 100.0)));
        assert!(!engine.pointer_up(Point::new(700.0, 100.0)));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_undo_add_then_redo_restores_identical_annotation() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));
        let original = engine.all_annotations()[0].clone();

        assert!(engine.undo());
        assert!(engine.is_empty());
        assert!(engine.can_redo());

        assert!(engine.redo());
        assert_eq!(engine.all_annotations(), vec![original]);
        assert!(!engine.redo());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));
        engine.undo();
        draw_ink(&mut engine, (60.0, 900.0), (300.0, 1000.0));
        assert!(!engine.can_redo());
        assert_eq!(engine.all_annotations()[0].page(), 2);
    }

    #[test]
    fn test_selection_picks_topmost_and_delete_removes_it() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (0.0, 400.0), (600.0, 400.0));
        draw_ink(&mut engine, (300.0, 0.0), (300.0, 800.0));
        let top = engine.all_annotations()[1].id().to_owned();

        engine.set_mode(Mode::None);
        assert!(engine.pointer_down(Point::new(300.0, 400.0)));
        assert_eq!(engine.selection(), Some(&top));

        assert!(engine.key_down(Key::Delete));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.selection(), None);

        // Undo puts it back at its old index.
        engine.undo();
        assert_eq!(engine.all_annotations()[1].id(), top);

        // Pressing empty space clears selection and is not consumed.
        engine.pointer_down(Point::new(300.0, 400.0));
        assert!(!engine.pointer_down(Point::new(50.0, 50.0)));
        assert_eq!(engine.selection(), None);
    }

    #[test]
    fn test_eraser_removes_each_hit_as_own_entry() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (0.0, 100.0), (600.0, 100.0));
        draw_ink(&mut engine, (0.0, 300.0), (600.0, 300.0));

        engine.set_mode(Mode::Eraser);
        assert!(engine.pointer_down(Point::new(200.0, 100.0)));
        assert!(!engine.pointer_move(Point::new(200.0, 200.0)));
        assert!(engine.pointer_move(Point::new(200.0, 300.0)));
        engine.pointer_up(Point::new(200.0, 300.0));
        assert!(engine.is_empty());
        assert_eq!(engine.history.undo_count(), 4);

        // Moves after release do not erase.
        engine.undo();
        assert!(!engine.pointer_move(Point::new(200.0, 300.0)));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_free_text_commit_and_mode_return() {
        let mut engine = ready_engine();
        let requests = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&requests);
        let _sub = engine.on(EventKind::TextEditRequested, move |e| sink.borrow_mut().push(e.clone()));

        engine.set_mode(Mode::FreeText);
        assert!(engine.pointer_down(Point::new(300.0, 400.0)));
        assert!(engine.has_pending_text());
        assert_eq!(requests.borrow().len(), 1);

        let id = engine.commit_text("Looks good").unwrap();
        assert_eq!(engine.mode(), Mode::None);
        let annotation = engine.annotation(&id).unwrap();
        let AnnotationGeometry::FreeText { rect, text, .. } = annotation.geometry() else {
            panic!("expected free text");
        };
        assert_eq!(text, "Looks good");
        assert!((rect.x - 0.5).abs() < 1e-6 && (rect.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_is_discarded() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::FreeText);
        engine.pointer_down(Point::new(300.0, 400.0));
        assert_eq!(engine.commit_text("   "), None);
        assert!(engine.is_empty());
        assert!(!engine.can_undo());
        assert_eq!(engine.mode(), Mode::FreeText);
    }

    #[test]
    fn test_text_box_near_edge_stays_on_page() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::FreeText);
        engine.pointer_down(Point::new(599.0, 799.0));
        let id = engine.commit_text("edge").unwrap();
        let rect = engine.annotation(&id).unwrap().geometry().bounding_rect().unwrap();
        assert!(rect.x + rect.width <= 1.0 + 1e-6);
        assert!(rect.y + rect.height <= 1.0 + 1e-6);
    }

    #[test]
    fn test_re_editing_text_is_one_modify_entry() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::FreeText);
        engine.pointer_down(Point::new(300.0, 400.0));
        let id = engine.commit_text("first").unwrap();

        engine.select(Some(id.clone()));
        assert!(engine.edit_selected_text());
        assert_eq!(engine.commit_text("second"), Some(id.clone()));
        assert_eq!(engine.len(), 1);

        engine.undo();
        let AnnotationGeometry::FreeText { text, .. } = engine.annotation(&id).unwrap().geometry() else {
            panic!("expected free text");
        };
        assert_eq!(text, "first");
    }

    #[test]
    fn test_escape_and_mode_switch_close_a_re_edit() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::FreeText);
        engine.pointer_down(Point::new(300.0, 400.0));
        let id = engine.commit_text("note").unwrap();

        engine.select(Some(id.clone()));
        assert!(engine.edit_selected_text());
        assert!(engine.key_down(Key::Escape));
        assert!(!engine.has_pending_text());
        assert_eq!(engine.selection(), None);

        engine.select(Some(id));
        assert!(engine.edit_selected_text());
        engine.set_mode(Mode::Ink);
        assert!(!engine.has_pending_text());

        engine.set_mode(Mode::None);
        assert!(engine.key_down(Key::Char('p')));
        assert_eq!(engine.mode(), Mode::Ink);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_style_setter_restyles_matching_selection() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (0.0, 100.0), (600.0, 100.0));
        let id = engine.all_annotations()[0].id().to_owned();
        engine.set_mode(Mode::None);
        engine.select(Some(id.clone()));

        let blue = InkSettings { color: Color::rgb(0, 0, 255), width: 6.0 };
        engine.set_ink_settings(blue);
        let AnnotationGeometry::Ink { color, width, .. } = engine.annotation(&id).unwrap().geometry() else {
            panic!("expected ink");
        };
        assert_eq!((*color, *width), (blue.color, 6.0));
        assert_eq!(engine.history.undo_count(), 2);

        // Highlight settings do not touch an ink selection.
        engine.set_highlight_settings(HighlightSettings::default());
        assert_eq!(engine.history.undo_count(), 2);

        engine.undo();
        let AnnotationGeometry::Ink { color, .. } = engine.annotation(&id).unwrap().geometry() else {
            panic!("expected ink");
        };
        assert_eq!(*color, Color::RED);
    }

    #[test]
    fn test_shortcuts_and_escape() {
        let mut engine = ready_engine();
        let modes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&modes);
        let _sub = engine.on(EventKind::ModeChanged, move |e| {
            if let OverlayEvent::ModeChanged { to, .. } = e {
                sink.borrow_mut().push(*to);
            }
        });

        assert!(engine.key_down(Key::Char('p')));
        assert!(engine.key_down(Key::Char('e')));
        assert!(!engine.key_down(Key::Char('z')));
        assert!(engine.key_down(Key::Escape));
        assert_eq!(modes.borrow().as_slice(), &[Mode::Ink, Mode::Eraser, Mode::None]);
    }

    #[test]
    fn test_shortcuts_ignored_while_editing_text() {
        let mut engine = ready_engine();
        engine.set_mode(Mode::FreeText);
        engine.pointer_down(Point::new(300.0, 400.0));
        assert!(!engine.key_down(Key::Char('p')));
        assert_eq!(engine.mode(), Mode::FreeText);

        assert!(engine.key_down(Key::Escape));
        assert!(!engine.has_pending_text());
        assert_eq!(engine.mode(), Mode::None);
    }

    #[test]
    fn test_replace_all_migrates_legacy_and_clears_history() {
        let layout = layout();
        let mut engine = ready_engine();
        draw_ink(&mut engine, (0.0, 100.0), (600.0, 100.0));

        let legacy = Annotation::from_parts(
            "legacy".into(),
            2,
            CoordinateSpace::LegacyPixels,
            AnnotationGeometry::Ink {
                points: vec![PagePoint::new(300.0, 400.0)],
                color: Color::RED,
                width: 2.0,
            },
            "2024-05-01T10:00:00".into(),
            None,
        );
        engine.replace_all(group_by_page(vec![legacy]), &layout);

        assert!(!engine.can_undo());
        let migrated = engine.annotation("legacy").unwrap();
        assert_eq!(migrated.space(), CoordinateSpace::Normalized);
        assert_eq!(migrated.geometry().control_points()[0], PagePoint::new(0.5, 0.5));
    }

    #[test]
    fn test_legacy_waits_for_page_metrics() {
        let renderer = StubRenderer::stacked(1, 600.0, 800.0, 1.0);
        let mut layout = PageLayout::new();
        layout.recompute(&renderer, 0.0, 10.0);
        let mut engine = ready_engine();

        let legacy = Annotation::from_parts(
            "late".into(),
            2,
            CoordinateSpace::LegacyPixels,
            AnnotationGeometry::Ink {
                points: vec![PagePoint::new(60.0, 80.0)],
                color: Color::RED,
                width: 2.0,
            },
            "2024-05-01T10:00:00".into(),
            None,
        );
        engine.replace_all(group_by_page(vec![legacy]), &layout);
        assert_eq!(engine.annotation("late").unwrap().space(), CoordinateSpace::LegacyPixels);

        let renderer = StubRenderer::stacked(2, 600.0, 800.0, 2.0);
        let pass = layout.recompute(&renderer, 0.0, 10.0);
        engine.apply_layout(&pass.changed, &layout);
        let point = engine.annotation("late").unwrap().geometry().control_points()[0];
        assert!((point.x - 0.1).abs() < 1e-6 && (point.y - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_surface_errors_are_swallowed() {
        let layout = layout();
        let log = Rc::new(RefCell::new(Vec::new()));
        let surface = RecordingSurface { log: Rc::clone(&log), fail: true };
        let mut engine = OverlayEngine::init(EngineConfig::default(), Box::new(surface));
        engine.apply_layout(&[1, 2], &layout);
        engine.complete_init();

        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));
        assert_eq!(engine.len(), 1);
        assert!(log.borrow().iter().any(|entry| entry.starts_with("draw")));
    }

    #[test]
    fn test_save_delegates_and_propagates_errors() {
        let mut engine = ready_engine();
        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));
        let store = MemoryStore::default();

        engine.save(&store, 42, 7).unwrap();
        assert_eq!(store.saved.borrow()[0], engine.all_annotations());

        store.fail.set(true);
        assert!(engine.save(&store, 42, 7).is_err());
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_destroy_detaches_listeners_and_state() {
        let mut engine = ready_engine();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = engine.on(EventKind::AnnotationAdded, move |_| *counter.borrow_mut() += 1);
        draw_ink(&mut engine, (60.0, 80.0), (300.0, 400.0));

        engine.destroy();
        assert_eq!(engine.state(), EngineState::Destroyed);
        assert!(engine.is_empty());
        assert_eq!(engine.events().listener_count(), 0);

        engine.set_mode(Mode::Ink);
        assert!(!engine.pointer_down(Point::new(60.0, 80.0)));
        assert_eq!(*calls.borrow(), 1);
    }
}
