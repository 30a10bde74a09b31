//! Zoom and scroll coordination
//!
//! Every scale write, whatever its origin (wheel, pinch, toolbar, renderer),
//! goes through [`clamp_scale`]. Scroll is split across two containers: the
//! inner one pans horizontally, the nearest overflowing ancestor scrolls
//! vertically.

use crate::geometry::{Point, Rect};

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;

/// Multiplicative step for one wheel notch or toolbar click
pub const ZOOM_STEP: f32 = 1.1;

/// Horizontal scroll smaller than this is not treated as a manual pan
const MANUAL_SCROLL_THRESHOLD: f32 = 0.5;

/// Clamp any requested scale into `[MIN_SCALE, MAX_SCALE]`
///
/// NaN maps to 1.0 so a broken source can never poison the scale.
pub fn clamp_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

/// Scroll offsets and viewport rectangles of the two scroll containers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollState {
    /// Horizontal offset of the inner container
    pub scroll_left: f32,

    /// Vertical offset of the outer (ancestor) container
    pub scroll_top: f32,

    /// Client rect of the inner container in viewport coordinates
    pub horizontal_viewport: Rect,

    /// Client rect of the outer container in viewport coordinates
    pub vertical_viewport: Rect,

    /// Overlay content size, kept in sync by height propagation
    pub content_width: f32,
    pub content_height: f32,
}

impl ScrollState {
    pub fn new(horizontal_viewport: Rect, vertical_viewport: Rect) -> Self {
        Self {
            horizontal_viewport,
            vertical_viewport,
            ..Self::default()
        }
    }

    /// Set the horizontal offset, clamped to `[0, max_scroll_left]`
    pub fn set_scroll_left(&mut self, value: f32) {
        self.scroll_left = clamp_offset(value, self.max_scroll_left());
    }

    /// Set the vertical offset, clamped to `[0, max_scroll_top]`
    pub fn set_scroll_top(&mut self, value: f32) {
        self.scroll_top = clamp_offset(value, self.max_scroll_top());
    }

    pub fn max_scroll_left(&self) -> f32 {
        (self.content_width - self.horizontal_viewport.width).max(0.0)
    }

    pub fn max_scroll_top(&self) -> f32 {
        (self.content_height - self.vertical_viewport.height).max(0.0)
    }

    /// Record new content size and pull offsets back inside it
    pub fn set_content_size(&mut self, width: f32, height: f32) {
        self.content_width = width.max(0.0);
        self.content_height = height.max(0.0);
        self.scroll_left = self.scroll_left.min(self.max_scroll_left());
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
    }
}

fn clamp_offset(value: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

/// CSS-like overflow setting of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    Visible,
    Hidden,
    Auto,
    Scroll,
}

/// One ancestor of the inner scroll container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollNode {
    pub overflow_y: Overflow,
    pub scroll_height: f32,
    pub client_height: f32,
}

/// Index of the nearest ancestor that really scrolls vertically
///
/// `ancestors` starts at the inner container's parent and walks outward; the
/// inner container itself is never a candidate.
pub fn nearest_vertical_scroller(ancestors: &[ScrollNode]) -> Option<usize> {
    ancestors.iter().position(|node| {
        matches!(node.overflow_y, Overflow::Auto | Overflow::Scroll)
            && node.scroll_height > node.client_height
    })
}

/// Raw wheel event from a mouse or trackpad
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelInput {
    pub delta_x: f32,
    pub delta_y: f32,
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

/// What a wheel event did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WheelOutcome {
    Scrolled,
    Panned,
    Zoomed { from: f32, to: f32 },
    Ignored,
}

/// Placement of content inside the horizontal viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centering {
    /// Left margin for content narrower than the viewport
    pub content_offset_x: f32,
    /// Whether `scroll_left` was rewritten
    pub scrolled: bool,
}

/// Owner of the scale value and the horizontal auto-centering switch
#[derive(Debug, Clone)]
pub struct ZoomCoordinator {
    scale: f32,
    auto_center: bool,
    drag_anchor: Option<Point>,
}

impl ZoomCoordinator {
    pub fn new(initial_scale: f32) -> Self {
        Self {
            scale: clamp_scale(initial_scale),
            auto_center: true,
            drag_anchor: None,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Set the scale through the clamp
    ///
    /// Returns the previous value when the scale actually changed.
    pub fn set_scale(&mut self, requested: f32) -> Option<f32> {
        if requested.is_nan() {
            return None;
        }
        let next = clamp_scale(requested);
        if next == self.scale {
            return None;
        }
        let previous = self.scale;
        self.scale = next;
        Some(previous)
    }

    pub fn zoom_in(&mut self) -> Option<f32> {
        self.set_scale(self.scale * ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> Option<f32> {
        self.set_scale(self.scale / ZOOM_STEP)
    }

    /// Deferred correction pass
    ///
    /// `observed` is the renderer's current scale, possibly written by a
    /// source outside this module. Returns the value to write back when the
    /// observed scale is out of range; in range values are adopted as is.
    pub fn correct(&mut self, observed: f32) -> Option<f32> {
        let corrected = clamp_scale(observed);
        self.scale = corrected;
        (corrected != observed).then_some(corrected)
    }

    /// Fit the page width into the viewport and re-enable centering
    pub fn fit_width(&mut self, viewport_width: f32, page_base_width: f32) -> Option<f32> {
        self.auto_center = true;
        if viewport_width <= 0.0 || page_base_width <= 0.0 {
            return None;
        }
        self.set_scale(viewport_width / page_base_width)
    }

    pub fn auto_center(&self) -> bool {
        self.auto_center
    }

    /// The user scrolled horizontally by hand
    ///
    /// Any offset change of at least half a pixel counts and disables
    /// auto-centering until the next fit-to-width.
    pub fn note_manual_horizontal_scroll(&mut self, delta: f32) {
        if delta.abs() >= MANUAL_SCROLL_THRESHOLD {
            self.auto_center = false;
        }
    }

    /// Center content horizontally
    ///
    /// Narrow content gets a left margin; wide content is scrolled to its
    /// middle unless the user has taken over horizontal scrolling.
    pub fn center_horizontally(&self, scroll: &mut ScrollState) -> Centering {
        let viewport_width = scroll.horizontal_viewport.width;
        if scroll.content_width <= viewport_width {
            let scrolled = scroll.scroll_left != 0.0;
            scroll.scroll_left = 0.0;
            return Centering {
                content_offset_x: (viewport_width - scroll.content_width) / 2.0,
                scrolled,
            };
        }
        if !self.auto_center {
            return Centering { content_offset_x: 0.0, scrolled: false };
        }
        let target = (scroll.content_width - viewport_width) / 2.0;
        let scrolled = scroll.scroll_left != target;
        scroll.scroll_left = target;
        Centering { content_offset_x: 0.0, scrolled }
    }

    /// Handle a non-touch wheel event
    ///
    /// Plain wheel scrolls the outer container, shift+wheel pans
    /// horizontally, ctrl/meta+wheel zooms one step per event.
    pub fn on_wheel(&mut self, input: WheelInput, scroll: &mut ScrollState) -> WheelOutcome {
        if input.ctrl || input.meta {
            if input.delta_y == 0.0 {
                return WheelOutcome::Ignored;
            }
            let from = self.scale;
            let changed = if input.delta_y < 0.0 { self.zoom_in() } else { self.zoom_out() };
            // A scale pushed out of range elsewhere is pulled back here too.
            self.scale = clamp_scale(self.scale);
            return match changed {
                Some(_) => WheelOutcome::Zoomed { from, to: self.scale },
                None => WheelOutcome::Ignored,
            };
        }

        if input.shift {
            let delta = if input.delta_x != 0.0 { input.delta_x } else { input.delta_y };
            if delta == 0.0 {
                return WheelOutcome::Ignored;
            }
            let before = scroll.scroll_left;
            scroll.set_scroll_left(before + delta);
            self.note_manual_horizontal_scroll(scroll.scroll_left - before);
            return WheelOutcome::Panned;
        }

        if input.delta_y == 0.0 {
            return WheelOutcome::Ignored;
        }
        scroll.set_scroll_top(scroll.scroll_top + input.delta_y);
        WheelOutcome::Scrolled
    }

    /// Start a mouse drag pan at a viewport position
    pub fn drag_start(&mut self, position: Point) {
        self.drag_anchor = Some(position);
    }

    /// Continue a mouse drag pan; content follows the pointer
    pub fn drag_move(&mut self, position: Point, scroll: &mut ScrollState) -> bool {
        let Some(anchor) = self.drag_anchor else {
            return false;
        };
        let dx = position.x - anchor.x;
        let dy = position.y - anchor.y;
        let before = scroll.scroll_left;
        scroll.set_scroll_left(before - dx);
        scroll.set_scroll_top(scroll.scroll_top - dy);
        self.note_manual_horizontal_scroll(scroll.scroll_left - before);
        self.drag_anchor = Some(position);
        true
    }

    pub fn drag_end(&mut self) {
        self.drag_anchor = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }
}

impl Default for ZoomCoordinator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scroll() -> ScrollState {
        let mut state = ScrollState::new(
            Rect::new(0.0, 0.0, 800.0, 600.0),
            Rect::new(0.0, 0.0, 800.0, 600.0),
        );
        state.set_content_size(1200.0, 5000.0);
        state
    }

    #[test]
    fn test_clamp_scale_bounds() {
        assert_eq!(clamp_scale(4.0), MAX_SCALE);
        assert_eq!(clamp_scale(0.1), MIN_SCALE);
        assert_eq!(clamp_scale(1.25), 1.25);
        assert_eq!(clamp_scale(f32::INFINITY), MAX_SCALE);
        assert_eq!(clamp_scale(f32::NEG_INFINITY), MIN_SCALE);
        assert_eq!(clamp_scale(f32::NAN), 1.0);
    }

    #[test]
    fn test_repeated_zoom_in_stops_at_max() {
        let mut zoom = ZoomCoordinator::new(1.0);
        for _ in 0..30 {
            zoom.zoom_in();
        }
        assert_eq!(zoom.scale(), MAX_SCALE);
        assert!(zoom.zoom_in().is_none());

        assert_eq!(zoom.set_scale(4.0), None);
        assert_eq!(zoom.scale(), 3.0);
    }

    #[test]
    fn test_mixed_sources_stay_in_range() {
        let mut zoom = ZoomCoordinator::new(1.0);
        let mut state = scroll();
        let requests = [0.0, -3.0, 7.5, f32::NAN, 2.2, 0.49, 3.01, 1e9];
        for (i, request) in requests.iter().enumerate() {
            zoom.set_scale(*request);
            zoom.correct(request * 0.9);
            zoom.on_wheel(
                WheelInput { delta_y: if i % 2 == 0 { -1.0 } else { 1.0 }, ctrl: true, ..Default::default() },
                &mut state,
            );
            assert!((MIN_SCALE..=MAX_SCALE).contains(&zoom.scale()), "step {i}");
        }
    }

    #[test]
    fn test_correction_pulls_external_scale_back() {
        let mut zoom = ZoomCoordinator::new(1.0);
        assert_eq!(zoom.correct(5.0), Some(3.0));
        assert_eq!(zoom.scale(), 3.0);
        assert_eq!(zoom.correct(1.4), None);
        assert_eq!(zoom.scale(), 1.4);
    }

    #[test]
    fn test_wheel_channels() {
        let mut zoom = ZoomCoordinator::new(1.0);
        let mut state = scroll();

        let outcome = zoom.on_wheel(WheelInput { delta_y: 120.0, ..Default::default() }, &mut state);
        assert_eq!(outcome, WheelOutcome::Scrolled);
        assert_eq!(state.scroll_top, 120.0);
        assert_eq!(state.scroll_left, 0.0);

        let outcome =
            zoom.on_wheel(WheelInput { delta_y: 40.0, shift: true, ..Default::default() }, &mut state);
        assert_eq!(outcome, WheelOutcome::Panned);
        assert_eq!(state.scroll_left, 40.0);
        assert_eq!(state.scroll_top, 120.0);
        assert!(!zoom.auto_center());

        let outcome =
            zoom.on_wheel(WheelInput { delta_y: -1.0, meta: true, ..Default::default() }, &mut state);
        match outcome {
            WheelOutcome::Zoomed { from, to } => {
                assert_eq!(from, 1.0);
                assert!((to - 1.1).abs() < 1e-6);
            }
            other => panic!("expected zoom, got {other:?}"),
        }

        zoom.on_wheel(WheelInput { delta_y: 1.0, ctrl: true, ..Default::default() }, &mut state);
        assert!((zoom.scale() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_centering_and_manual_override() {
        let mut zoom = ZoomCoordinator::new(1.0);
        let mut state = scroll();

        let centering = zoom.center_horizontally(&mut state);
        assert_eq!(state.scroll_left, 200.0);
        assert!(centering.scrolled);

        zoom.note_manual_horizontal_scroll(-30.0);
        state.scroll_left = 170.0;
        let centering = zoom.center_horizontally(&mut state);
        assert!(!centering.scrolled);
        assert_eq!(state.scroll_left, 170.0);

        zoom.fit_width(800.0, 600.0);
        assert!(zoom.auto_center());
        assert!((zoom.scale() - 800.0 / 600.0).abs() < 1e-6);
        zoom.center_horizontally(&mut state);
        assert_eq!(state.scroll_left, 200.0);
    }

    #[test]
    fn test_narrow_content_gets_margin() {
        let zoom = ZoomCoordinator::new(1.0);
        let mut state = scroll();
        state.set_content_size(500.0, 5000.0);

        let centering = zoom.center_horizontally(&mut state);
        assert_eq!(centering.content_offset_x, 150.0);
        assert_eq!(state.scroll_left, 0.0);
    }

    #[test]
    fn test_tiny_horizontal_jitter_keeps_centering() {
        let mut zoom = ZoomCoordinator::new(1.0);
        zoom.note_manual_horizontal_scroll(0.2);
        assert!(zoom.auto_center());
    }

    #[test]
    fn test_nearest_vertical_scroller_skips_non_overflowing() {
        let chain = [
            ScrollNode { overflow_y: Overflow::Auto, scroll_height: 600.0, client_height: 600.0 },
            ScrollNode { overflow_y: Overflow::Hidden, scroll_height: 5000.0, client_height: 600.0 },
            ScrollNode { overflow_y: Overflow::Scroll, scroll_height: 5000.0, client_height: 700.0 },
            ScrollNode { overflow_y: Overflow::Auto, scroll_height: 9000.0, client_height: 900.0 },
        ];
        assert_eq!(nearest_vertical_scroller(&chain), Some(2));
        assert_eq!(nearest_vertical_scroller(&chain[..2]), None);
    }

    #[test]
    fn test_drag_pan_follows_pointer() {
        let mut zoom = ZoomCoordinator::new(1.0);
        let mut state = scroll();
        state.scroll_top = 300.0;
        state.scroll_left = 100.0;

        zoom.drag_start(Point::new(400.0, 300.0));
        assert!(zoom.drag_move(Point::new(380.0, 250.0), &mut state));
        assert_eq!(state.scroll_left, 120.0);
        assert_eq!(state.scroll_top, 350.0);
        assert!(!zoom.auto_center());

        zoom.drag_end();
        assert!(!zoom.drag_move(Point::new(0.0, 0.0), &mut state));
    }

    #[test]
    fn test_scroll_setters_stop_at_content_end() {
        let mut state = scroll();
        state.set_scroll_left(5000.0);
        state.set_scroll_top(9000.0);
        assert_eq!(state.scroll_left, 400.0);
        assert_eq!(state.scroll_top, 4400.0);

        state.set_scroll_top(-20.0);
        assert_eq!(state.scroll_top, 0.0);
        state.set_scroll_left(f32::NAN);
        assert_eq!(state.scroll_left, 0.0);

        let mut zoom = ZoomCoordinator::new(1.0);
        state.set_scroll_top(4300.0);
        zoom.on_wheel(WheelInput { delta_y: 500.0, ..Default::default() }, &mut state);
        assert_eq!(state.scroll_top, 4400.0);
        zoom.drag_start(Point::new(0.0, 0.0));
        zoom.drag_move(Point::new(-900.0, 0.0), &mut state);
        assert_eq!(state.scroll_left, 400.0);
    }

    #[test]
    fn test_content_size_clamps_offsets() {
        let mut state = scroll();
        state.scroll_top = 4000.0;
        state.set_content_size(800.0, 1000.0);
        assert_eq!(state.scroll_top, 400.0);
        assert_eq!(state.scroll_left, 0.0);
    }
}
