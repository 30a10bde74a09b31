//! Touch gesture recognition
//!
//! Only touch pointers are tracked here. Moves just record positions; the
//! actual pan or pinch is applied once per animation frame in
//! [`GestureRecognizer::apply_frame`].

use crate::geometry::{Point, Rect};
use crate::zoom::{clamp_scale, ScrollState};

/// Input device behind a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// One raw pointer sample in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: u32,
    pub kind: PointerKind,
    pub position: Point,
}

impl PointerEvent {
    pub fn new(id: u32, kind: PointerKind, position: Point) -> Self {
        Self { id, kind, position }
    }

    pub fn touch(id: u32, x: f32, y: f32) -> Self {
        Self::new(id, PointerKind::Touch, Point::new(x, y))
    }

    pub fn mouse(x: f32, y: f32) -> Self {
        Self::new(0, PointerKind::Mouse, Point::new(x, y))
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedPointer {
    id: u32,
    /// Position at the last applied frame
    last: Point,
    current: Point,
}

/// State captured on the first frame with two or more pointers
#[derive(Debug, Clone, Copy)]
struct PinchBaseline {
    distance: f32,
    scale: f32,
    scroll_left: f32,
    scroll_top: f32,
    horizontal_viewport: Rect,
    vertical_viewport: Rect,
    midpoint: Point,
}

/// Result of one applied frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureOutcome {
    /// Nothing to apply
    Idle,
    /// Single-finger pan by the applied scroll delta
    Panned { dx: f32, dy: f32 },
    /// Pinch step; `scale` is already clamped
    Pinched { scale: f32 },
}

#[derive(Debug, Default)]
pub struct GestureRecognizer {
    pointers: Vec<TrackedPointer>,
    baseline: Option<PinchBaseline>,
    frame_pending: bool,
}

impl GestureRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new touch pointer
    ///
    /// Returns `true` when the caller should request an animation frame.
    pub fn pointer_down(&mut self, event: &PointerEvent) -> bool {
        if event.kind != PointerKind::Touch {
            return false;
        }
        match self.pointers.iter_mut().find(|p| p.id == event.id) {
            Some(pointer) => {
                pointer.last = event.position;
                pointer.current = event.position;
            }
            None => self.pointers.push(TrackedPointer {
                id: event.id,
                last: event.position,
                current: event.position,
            }),
        }
        // Capture the pinch baseline before any movement.
        self.pointers.len() >= 2 && self.claim_frame()
    }

    /// Record a move; returns `true` on the first move since the last apply
    pub fn pointer_move(&mut self, event: &PointerEvent) -> bool {
        if event.kind != PointerKind::Touch {
            return false;
        }
        let Some(pointer) = self.pointers.iter_mut().find(|p| p.id == event.id) else {
            return false;
        };
        pointer.current = event.position;
        self.claim_frame()
    }

    /// Pointer up or cancel
    pub fn pointer_up(&mut self, id: u32) -> bool {
        let Some(index) = self.pointers.iter().position(|p| p.id == id) else {
            return false;
        };
        self.pointers.remove(index);

        // Losing one of the two baseline fingers invalidates the baseline.
        if self.pointers.len() < 2 || index < 2 {
            self.baseline = None;
        }
        for pointer in &mut self.pointers {
            pointer.last = pointer.current;
        }
        true
    }

    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_tracking(&self, id: u32) -> bool {
        self.pointers.iter().any(|p| p.id == id)
    }

    pub fn is_pinching(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Drop every pointer and the baseline
    pub fn reset(&mut self) {
        self.pointers.clear();
        self.baseline = None;
        self.frame_pending = false;
    }

    fn claim_frame(&mut self) -> bool {
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        true
    }

    /// Apply accumulated movement for this frame
    ///
    /// Pans mutate `scroll` directly. Pinches mutate `scroll` and return the
    /// new scale; the caller writes it to the renderer.
    pub fn apply_frame(&mut self, scale: f32, scroll: &mut ScrollState) -> GestureOutcome {
        self.frame_pending = false;
        let outcome = match self.pointers.len() {
            0 => GestureOutcome::Idle,
            1 => self.apply_pan(scroll),
            _ => self.apply_pinch(scale, scroll),
        };
        for pointer in &mut self.pointers {
            pointer.last = pointer.current;
        }
        outcome
    }

    fn apply_pan(&self, scroll: &mut ScrollState) -> GestureOutcome {
        let pointer = self.pointers[0];
        let dx = pointer.current.x - pointer.last.x;
        let dy = pointer.current.y - pointer.last.y;
        if dx == 0.0 && dy == 0.0 {
            return GestureOutcome::Idle;
        }
        let (left, top) = (scroll.scroll_left, scroll.scroll_top);
        scroll.set_scroll_left(left + dx);
        scroll.set_scroll_top(top + dy);
        GestureOutcome::Panned {
            dx: scroll.scroll_left - left,
            dy: scroll.scroll_top - top,
        }
    }

    fn apply_pinch(&mut self, scale: f32, scroll: &mut ScrollState) -> GestureOutcome {
        let (a, b) = (self.pointers[0].current, self.pointers[1].current);
        let distance = a.distance_to(&b);
        let midpoint = a.midpoint(&b);

        let Some(baseline) = self.baseline else {
            if distance > 0.0 {
                self.baseline = Some(PinchBaseline {
                    distance,
                    scale,
                    scroll_left: scroll.scroll_left,
                    scroll_top: scroll.scroll_top,
                    horizontal_viewport: scroll.horizontal_viewport,
                    vertical_viewport: scroll.vertical_viewport,
                    midpoint,
                });
            }
            return GestureOutcome::Idle;
        };

        let ratio = distance / baseline.distance;
        let new_scale = clamp_scale(baseline.scale * ratio);
        let factor = new_scale / baseline.scale;

        let content_x =
            baseline.scroll_left + (baseline.midpoint.x - baseline.horizontal_viewport.x);
        let content_y = baseline.scroll_top + (baseline.midpoint.y - baseline.vertical_viewport.y);
        let mid_x = midpoint.x - scroll.horizontal_viewport.x;
        let mid_y = midpoint.y - scroll.vertical_viewport.y;

        scroll.set_scroll_left(content_x * factor - mid_x);
        scroll.set_scroll_top(content_y * factor - mid_y);

        GestureOutcome::Pinched { scale: new_scale }
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
        state.set_content_size(2000.0, 6000.0);
        state
    }

    #[test]
    fn test_non_touch_pointers_are_ignored() {
        let mut recognizer = GestureRecognizer::new();
        assert!(!recognizer.pointer_down(&PointerEvent::mouse(10.0, 10.0)));
        assert!(!recognizer.pointer_down(&PointerEvent::new(
            3,
            PointerKind::Pen,
            Point::new(0.0, 0.0)
        )));
        assert_eq!(recognizer.active_pointers(), 0);
    }

    #[test]
    fn test_single_finger_pan_applies_delta() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();
        state.scroll_top = 100.0;

        recognizer.pointer_down(&PointerEvent::touch(1, 100.0, 100.0));
        assert!(recognizer.pointer_move(&PointerEvent::touch(1, 110.0, 130.0)));

        let outcome = recognizer.apply_frame(1.0, &mut state);
        assert_eq!(outcome, GestureOutcome::Panned { dx: 10.0, dy: 30.0 });
        assert_eq!(state.scroll_left, 10.0);
        assert_eq!(state.scroll_top, 130.0);

        // No further movement, nothing to do.
        assert_eq!(recognizer.apply_frame(1.0, &mut state), GestureOutcome::Idle);
    }

    #[test]
    fn test_moves_coalesce_into_one_frame() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();
        recognizer.pointer_down(&PointerEvent::touch(1, 0.0, 0.0));

        assert!(recognizer.pointer_move(&PointerEvent::touch(1, 5.0, 0.0)));
        assert!(!recognizer.pointer_move(&PointerEvent::touch(1, 12.0, 0.0)));
        assert!(!recognizer.pointer_move(&PointerEvent::touch(1, 20.0, 0.0)));

        assert_eq!(
            recognizer.apply_frame(1.0, &mut state),
            GestureOutcome::Panned { dx: 20.0, dy: 0.0 }
        );
        assert!(recognizer.pointer_move(&PointerEvent::touch(1, 25.0, 0.0)));
    }

    #[test]
    fn test_pinch_from_100_to_150_reaches_one_and_a_half() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();

        recognizer.pointer_down(&PointerEvent::touch(1, 300.0, 300.0));
        assert!(recognizer.pointer_down(&PointerEvent::touch(2, 400.0, 300.0)));
        assert_eq!(recognizer.apply_frame(1.0, &mut state), GestureOutcome::Idle);
        assert!(recognizer.is_pinching());

        recognizer.pointer_move(&PointerEvent::touch(1, 275.0, 300.0));
        recognizer.pointer_move(&PointerEvent::touch(2, 425.0, 300.0));
        match recognizer.apply_frame(1.0, &mut state) {
            GestureOutcome::Pinched { scale } => assert!((scale - 1.5).abs() < 1e-6),
            other => panic!("expected pinch, got {other:?}"),
        }
    }

    #[test]
    fn test_pinch_keeps_content_under_midpoint() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();
        state.horizontal_viewport = Rect::new(40.0, 60.0, 800.0, 600.0);
        state.vertical_viewport = Rect::new(0.0, 60.0, 880.0, 600.0);
        state.scroll_left = 120.0;
        state.scroll_top = 900.0;
        let base_scale = 1.2;

        recognizer.pointer_down(&PointerEvent::touch(7, 200.0, 260.0));
        recognizer.pointer_down(&PointerEvent::touch(9, 320.0, 340.0));
        recognizer.apply_frame(base_scale, &mut state);

        let base_mid = Point::new(260.0, 300.0);
        let content_x = (120.0 + base_mid.x - 40.0) / base_scale;
        let content_y = (900.0 + base_mid.y - 60.0) / base_scale;

        // Spread and drift the fingers.
        recognizer.pointer_move(&PointerEvent::touch(7, 170.0, 230.0));
        recognizer.pointer_move(&PointerEvent::touch(9, 370.0, 390.0));
        let GestureOutcome::Pinched { scale } = recognizer.apply_frame(base_scale, &mut state) else {
            panic!("expected pinch");
        };

        let mid = Point::new(270.0, 310.0);
        let after_x = (state.scroll_left + mid.x - 40.0) / scale;
        let after_y = (state.scroll_top + mid.y - 60.0) / scale;
        assert!((after_x - content_x).abs() < 0.01);
        assert!((after_y - content_y).abs() < 0.01);
    }

    #[test]
    fn test_pinch_scale_is_clamped() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();
        recognizer.pointer_down(&PointerEvent::touch(1, 100.0, 100.0));
        recognizer.pointer_down(&PointerEvent::touch(2, 110.0, 100.0));
        recognizer.apply_frame(2.0, &mut state);

        recognizer.pointer_move(&PointerEvent::touch(2, 600.0, 100.0));
        assert_eq!(
            recognizer.apply_frame(2.0, &mut state),
            GestureOutcome::Pinched { scale: 3.0 }
        );
    }

    #[test]
    fn test_lifting_a_finger_rebases_without_jump() {
        let mut recognizer = GestureRecognizer::new();
        let mut state = scroll();
        recognizer.pointer_down(&PointerEvent::touch(1, 100.0, 100.0));
        recognizer.pointer_down(&PointerEvent::touch(2, 200.0, 100.0));
        recognizer.apply_frame(1.0, &mut state);
        recognizer.pointer_move(&PointerEvent::touch(1, 90.0, 100.0));

        assert!(recognizer.pointer_up(2));
        assert!(!recognizer.is_pinching());
        let before = state;

        // Remaining finger was rebased at its current position.
        assert_eq!(recognizer.apply_frame(1.0, &mut state), GestureOutcome::Idle);
        assert_eq!(state, before);

        recognizer.pointer_move(&PointerEvent::touch(1, 95.0, 100.0));
        assert_eq!(
            recognizer.apply_frame(1.0, &mut state),
            GestureOutcome::Panned { dx: 5.0, dy: 0.0 }
        );
    }

    #[test]
    fn test_unknown_pointer_up_is_ignored() {
        let mut recognizer = GestureRecognizer::new();
        assert!(!recognizer.pointer_up(42));
        recognizer.pointer_down(&PointerEvent::touch(1, 0.0, 0.0));
        recognizer.reset();
        assert_eq!(recognizer.active_pointers(), 0);
    }
}
