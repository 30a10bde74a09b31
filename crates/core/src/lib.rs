//! Review Annotator Core Library
//!
//! Annotation overlay engine for a paginated document viewer. Annotations
//! live in page-normalized coordinates and are drawn onto an overlay that
//! tracks the renderer's page boxes through zoom, scroll and re-render.
//!
//! The crate is single-threaded and cooperative: the host feeds renderer
//! events, pointer input and animation-frame/timer ticks into a
//! [`ViewerSession`], which owns the [`OverlayEngine`] and every piece of
//! deferred work.

pub mod annotation;
pub mod config;
pub mod events;
pub mod geometry;
pub mod gesture;
pub mod history;
pub mod layout;
pub mod mode;
pub mod overlay;
pub mod renderer;
pub mod session;
pub mod store;
pub mod surface;
pub mod zoom;

pub use annotation::{
    group_by_page, Annotation, AnnotationGeometry, AnnotationId, AnnotationKind, Color,
    CoordinateSpace, GeometryError, HighlightShape, PageAnnotations, PagePoint, PageRect,
    TextStyle,
};
pub use config::{EngineConfig, HighlightSettings, InkSettings};
pub use events::{EventBus, EventKind, OverlayEvent, Subscription};
pub use geometry::{Point, Rect};
pub use gesture::{GestureOutcome, GestureRecognizer, PointerEvent, PointerKind};
pub use history::{UndoEntry, UndoStack};
pub use layout::{LayoutPass, PageLayout, PageMetrics};
pub use mode::{Mode, ModeEffect, ModeEvent};
pub use overlay::{EngineState, Key, OverlayEngine};
pub use renderer::{DocumentRenderer, PageViewport, RendererError, RendererEvent};
pub use session::{LoadOutcome, LoadState, LoadTicket, ViewerSession};
pub use store::AnnotationStore;
pub use surface::{NullSurface, OverlaySurface, SurfaceError};
pub use zoom::{ScrollState, WheelInput, WheelOutcome, ZoomCoordinator, MAX_SCALE, MIN_SCALE};
