//! Adapter over the external document renderer
//!
//! The renderer owns pagination, scaling and the document's own pixels. The
//! overlay only reads its geometry and writes scale/current page through this
//! trait, so the rest of the crate never touches renderer internals and every
//! call has an explicit result.

use crate::geometry::{Point, Rect};

/// On-screen geometry of one materialized page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    /// Page box in the same frame as [`DocumentRenderer::overlay_origin`]
    pub rect: Rect,

    /// Clockwise rotation in degrees (0, 90, 180, 270)
    pub rotation: u16,

    /// Scale the page was laid out at
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RendererError {
    #[error("page {0} is out of range")]
    PageOutOfRange(u32),
    #[error("renderer has no document")]
    NoDocument,
    #[error("renderer backend error: {0}")]
    Backend(String),
}

/// Surface the renderer must expose
pub trait DocumentRenderer {
    /// Current scale factor
    fn scale(&self) -> f32;

    /// Request a new scale factor
    fn set_scale(&mut self, scale: f32) -> Result<(), RendererError>;

    /// Current 1-based page number
    fn current_page(&self) -> u32;

    fn set_current_page(&mut self, page: u32) -> Result<(), RendererError>;

    fn page_count(&self) -> u32;

    /// Geometry of `page`, or `None` while the page is not materialized yet
    fn page_viewport(&self, page: u32) -> Result<Option<PageViewport>, RendererError>;

    /// Top-left corner of the overlay layer in the page-box frame
    fn overlay_origin(&self) -> Point;
}

/// Events the renderer emits
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RendererEvent {
    /// Document parsed; page count known
    DocumentReady { page_count: u32 },

    /// A page's box is now available
    PageGeometryReady { page: u32 },

    /// A page finished drawing (its height may have changed)
    PageRendered { page: u32 },

    /// Scale changed, from any source
    ScaleChanged { scale: f32 },
}
