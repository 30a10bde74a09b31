//! Adapter over the vector graphics layer that draws annotations
//!
//! The engine keeps one group per page and positions it from the page's
//! metrics; annotations are drawn into their page's group. Every call returns
//! an explicit result and the engine decides what to swallow.

use crate::annotation::{Annotation, AnnotationId, PageRect};
use crate::layout::PageMetrics;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("no group for page {0}")]
    MissingGroup(u32),
    #[error("graphics backend error: {0}")]
    Backend(String),
}

pub trait OverlaySurface {
    /// Create or move the group for a page
    fn place_group(&mut self, metrics: &PageMetrics) -> Result<(), SurfaceError>;

    /// Draw or redraw an annotation inside its page group
    fn draw(&mut self, annotation: &Annotation, metrics: &PageMetrics) -> Result<(), SurfaceError>;

    /// Remove an annotation's drawing
    fn remove(&mut self, id: &str) -> Result<(), SurfaceError>;

    /// Mark the selected annotation, `None` clears the mark
    fn set_selection(&mut self, id: Option<&AnnotationId>) -> Result<(), SurfaceError>;

    /// Show the inline text editor for a pending free-text box
    fn open_text_editor(
        &mut self,
        page: u32,
        rect: PageRect,
        initial: &str,
    ) -> Result<(), SurfaceError>;

    /// Drop every group and drawing
    fn clear(&mut self) -> Result<(), SurfaceError>;
}

/// Surface that draws nothing (headless use)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl OverlaySurface for NullSurface {
    fn place_group(&mut self, _metrics: &PageMetrics) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn draw(&mut self, _annotation: &Annotation, _metrics: &PageMetrics) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn remove(&mut self, _id: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn set_selection(&mut self, _id: Option<&AnnotationId>) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn open_text_editor(
        &mut self,
        _page: u32,
        _rect: PageRect,
        _initial: &str,
    ) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }
}
