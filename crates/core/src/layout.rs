//! Page layout synchronization
//!
//! Converts the renderer's per-page on-screen boxes into overlay-space
//! [`PageMetrics`]. Each pass reports which pages actually moved so the
//! overlay repositions only those page groups; an unchanged layout reports
//! nothing, which makes repeated passes harmless.

use crate::annotation::PagePoint;
use crate::geometry::{Point, Rect};
use crate::renderer::DocumentRenderer;
use std::collections::{BTreeMap, BTreeSet};

/// Overlay-space geometry of one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    /// 1-based page number
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Clockwise rotation in degrees
    pub rotation: u16,
    pub scale: f32,
}

impl PageMetrics {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    fn quarter_turns(&self) -> u16 {
        (self.rotation / 90) % 4
    }

    /// Unrotated page size at scale 1
    pub fn base_size(&self) -> (f32, f32) {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        if self.quarter_turns() % 2 == 1 {
            (self.height / scale, self.width / scale)
        } else {
            (self.width / scale, self.height / scale)
        }
    }

    /// Map a normalized page point into overlay pixels
    pub fn to_overlay(&self, point: PagePoint) -> Point {
        let (u, v) = match self.quarter_turns() {
            1 => (1.0 - point.y, point.x),
            2 => (1.0 - point.x, 1.0 - point.y),
            3 => (point.y, 1.0 - point.x),
            _ => (point.x, point.y),
        };
        Point::new(self.x + u * self.width, self.y + v * self.height)
    }

    /// Map an overlay point back into normalized page space (unclamped)
    pub fn from_overlay(&self, point: Point) -> PagePoint {
        let u = if self.width > 0.0 { (point.x - self.x) / self.width } else { 0.0 };
        let v = if self.height > 0.0 { (point.y - self.y) / self.height } else { 0.0 };
        match self.quarter_turns() {
            1 => PagePoint::new(v, 1.0 - u),
            2 => PagePoint::new(1.0 - u, 1.0 - v),
            3 => PagePoint::new(1.0 - v, u),
            _ => PagePoint::new(u, v),
        }
    }
}

/// Outcome of one synchronization pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPass {
    /// Pages whose metrics were created or changed
    pub changed: Vec<u32>,

    /// Pages the renderer has not materialized yet
    pub missing: Vec<u32>,
}

impl LayoutPass {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Per-page overlay geometry
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    metrics: BTreeMap<u32, PageMetrics>,
    missing: BTreeSet<u32>,
    padding: f32,
    full_passes: u32,
}

impl PageLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full pass over every page the renderer knows about
    ///
    /// Page boxes are shifted into overlay space and inset by `padding`. A
    /// page whose box overlaps its predecessor (stale boxes mid-zoom) is
    /// pushed down to keep at least `gap` between them. Missing pages are
    /// skipped and remembered.
    pub fn recompute<R: DocumentRenderer + ?Sized>(
        &mut self,
        renderer: &R,
        padding: f32,
        gap: f32,
    ) -> LayoutPass {
        let origin = renderer.overlay_origin();
        let page_count = renderer.page_count();
        let mut pass = LayoutPass::default();
        let mut previous_bottom: Option<f32> = None;

        for page in 1..=page_count {
            let viewport = match renderer.page_viewport(page) {
                Ok(Some(viewport)) => viewport,
                Ok(None) => {
                    pass.missing.push(page);
                    continue;
                }
                Err(err) => {
                    tracing::warn!(page, %err, "page geometry unavailable");
                    pass.missing.push(page);
                    continue;
                }
            };

            let mut y = viewport.rect.y - origin.y + padding;
            if let Some(bottom) = previous_bottom {
                y = y.max(bottom + gap);
            }

            let metrics = PageMetrics {
                page,
                x: viewport.rect.x - origin.x + padding,
                y,
                width: viewport.rect.width,
                height: viewport.rect.height,
                rotation: viewport.rotation,
                scale: viewport.scale,
            };
            previous_bottom = Some(metrics.y + metrics.height);

            if self.metrics.get(&page) != Some(&metrics) {
                self.metrics.insert(page, metrics);
                pass.changed.push(page);
            }
        }

        self.metrics.retain(|page, _| *page <= page_count);
        for page in &pass.missing {
            self.metrics.remove(page);
        }
        self.missing = pass.missing.iter().copied().collect();
        self.padding = padding;
        self.full_passes += 1;

        tracing::debug!(
            changed = pass.changed.len(),
            missing = pass.missing.len(),
            "layout pass"
        );
        pass
    }

    /// Cheap path after a page render: refresh only that page's height
    ///
    /// Following pages shift by the height delta so gaps are preserved. A page
    /// that has no metrics yet is reported as missing; the caller should run a
    /// full pass.
    pub fn update_page_height<R: DocumentRenderer + ?Sized>(
        &mut self,
        renderer: &R,
        page: u32,
    ) -> LayoutPass {
        let mut pass = LayoutPass::default();
        let height = match renderer.page_viewport(page) {
            Ok(Some(viewport)) => viewport.rect.height,
            Ok(None) => {
                pass.missing.push(page);
                return pass;
            }
            Err(err) => {
                tracing::warn!(page, %err, "page geometry unavailable");
                pass.missing.push(page);
                return pass;
            }
        };

        let Some(metrics) = self.metrics.get_mut(&page) else {
            pass.missing.push(page);
            return pass;
        };

        let delta = height - metrics.height;
        if delta == 0.0 {
            return pass;
        }
        metrics.height = height;
        pass.changed.push(page);

        for (other, metrics) in self.metrics.range_mut(page + 1..) {
            metrics.y += delta;
            pass.changed.push(*other);
        }
        pass
    }

    pub fn metrics(&self, page: u32) -> Option<&PageMetrics> {
        self.metrics.get(&page)
    }

    pub fn all(&self) -> &BTreeMap<u32, PageMetrics> {
        &self.metrics
    }

    /// Page whose box contains the overlay point
    pub fn page_at(&self, point: &Point) -> Option<&PageMetrics> {
        self.metrics.values().find(|m| m.rect().contains(point, 0.0))
    }

    pub fn is_missing(&self, page: u32) -> bool {
        self.missing.contains(&page)
    }

    /// Whether a page was skipped by the last full pass
    pub fn needs_rerun(&self) -> bool {
        !self.missing.is_empty()
    }

    /// Number of full passes run so far
    pub fn full_passes(&self) -> u32 {
        self.full_passes
    }

    /// Width and height the overlay must cover
    pub fn content_extent(&self) -> (f32, f32) {
        self.metrics.values().fold((0.0_f32, 0.0_f32), |(w, h), m| {
            (w.max(m.x + m.width + self.padding), h.max(m.y + m.height + self.padding))
        })
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.missing.clear();
        self.full_passes = 0;
    }
}
