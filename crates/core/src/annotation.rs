//! Annotation data model
//!
//! Annotations live in page space. The canonical form is normalized: origin
//! at the top-left of the unrotated page box, x and y in `0..=1`. Records
//! written by older clients are in unscaled page pixels and carry
//! [`CoordinateSpace::LegacyPixels`] until [`Annotation::migrate_legacy`]
//! converts them, which happens once the page's metrics are known.

use crate::geometry::{near_polyline, Point, Rect};
use crate::layout::PageMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque annotation identifier
///
/// Ids created here are UUID v4 strings; ids coming from the backend are
/// kept verbatim.
pub type AnnotationId = String;

/// Annotations grouped by 1-based page number, each list in drawing order
pub type PageAnnotations = BTreeMap<u32, Vec<Annotation>>;

/// Generate a fresh annotation id
pub fn new_annotation_id() -> AnnotationId {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time as an RFC 3339 string
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// The three supported annotation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Ink,
    Highlight,
    FreeText,
}

impl AnnotationKind {
    /// Name used in the wire payload
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Ink => "ink",
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::FreeText => "freetext",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ink" => Some(AnnotationKind::Ink),
            "highlight" => Some(AnnotationKind::Highlight),
            "freetext" => Some(AnnotationKind::FreeText),
            _ => None,
        }
    }
}

/// Which coordinate convention an annotation's geometry uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CoordinateSpace {
    /// Version 1: unscaled page pixels
    LegacyPixels,
    /// Version 2: normalized `0..=1` page space
    Normalized,
}

impl TryFrom<u8> for CoordinateSpace {
    type Error = String;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            1 => Ok(CoordinateSpace::LegacyPixels),
            2 => Ok(CoordinateSpace::Normalized),
            other => Err(format!("unsupported coordinate version {other}")),
        }
    }
}

impl From<CoordinateSpace> for u8 {
    fn from(space: CoordinateSpace) -> Self {
        match space {
            CoordinateSpace::LegacyPixels => 1,
            CoordinateSpace::Normalized => 2,
        }
    }
}

/// RGBA color, serialized as `#rrggbb` or `#rrggbbaa`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    pub fn parse_hex(value: &str) -> Option<Color> {
        let hex = value.trim().trim_start_matches('#');
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => {
                let mut expanded = String::with_capacity(6);
                for c in hex.chars() {
                    expanded.push(c);
                    expanded.push(c);
                }
                Color::parse_hex(&expanded)
            }
            6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Color::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 235, b: 59, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value).ok_or_else(|| format!("invalid color '{value}'"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// A point in page space (normalized or legacy pixels, see [`CoordinateSpace`])
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamp into the unit square
    pub fn clamped(&self) -> PagePoint {
        PagePoint::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

/// A rectangle in page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    fn bounding(points: &[PagePoint]) -> Option<PageRect> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in &points[1..] {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Some(PageRect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    fn corners(&self) -> [PagePoint; 2] {
        [
            PagePoint::new(self.x, self.y),
            PagePoint::new(self.x + self.width, self.y + self.height),
        ]
    }
}

/// Font styling for free-text annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub color: Color,

    /// Font size in unscaled page pixels
    pub font_size: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { color: Color::BLACK, font_size: 14.0 }
    }
}

/// Highlight geometry: a box or a freehand marker stroke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightShape {
    Rect(PageRect),
    Stroke(Vec<PagePoint>),
}

/// Kind-specific annotation payload
///
/// Widths and font sizes are in unscaled page pixels; rendering multiplies
/// them by the current scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationGeometry {
    /// Freehand pen stroke
    Ink {
        points: Vec<PagePoint>,
        color: Color,
        width: f32,
    },

    /// Translucent marker
    Highlight {
        shape: HighlightShape,
        color: Color,
        width: f32,
        opacity: f32,
    },

    /// Text box anchored at `rect`
    FreeText {
        rect: PageRect,
        text: String,
        style: TextStyle,
    },
}

/// Reasons a geometry payload is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("stroke has no points")]
    EmptyStroke,
    #[error("non-finite coordinate")]
    NonFinite,
    #[error("negative size")]
    NegativeSize,
    #[error("opacity {0} outside 0..=1")]
    Opacity(f32),
}

impl AnnotationGeometry {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationGeometry::Ink { .. } => AnnotationKind::Ink,
            AnnotationGeometry::Highlight { .. } => AnnotationKind::Highlight,
            AnnotationGeometry::FreeText { .. } => AnnotationKind::FreeText,
        }
    }

    /// Every point that defines the shape (rect corners for boxes)
    pub fn control_points(&self) -> Vec<PagePoint> {
        match self {
            AnnotationGeometry::Ink { points, .. } => points.clone(),
            AnnotationGeometry::Highlight { shape: HighlightShape::Stroke(points), .. } => points.clone(),
            AnnotationGeometry::Highlight { shape: HighlightShape::Rect(rect), .. }
            | AnnotationGeometry::FreeText { rect, .. } => rect.corners().to_vec(),
        }
    }

    /// Bounding box in page space
    pub fn bounding_rect(&self) -> Option<PageRect> {
        match self {
            AnnotationGeometry::Highlight { shape: HighlightShape::Rect(rect), .. }
            | AnnotationGeometry::FreeText { rect, .. } => Some(*rect),
            _ => PageRect::bounding(&self.control_points()),
        }
    }

    /// Reject payloads that cannot be drawn
    pub fn validate(&self) -> Result<(), GeometryError> {
        let points = self.control_points();
        if points.is_empty() {
            return Err(GeometryError::EmptyStroke);
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        match self {
            AnnotationGeometry::Ink { width, .. } if !width.is_finite() || *width < 0.0 => {
                Err(GeometryError::NegativeSize)
            }
            AnnotationGeometry::Highlight { width, opacity, .. } => {
                if !width.is_finite() || *width < 0.0 {
                    Err(GeometryError::NegativeSize)
                } else if !(0.0..=1.0).contains(opacity) {
                    Err(GeometryError::Opacity(*opacity))
                } else {
                    Ok(())
                }
            }
            AnnotationGeometry::FreeText { rect, style, .. }
                if rect.width < 0.0 || rect.height < 0.0 || style.font_size <= 0.0 =>
            {
                Err(GeometryError::NegativeSize)
            }
            _ => Ok(()),
        }
    }

    fn map_points(&mut self, f: impl Fn(PagePoint) -> PagePoint) {
        let map_rect = |rect: &mut PageRect| {
            let [top_left, bottom_right] = rect.corners();
            let a = f(top_left);
            let b = f(bottom_right);
            *rect = PageRect::new(a.x, a.y, b.x - a.x, b.y - a.y);
        };
        match self {
            AnnotationGeometry::Ink { points, .. }
            | AnnotationGeometry::Highlight { shape: HighlightShape::Stroke(points), .. } => {
                for point in points.iter_mut() {
                    *point = f(*point);
                }
            }
            AnnotationGeometry::Highlight { shape: HighlightShape::Rect(rect), .. }
            | AnnotationGeometry::FreeText { rect, .. } => map_rect(rect),
        }
    }
}

/// One user-created annotation tied to a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    id: AnnotationId,

    /// 1-based page number
    page: u32,

    #[serde(rename = "version")]
    space: CoordinateSpace,

    geometry: AnnotationGeometry,

    created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl Annotation {
    /// Create a new normalized annotation with a generated id
    pub fn new(page: u32, geometry: AnnotationGeometry) -> Self {
        Self {
            id: new_annotation_id(),
            page,
            space: CoordinateSpace::Normalized,
            geometry,
            created_at: timestamp_now(),
            updated_at: None,
        }
    }

    /// Rebuild an annotation from stored parts
    pub fn from_parts(
        id: AnnotationId,
        page: u32,
        space: CoordinateSpace,
        geometry: AnnotationGeometry,
        created_at: String,
        updated_at: Option<String>,
    ) -> Self {
        Self { id, page, space, geometry, created_at, updated_at }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn kind(&self) -> AnnotationKind {
        self.geometry.kind()
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    pub fn geometry(&self) -> &AnnotationGeometry {
        &self.geometry
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    pub fn set_updated_at(&mut self, updated_at: impl Into<String>) {
        self.updated_at = Some(updated_at.into());
    }

    /// Copy with new geometry, keeping id, page and timestamps
    pub fn with_geometry(&self, geometry: AnnotationGeometry) -> Self {
        let mut modified = self.clone();
        modified.geometry = geometry;
        modified
    }

    /// Top-left corner of the bounding box, used as the wire `x`/`y`
    pub fn anchor(&self) -> PagePoint {
        self.geometry
            .bounding_rect()
            .map(|rect| PagePoint::new(rect.x, rect.y))
            .unwrap_or(PagePoint::new(0.0, 0.0))
    }

    /// Convert legacy pixel geometry to normalized space
    ///
    /// `base_width`/`base_height` are the unrotated, unscaled page size.
    /// Returns `true` if a conversion happened.
    pub fn migrate_legacy(&mut self, base_width: f32, base_height: f32) -> bool {
        if self.space != CoordinateSpace::LegacyPixels || base_width <= 0.0 || base_height <= 0.0 {
            return false;
        }
        self.geometry
            .map_points(|p| PagePoint::new(p.x / base_width, p.y / base_height));
        self.space = CoordinateSpace::Normalized;
        true
    }

    /// Whether this annotation can be drawn with the given metrics
    pub fn is_renderable(&self, metrics: Option<&PageMetrics>) -> bool {
        self.space == CoordinateSpace::Normalized
            && metrics.is_some_and(|m| m.page == self.page)
    }

    /// Bounding box in overlay pixels
    pub fn overlay_bounds(&self, metrics: &PageMetrics) -> Option<Rect> {
        if !self.is_renderable(Some(metrics)) {
            return None;
        }
        let points: Vec<Point> = self
            .geometry
            .control_points()
            .into_iter()
            .map(|p| metrics.to_overlay(p))
            .collect();
        Rect::bounding(&points)
    }

    /// Hit test against an overlay-space point
    ///
    /// Strokes hit within half their rendered width plus `tolerance`; boxes
    /// hit inside their bounds grown by `tolerance`.
    pub fn hit_test(&self, point: &Point, metrics: &PageMetrics, tolerance: f32) -> bool {
        if !self.is_renderable(Some(metrics)) {
            return false;
        }
        let to_overlay = |points: &[PagePoint]| -> Vec<Point> {
            points.iter().map(|p| metrics.to_overlay(*p)).collect()
        };
        match &self.geometry {
            AnnotationGeometry::Ink { points, width, .. }
            | AnnotationGeometry::Highlight { shape: HighlightShape::Stroke(points), width, .. } => {
                let reach = width * metrics.scale / 2.0 + tolerance;
                near_polyline(point, &to_overlay(points), reach)
            }
            AnnotationGeometry::Highlight { shape: HighlightShape::Rect(_), .. }
            | AnnotationGeometry::FreeText { .. } => self
                .overlay_bounds(metrics)
                .is_some_and(|bounds| bounds.contains(point, tolerance)),
        }
    }
}

/// Group a flat list by page, preserving order within each page
pub fn group_by_page(annotations: impl IntoIterator<Item = Annotation>) -> PageAnnotations {
    let mut pages = PageAnnotations::new();
    for annotation in annotations {
        pages.entry(annotation.page()).or_default().push(annotation);
    }
    pages
}
