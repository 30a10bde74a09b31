//! Engine configuration
//!
//! Layout spacing, history depth, hit tolerance and the default tool styles.
//! Every field has a default so partial config files deserialize.

use crate::annotation::{Color, TextStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stroke settings for the ink tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkSettings {
    pub color: Color,
    /// Stroke width in unscaled page pixels
    pub width: f32,
}

impl Default for InkSettings {
    fn default() -> Self {
        Self { color: Color::RED, width: 2.0 }
    }
}

/// Marker settings for the highlight tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightSettings {
    pub color: Color,
    pub width: f32,
    pub opacity: f32,
}

impl Default for HighlightSettings {
    fn default() -> Self {
        Self { color: Color::YELLOW, width: 16.0, opacity: 0.35 }
    }
}

/// Configuration for one engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inset of the overlay content from the scroll container edge, in pixels
    pub padding: f32,

    /// Minimum vertical gap between consecutive pages, in pixels
    pub page_gap: f32,

    /// Trailing delay before a full layout pass after a scale change
    pub layout_debounce_ms: u64,

    /// Maximum undo entries kept; the oldest is dropped beyond this
    pub history_limit: usize,

    /// Extra reach for hit testing, in overlay pixels
    pub hit_tolerance: f32,

    pub ink: InkSettings,
    pub highlight: HighlightSettings,
    pub text: TextStyle,

    /// Default size of a new free-text box, as a fraction of the page
    pub text_box_size: (f32, f32),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            padding: 16.0,
            page_gap: 12.0,
            layout_debounce_ms: 90,
            history_limit: 100,
            hit_tolerance: 4.0,
            ink: InkSettings::default(),
            highlight: HighlightSettings::default(),
            text: TextStyle::default(),
            text_box_size: (0.3, 0.05),
        }
    }
}

impl EngineConfig {
    pub fn layout_debounce(&self) -> Duration {
        Duration::from_millis(self.layout_debounce_ms)
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_padding(mut self, padding: f32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_page_gap(mut self, gap: f32) -> Self {
        self.page_gap = gap;
        self
    }
}
