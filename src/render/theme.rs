//! Display preferences

use serde::{Deserialize, Serialize};

/// Base font size in pixels at step 0
pub const BASE_FONT_SIZE: f32 = 16.0;
/// Pixels added per font size step
pub const FONT_SIZE_STEP_PX: f32 = 2.0;
pub const MIN_FONT_SIZE_STEP: i32 = -3;
pub const MAX_FONT_SIZE_STEP: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Sepia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeColors {
    pub background: &'static str,
    pub foreground: &'static str,
    pub highlight: &'static str,
}

impl Theme {
    pub fn colors(&self) -> ThemeColors {
        match self {
            Theme::Light => ThemeColors {
                background: "#ffffff",
                foreground: "#1a1a1a",
                highlight: "#fff176",
            },
            Theme::Dark => ThemeColors {
                background: "#121212",
                foreground: "#e0e0e0",
                highlight: "#8d6e00",
            },
            Theme::Sepia => ThemeColors {
                background: "#f4ecd8",
                foreground: "#5b4636",
                highlight: "#e6c65c",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// One viewport-sized page at a time
    #[default]
    Paginated,
    /// A single scrolling column
    Continuous,
}

/// Reader-local display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferences {
    pub theme: Theme,
    pub font_size_step: i32,
    pub font_family: String,
    pub layout_mode: LayoutMode,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size_step: 0,
            font_family: "serif".to_string(),
            layout_mode: LayoutMode::Paginated,
        }
    }
}

impl DisplayPreferences {
    /// Font size in pixels for the current step
    pub fn font_size_px(&self) -> f32 {
        let step = self.font_size_step.clamp(MIN_FONT_SIZE_STEP, MAX_FONT_SIZE_STEP);
        BASE_FONT_SIZE + step as f32 * FONT_SIZE_STEP_PX
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font_family: self.font_family.clone(),
            font_size: self.font_size_px(),
        }
    }
}

/// Font settings handed to the surface for measuring
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        DisplayPreferences::default().text_style()
    }
}
