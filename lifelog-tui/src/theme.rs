//! Kanagawa Dragon theme module.
//!
//! Low-contrast, warm, dark palette. Lanes cycle through a brighter accent
//! set so neighbouring rows stay distinguishable.

use ratatui::style::Color;

/// Kanagawa Dragon color palette
pub mod colors {
    use super::Color;

    // === Background Colors ===
    /// Dragon Black - Primary background
    pub const BG_DARK: Color = Color::Rgb(0x18, 0x16, 0x16);
    /// Slightly lighter background for headers and overlays
    pub const BG_MEDIUM: Color = Color::Rgb(0x1D, 0x1C, 0x19);
    /// Background of the selected lane
    pub const BG_HIGHLIGHT: Color = Color::Rgb(0x28, 0x27, 0x27);
    /// Background behind failed chunks
    pub const BG_ERROR: Color = Color::Rgb(0x2A, 0x18, 0x18);

    // === Foreground Colors ===
    /// Old White - Primary text color
    pub const FG_PRIMARY: Color = Color::Rgb(0xC5, 0xC9, 0xC5);
    pub const FG_DIM: Color = Color::Rgb(0x72, 0x71, 0x69);
    pub const FG_HINT: Color = Color::Rgb(0x54, 0x54, 0x54);

    // === Accent Colors ===
    /// Dragon Red - errors and failed chunks
    pub const RED: Color = Color::Rgb(0xC4, 0x74, 0x6E);
    pub const GREEN: Color = Color::Rgb(0x8A, 0x9A, 0x7B);
    /// Carp Yellow - warnings and the "now" marker
    pub const YELLOW: Color = Color::Rgb(0xC4, 0xB2, 0x8A);
    pub const BLUE: Color = Color::Rgb(0x8B, 0xA4, 0xB0);
    pub const PURPLE: Color = Color::Rgb(0x95, 0x7F, 0xB8);

    // === UI Element Colors ===
    /// Wall Gray - borders and separators
    pub const BORDER: Color = Color::Rgb(0x72, 0x71, 0x69);
    pub const BORDER_DIM: Color = Color::Rgb(0x3A, 0x3A, 0x3A);
    pub const BORDER_ACCENT: Color = Color::Rgb(0x8B, 0xA4, 0xB0);

    /// Vertical "now" line
    pub const NOW_MARKER: Color = YELLOW;
}

/// Accent colors for lanes, in lane order
pub const LANE_COLORS: &[Color] = &[
    Color::Rgb(0x7A, 0xA2, 0xF7), // Bright blue
    Color::Rgb(0x9E, 0xCE, 0x6A), // Bright green
    Color::Rgb(0xE0, 0xAF, 0x68), // Golden yellow
    Color::Rgb(0xBB, 0x9A, 0xF7), // Bright purple
    Color::Rgb(0xFF, 0x9E, 0x64), // Bright orange
    Color::Rgb(0xF7, 0x76, 0x8E), // Pink
    Color::Rgb(0x73, 0xDA, 0xCA), // Teal
    Color::Rgb(0xC0, 0xCA, 0xF5), // Lavender
    Color::Rgb(0xA9, 0xDC, 0x76), // Lime
    Color::Rgb(0x89, 0xDD, 0xFF), // Sky blue
];

/// Lane color by index (cycles)
pub fn get_lane_color(index: usize) -> Color {
    LANE_COLORS[index % LANE_COLORS.len()]
}

/// Semantic styling helpers
pub mod styles {
    use super::colors;
    use ratatui::style::{Modifier, Style};

    pub fn text() -> Style {
        Style::default().fg(colors::FG_PRIMARY)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(colors::FG_DIM)
    }

    pub fn text_hint() -> Style {
        Style::default().fg(colors::FG_HINT)
    }

    pub fn warning() -> Style {
        Style::default().fg(colors::YELLOW)
    }

    /// Failed-chunk placeholder inside a lane
    pub fn error_record() -> Style {
        Style::default()
            .fg(colors::RED)
            .bg(colors::BG_ERROR)
            .add_modifier(Modifier::BOLD)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(colors::BORDER_ACCENT)
    }

    pub fn border() -> Style {
        Style::default().fg(colors::BORDER)
    }

    pub fn border_dim() -> Style {
        Style::default().fg(colors::BORDER_DIM)
    }

    /// Style for block titles
    pub fn title() -> Style {
        Style::default()
            .fg(colors::FG_PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    /// Style for accent titles (headers, active search)
    pub fn title_accent() -> Style {
        Style::default()
            .fg(colors::BLUE)
            .add_modifier(Modifier::BOLD)
    }

    /// Search box while typing
    pub fn input_focused() -> Style {
        Style::default()
            .fg(colors::FG_PRIMARY)
            .bg(colors::BG_HIGHLIGHT)
    }
}
