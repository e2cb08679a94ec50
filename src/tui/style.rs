//! Color constants and auto-scaling helpers for the TUI.

use ratatui::style::Color;

/// Aggregate meter reading line color.
pub const AGGREGATE_COLOR: Color = Color::Cyan;
/// Attributed reading marker color.
pub const ATTRIBUTED_COLOR: Color = Color::Yellow;
/// Device row color while ON.
pub const ON_COLOR: Color = Color::Green;
/// Device row color while OFF.
pub const OFF_COLOR: Color = Color::DarkGray;
/// Header bar foreground.
pub const HEADER_FG: Color = Color::White;
/// Header bar background.
pub const HEADER_BG: Color = Color::DarkGray;
/// Footer help text color.
pub const FOOTER_FG: Color = Color::DarkGray;

/// Color for a confidence percentage.
pub fn confidence_color(pct: f64) -> Color {
    if pct >= 80.0 {
        Color::Green
    } else if pct >= 60.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Computes Y-axis bounds from chart data points with 10% padding.
pub fn auto_bounds_y(series: &[&[(f64, f64)]]) -> [f64; 2] {
    let all = series.iter().flat_map(|s| s.iter()).map(|&(_, y)| y);
    let min = all.clone().fold(f64::INFINITY, f64::min);
    let max = all.fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return [0.0, 100.0];
    }
    let range = (max - min).max(10.0);
    let pad = range * 0.1;
    [(min - pad).max(0.0), max + pad]
}
