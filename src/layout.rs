use crate::fonts::{measure_width_px, FontMetrics};
use crate::settings::{PillSettings, RegionSettings};
use crate::template::PlaceholderRect;

/// A text region in template pixels, derived from fractional settings so the
/// same configuration scales to any template resolution.
#[derive(Debug, Clone, Copy)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl LayoutBox {
    pub fn from_region(region: &RegionSettings, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x: region.left * w,
            y: region.top * h,
            w: (region.right - region.left).max(0.0) * w,
            h: (region.bottom - region.top).max(0.0) * h,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }
}

/// A wrapped, placed block of text. `clipped` marks the single-line fallback
/// that gave up on fitting and may overflow horizontally.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub font_px: u32,
    pub lines: Vec<String>,
    pub first_baseline: f32,
    pub line_advance: f32,
    pub clipped: bool,
}

/// Greedy word-wrap at decreasing font sizes until the wrapped block fits the
/// box height. The first (largest) size that fits wins; sizes step down by 2
/// from `font_start * W` to `font_min * W`. When nothing in range fits, the
/// whole text becomes one clipped line at the minimum size.
pub fn autoshrink(
    text: &str,
    bounds: LayoutBox,
    dy_px: f32,
    region: &RegionSettings,
    template_width: u32,
    font: Option<&FontMetrics>,
) -> Option<TextBlock> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let width = template_width as f32;
    let start_px = (region.font_start * width).round().max(1.0) as u32;
    let min_px = (region.font_min * width).round().max(1.0) as u32;

    let mut font_px = start_px.max(min_px);
    loop {
        let lines = wrap_words(text, font_px as f32, bounds.w, font);
        let total_h = (lines.len() as f32 * font_px as f32 * region.line_height).ceil();
        if total_h <= bounds.h {
            return Some(place_block(lines, font_px, total_h, bounds, dy_px, region, false));
        }
        if font_px <= min_px || font_px - 2 < min_px {
            break;
        }
        font_px -= 2;
    }

    // Nothing in range fits: one unwrapped line at the minimum size, centered,
    // allowed to overflow horizontally.
    let total_h = (min_px as f32 * region.line_height).ceil();
    Some(place_block(
        vec![text.to_string()],
        min_px,
        total_h,
        bounds,
        dy_px,
        region,
        true,
    ))
}

fn place_block(
    lines: Vec<String>,
    font_px: u32,
    total_h: f32,
    bounds: LayoutBox,
    dy_px: f32,
    region: &RegionSettings,
    clipped: bool,
) -> TextBlock {
    let first_baseline =
        bounds.y + dy_px + ((bounds.h - total_h) / 2.0).round() + font_px as f32;
    TextBlock {
        font_px,
        lines,
        first_baseline,
        line_advance: (font_px as f32 * region.line_height).round(),
        clipped,
    }
}

/// Accumulate whitespace-separated words while the measured line stays within
/// `max_w`; commit and carry the overflowing word. Never backtracks; a single
/// over-wide word still owns its line.
fn wrap_words(text: &str, font_px: f32, max_w: f32, font: Option<&FontMetrics>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure_width_px(&candidate, font_px, font) <= max_w {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Geometry for the rounded category badge beneath the placeholder.
#[derive(Debug, Clone)]
pub struct Pill {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub radius: f32,
    pub font_px: u32,
    pub label: String,
}

impl Pill {
    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }
}

/// Place the category pill directly beneath the placeholder rect, shrinking
/// the label font by 2 until it fits half the template width (or the floor
/// size is reached). Empty labels get no pill at all.
pub fn pill_layout(
    label: &str,
    rect: PlaceholderRect,
    template_width: u32,
    template_height: u32,
    pill: &PillSettings,
    font: Option<&FontMetrics>,
) -> Option<Pill> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    let width = template_width as f32;
    let height = template_height as f32;
    let pill_h = pill.height * height;
    let min_w = pill.min_width * width;
    let hpad = pill.hpad * width;
    let max_w = min_w.max(width / 2.0);
    let y = rect.y as f32 + rect.h as f32 + ((pill.top_offset + pill.shift) * height).round();

    let min_px = (pill.font_min * width).round().max(1.0) as u32;
    let mut font_px = ((pill.font_start * width).round().max(1.0) as u32).max(min_px);
    while measure_width_px(label, font_px as f32, font) + 2.0 * hpad > max_w && font_px > min_px {
        font_px = font_px.saturating_sub(2).max(min_px);
    }

    let pill_w = min_w.max(measure_width_px(label, font_px as f32, font) + 2.0 * hpad);
    Some(Pill {
        x: ((width - pill_w) / 2.0).round(),
        y,
        w: pill_w,
        h: pill_h,
        radius: pill.radius * width,
        font_px,
        label: label.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    // All tests run on the no-font estimate path: ASCII alphanumerics are
    // 0.55 units, spaces 0.25, so widths are exact and deterministic.

    fn region(font_start: f32, font_min: f32, line_height: f32) -> RegionSettings {
        RegionSettings {
            left: 0.0,
            top: 0.0,
            right: 1.0,
            bottom: 1.0,
            color: "#000000".to_string(),
            font_start,
            font_min,
            line_height,
            shift: 0.0,
        }
    }

    fn bounds(w: f32, h: f32) -> LayoutBox {
        LayoutBox {
            x: 0.0,
            y: 0.0,
            w,
            h,
        }
    }

    #[test]
    fn short_text_keeps_the_start_size() {
        // start = 0.04 * 1000 = 40px; "hi" measures 44px, fits 200px easily.
        let block = autoshrink("hi", bounds(200.0, 200.0), 0.0, &region(0.04, 0.02, 1.25), 1000, None)
            .unwrap();
        assert_eq!(block.font_px, 40);
        assert_eq!(block.lines, vec!["hi".to_string()]);
        assert!(!block.clipped);
    }

    #[test]
    fn long_title_shrinks_in_steps_of_two() {
        let text = "seven words that will not fit at start size";
        let block = autoshrink(
            text,
            bounds(200.0, 80.0),
            0.0,
            &region(0.04, 0.016, 1.25),
            1000,
            None,
        )
        .unwrap();
        assert!(block.font_px < 40);
        assert!(block.font_px >= 16);
        assert_eq!((40 - block.font_px) % 2, 0);
        assert!(!block.clipped);
        // The accepted block really fits the box height.
        let total = (block.lines.len() as f32 * block.font_px as f32 * 1.25).ceil();
        assert!(total <= 80.0);
        // One step larger would not have fit.
        let larger = wrap_words(text, (block.font_px + 2) as f32, 200.0, None);
        let larger_total = (larger.len() as f32 * (block.font_px + 2) as f32 * 1.25).ceil();
        assert!(larger_total > 80.0);
    }

    #[test]
    fn hopeless_text_falls_back_to_one_clipped_line_at_min() {
        let text = "absolutely nothing about this enormous sentence is ever going to fit";
        let block = autoshrink(
            text,
            bounds(100.0, 20.0),
            0.0,
            &region(0.05, 0.03, 1.25),
            1000,
            None,
        )
        .unwrap();
        assert_eq!(block.font_px, 30);
        assert_eq!(block.lines.len(), 1);
        assert_eq!(block.lines[0], text);
        assert!(block.clipped);
    }

    #[test]
    fn greedy_wrap_never_splits_an_overwide_word() {
        let lines = wrap_words("hippopotomonstrosesquippedaliophobia no", 20.0, 100.0, None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "no");
    }

    #[test]
    fn block_is_vertically_centered_with_the_documented_baseline() {
        // "hi" at 40px: total = ceil(1 * 40 * 1.25) = 50.
        let block = autoshrink(
            "hi",
            LayoutBox {
                x: 0.0,
                y: 100.0,
                w: 400.0,
                h: 90.0,
            },
            6.0,
            &region(0.04, 0.02, 1.25),
            1000,
            None,
        )
        .unwrap();
        // y0 = 100 + 6 + round((90 - 50) / 2) + 40
        assert_eq!(block.first_baseline, 166.0);
        assert_eq!(block.line_advance, 50.0);
    }

    #[test]
    fn empty_text_yields_no_block() {
        assert!(autoshrink("  ", bounds(100.0, 100.0), 0.0, &region(0.04, 0.02, 1.2), 1000, None)
            .is_none());
    }

    #[test]
    fn empty_label_yields_no_pill() {
        let settings = Settings::default();
        let rect = PlaceholderRect {
            x: 60,
            y: 85,
            w: 880,
            h: 230,
        };
        assert!(pill_layout("", rect, 1000, 1000, &settings.pill, None).is_none());
    }

    #[test]
    fn pill_sits_beneath_the_placeholder_and_is_centered() {
        let settings = Settings::default();
        let rect = PlaceholderRect {
            x: 60,
            y: 100,
            w: 880,
            h: 200,
        };
        let pill = pill_layout("News", rect, 1000, 1000, &settings.pill, None).unwrap();
        // y = 100 + 200 + round(0.018 * 1000)
        assert_eq!(pill.y, 318.0);
        assert!((pill.x + pill.w / 2.0 - 500.0).abs() <= 0.5);
        // "News" at 30px is far narrower than min_width, so min_width wins.
        assert!((pill.w - 220.0).abs() < 1e-3);
        assert_eq!(pill.font_px, 30);
    }

    #[test]
    fn wide_label_shrinks_but_never_below_the_floor() {
        let settings = Settings::default();
        let rect = PlaceholderRect {
            x: 0,
            y: 0,
            w: 100,
            h: 100,
        };
        let label = "an extremely long category label that cannot possibly fit";
        let pill = pill_layout(label, rect, 1000, 1000, &settings.pill, None).unwrap();
        assert_eq!(pill.font_px, 18);
        // The final width still covers the measured label plus padding.
        assert!(pill.w >= measure_width_px(label, 18.0, None) + 2.0 * 28.0);
    }
}
