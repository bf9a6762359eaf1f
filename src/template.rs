use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::{debug, warn};

use crate::settings::TemplateSettings;

/// Pixel rectangle of the photo window detected in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A decoded template plus everything derived from it: the overlay mask and
/// the placeholder rect. Detection runs once, in the constructor; the result
/// is shared read-only across every article rendered against this template.
pub struct Template {
    base: RgbaImage,
    overlay: RgbaImage,
    rect: PlaceholderRect,
}

impl Template {
    pub fn load(path: &Path, settings: &TemplateSettings) -> Result<Self> {
        let base = image::open(path)
            .with_context(|| format!("failed to read template: {}", path.display()))?
            .to_rgba8();
        if base.width() == 0 || base.height() == 0 {
            return Err(anyhow!("template is empty: {}", path.display()));
        }
        Ok(Self::from_image(base, settings))
    }

    pub fn from_image(base: RgbaImage, settings: &TemplateSettings) -> Self {
        let (overlay, rect) = detect_placeholder(&base, settings);
        debug!(
            "template {}x{}, placeholder at ({},{}) {}x{}",
            base.width(),
            base.height(),
            rect.x,
            rect.y,
            rect.w,
            rect.h
        );
        Self {
            base,
            overlay,
            rect,
        }
    }

    pub fn width(&self) -> u32 {
        self.base.width()
    }

    pub fn height(&self) -> u32 {
        self.base.height()
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    /// Template pixels with the placeholder zeroed out to full transparency.
    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    pub fn rect(&self) -> PlaceholderRect {
        self.rect
    }
}

fn is_near_black(pixel: &Rgba<u8>, threshold: u8) -> bool {
    let [r, g, b, _] = pixel.0;
    r <= threshold && g <= threshold && b <= threshold
}

/// Single pass over the template: classify each pixel, build the overlay mask
/// and track the bounding box of the near-black region.
fn detect_placeholder(
    base: &RgbaImage,
    settings: &TemplateSettings,
) -> (RgbaImage, PlaceholderRect) {
    let (width, height) = base.dimensions();
    // RgbaImage::new starts fully transparent, so near-black pixels need no write.
    let mut overlay = RgbaImage::new(width, height);
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut count = 0usize;

    for (x, y, pixel) in base.enumerate_pixels() {
        if is_near_black(pixel, settings.black_threshold) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            count += 1;
        } else {
            overlay.put_pixel(x, y, *pixel);
        }
    }

    let rect = if count == 0 {
        warn!("no near-black placeholder found in template; using the fallback rectangle");
        fallback_rect(width, height, settings)
    } else {
        let pad = settings.pad_px;
        PlaceholderRect {
            x: min_x + pad,
            y: min_y + pad,
            w: (max_x - min_x + 1).saturating_sub(pad * 2).max(1),
            h: (max_y - min_y + 1).saturating_sub(pad * 2).max(1),
        }
    };

    (overlay, rect)
}

fn fallback_rect(width: u32, height: u32, settings: &TemplateSettings) -> PlaceholderRect {
    let w = (width as f32 * settings.fallback_width).round().max(1.0) as u32;
    let h = (height as f32 * settings.fallback_height).round().max(1.0) as u32;
    let x = ((width as f32 - w as f32) / 2.0).round().max(0.0) as u32;
    let y = (height as f32 * settings.fallback_top).round().max(0.0) as u32;
    PlaceholderRect { x, y, w, h }
}
