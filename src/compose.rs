use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::template::PlaceholderRect;

/// Draw placement for a cover-fitted image: `(dx, dy)` may sit outside the
/// target rect on the overflow axis, `(dw, dh)` are the scaled dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub dx: i64,
    pub dy: i64,
    pub dw: u32,
    pub dh: u32,
}

/// Scale-and-center math for `background-size: cover`: fill the rect fully,
/// preserve the source aspect ratio, crop the overflow axis symmetrically.
pub fn cover_fit(iw: u32, ih: u32, rect: PlaceholderRect) -> DrawParams {
    let src_ratio = iw.max(1) as f64 / ih.max(1) as f64;
    let tgt_ratio = rect.w.max(1) as f64 / rect.h.max(1) as f64;

    if src_ratio < tgt_ratio {
        // Source is relatively taller: match the rect width, crop vertically.
        let dw = rect.w;
        let dh = (rect.w as f64 / src_ratio).round().max(1.0) as u32;
        let dy = rect.y as i64 - ((dh as f64 - rect.h as f64) / 2.0).round() as i64;
        DrawParams {
            dx: rect.x as i64,
            dy,
            dw,
            dh,
        }
    } else {
        let dh = rect.h;
        let dw = (rect.h as f64 * src_ratio).round().max(1.0) as u32;
        let dx = rect.x as i64 - ((dw as f64 - rect.w as f64) / 2.0).round() as i64;
        DrawParams {
            dx,
            dy: rect.y as i64,
            dw,
            dh,
        }
    }
}

/// Resize `photo` to its cover-fit size and copy only the pixels that land
/// inside `rect`, so the placeholder is covered exactly and nothing bleeds
/// outside it.
pub fn paste_cover(canvas: &mut RgbaImage, photo: &DynamicImage, rect: PlaceholderRect) {
    let params = cover_fit(photo.width(), photo.height(), rect);
    let resized = imageops::resize(photo, params.dw, params.dh, FilterType::Lanczos3);
    let (canvas_w, canvas_h) = canvas.dimensions();

    for y in rect.y..(rect.y + rect.h).min(canvas_h) {
        for x in rect.x..(rect.x + rect.w).min(canvas_w) {
            let sx = x as i64 - params.dx;
            let sy = y as i64 - params.dy;
            if sx < 0 || sy < 0 || sx >= resized.width() as i64 || sy >= resized.height() as i64 {
                continue;
            }
            canvas.put_pixel(x, y, *resized.get_pixel(sx as u32, sy as u32));
        }
    }
}

/// Alpha-composite the overlay mask over the canvas. The mask is transparent
/// exactly where the placeholder was, so the template artwork lands back on
/// top of the inserted photo.
pub fn apply_overlay(canvas: &mut RgbaImage, overlay: &RgbaImage) {
    imageops::overlay(canvas, overlay, 0, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rect(x: u32, y: u32, w: u32, h: u32) -> PlaceholderRect {
        PlaceholderRect { x, y, w, h }
    }

    #[test]
    fn taller_source_matches_width_and_centers_vertically() {
        // 100x200 source into a 100x100 rect: height overflows by 100.
        let params = cover_fit(100, 200, rect(10, 20, 100, 100));
        assert_eq!(
            params,
            DrawParams {
                dx: 10,
                dy: 20 - 50,
                dw: 100,
                dh: 200,
            }
        );
    }

    #[test]
    fn wider_source_matches_height_and_centers_horizontally() {
        let params = cover_fit(400, 100, rect(0, 0, 100, 100));
        assert_eq!(
            params,
            DrawParams {
                dx: -150,
                dy: 0,
                dw: 400,
                dh: 100,
            }
        );
    }

    #[test]
    fn scaled_dims_cover_the_rect_with_one_exact_axis() {
        let targets = [rect(0, 0, 196, 196), rect(5, 7, 300, 120), rect(0, 0, 50, 400)];
        let sources = [(640, 480), (480, 640), (33, 1000), (1000, 33)];
        for target in targets {
            for (iw, ih) in sources {
                let params = cover_fit(iw, ih, target);
                assert!(params.dw >= target.w && params.dh >= target.h);
                assert!(params.dw == target.w || params.dh == target.h);
            }
        }
    }

    #[test]
    fn equal_ratio_source_matches_both_axes() {
        let params = cover_fit(50, 50, rect(0, 0, 100, 100));
        assert_eq!(params.dw, 100);
        assert_eq!(params.dh, 100);
    }

    #[test]
    fn paste_only_touches_the_rect() {
        let mut canvas = RgbaImage::from_pixel(40, 40, Rgba([9, 9, 9, 255]));
        let photo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            16,
            Rgba([200, 10, 10, 255]),
        ));
        paste_cover(&mut canvas, &photo, rect(10, 10, 20, 20));
        assert_eq!(canvas.get_pixel(9, 9), &Rgba([9, 9, 9, 255]));
        assert_eq!(canvas.get_pixel(30, 30), &Rgba([9, 9, 9, 255]));
        assert_eq!(canvas.get_pixel(15, 15), &Rgba([200, 10, 10, 255]));
        assert_eq!(canvas.get_pixel(29, 29), &Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn overlay_restores_opaque_pixels_and_keeps_transparent_ones() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let mut overlay = RgbaImage::new(4, 4);
        overlay.put_pixel(1, 1, Rgba([250, 240, 230, 255]));
        apply_overlay(&mut canvas, &overlay);
        assert_eq!(canvas.get_pixel(1, 1), &Rgba([250, 240, 230, 255]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }
}
