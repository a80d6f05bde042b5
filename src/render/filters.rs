/// CPU filter pass: brightness, saturation and vignette
///
/// Mirrors how the viewer draws an edited shot: the CSS `brightness()`
/// and `saturate()` filters are applied first, then a black radial
/// gradient is composited over the frame for the vignette.

use image::{Rgba, RgbaImage};

use crate::state::edit::FilterValues;

/// Rec. 709 luminance weights
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// The vignette reaches full strength at `max(w, h) / VIGNETTE_RADIUS_DIVISOR`
const VIGNETTE_RADIUS_DIVISOR: f32 = 1.2;

/// Apply all adjustments in place
pub fn apply_filters(image: &mut RgbaImage, filters: &FilterValues) {
    let brightness = filters.brightness / 100.0;
    let saturation = filters.saturation / 100.0;
    let alpha_max = filters.vignette_alpha();

    let (w, h) = image.dimensions();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let radius = (w.max(h) as f32 / VIGNETTE_RADIUS_DIVISOR).max(f32::EPSILON);

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let mut color = [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0];

        // 1. Brightness: linear multiplier
        for c in &mut color {
            *c *= brightness;
        }

        // 2. Saturation: mix between grayscale and original color
        let luminance = color[0] * LUMA[0] + color[1] * LUMA[1] + color[2] * LUMA[2];
        for c in &mut color {
            *c = luminance + (*c - luminance) * saturation;
        }

        // 3. Vignette: black overlay whose alpha grows with distance from center
        if alpha_max > 0.0 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let t = ((dx * dx + dy * dy).sqrt() / radius).min(1.0);
            let overlay = alpha_max * t;
            for c in &mut color {
                *c *= 1.0 - overlay;
            }
        }

        *pixel = Rgba([to_channel(color[0]), to_channel(color[1]), to_channel(color[2]), a]);
    }
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(color))
    }

    #[test]
    fn test_neutral_filters_leave_pixels_untouched() {
        let mut image = solid(4, 4, [10, 120, 240, 255]);
        apply_filters(&mut image, &FilterValues::default());
        assert_eq!(image.get_pixel(2, 2), &Rgba([10, 120, 240, 255]));
    }

    #[test]
    fn test_brightness_scales_channels_and_clamps() {
        let mut image = solid(2, 2, [100, 50, 200, 255]);
        apply_filters(&mut image, &FilterValues::new(200.0, 100.0, 0.0));
        assert_eq!(image.get_pixel(0, 0), &Rgba([200, 100, 255, 255]));
    }

    #[test]
    fn test_zero_saturation_is_grayscale() {
        let mut image = solid(2, 2, [200, 40, 90, 128]);
        apply_filters(&mut image, &FilterValues::new(100.0, 0.0, 0.0));

        let Rgba([r, g, b, a]) = *image.get_pixel(1, 1);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(a, 128);
    }

    #[test]
    fn test_vignette_darkens_corners_more_than_center() {
        let mut image = solid(64, 64, [200, 200, 200, 255]);
        apply_filters(&mut image, &FilterValues::new(100.0, 100.0, 80.0));

        let center = image.get_pixel(32, 32).0[0];
        let corner = image.get_pixel(0, 0).0[0];
        assert!(center >= 198, "center should be nearly untouched, got {center}");
        assert!(corner < center, "corner {corner} should be darker than center {center}");
    }
}
