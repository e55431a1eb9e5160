//! Density-map visualization.
//!
//! Maps density values onto the jet color ramp, upsamples the colored grid
//! back to the source resolution, and blends it over the original image.
//! Scaling is per-image: each map is min-max normalized against its own
//! dynamic range, so sparse scenes render with low-intensity coloring and
//! dense scenes use the full ramp.

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};

use csrnet_utils::config::HeatmapSettings;
use csrnet_utils::encode_rgb_png;
use csrnet_utils::telemetry::timing_guard;

use crate::density::DensityMap;

/// Rendering parameters for the heatmap overlay.
#[derive(Debug, Clone, Copy)]
pub struct HeatmapConfig {
    /// Weight of the heatmap when blended over the original (0.0-1.0).
    pub blend_weight: f32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self { blend_weight: 0.6 }
    }
}

impl From<HeatmapSettings> for HeatmapConfig {
    fn from(settings: HeatmapSettings) -> Self {
        Self {
            blend_weight: settings.blend_weight.clamp(0.0, 1.0),
        }
    }
}

/// Map a normalized density value in `[0, 1]` onto the jet ramp.
///
/// Low values map to cool blues, high values to warm reds, matching the
/// classic `jet` colormap's piecewise-linear definition.
pub fn jet_color(t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| ((1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0) * 255.0) as u8;
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Render the density map as a color overlay at the original image's
/// resolution.
///
/// The original image is only read, never mutated; the overlay is a new
/// buffer with exactly the original's dimensions.
pub fn render(
    map: &DensityMap,
    original: &DynamicImage,
    config: &HeatmapConfig,
) -> Result<RgbImage> {
    let _guard = timing_guard("csrnet_core::render_heatmap", log::Level::Trace);
    let (orig_w, orig_h) = original.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "cannot render a heatmap over an empty image"
    );

    let (min, max) = map.value_range();
    let span = max - min;

    let mut grid = RgbImage::new(map.width() as u32, map.height() as u32);
    for (x, y, pixel) in grid.enumerate_pixels_mut() {
        let value = map.get(x as usize, y as usize);
        let t = if span > f32::EPSILON {
            (value - min) / span
        } else {
            0.0
        };
        *pixel = image::Rgb(jet_color(t));
    }

    // Invert the model's downsampling so the overlay aligns spatially with
    // the crowd regions. Triangle keeps the upsample deterministic.
    let upsampled = DynamicImage::ImageRgb8(grid)
        .resize_exact(orig_w, orig_h, FilterType::Triangle)
        .to_rgb8();

    let alpha = config.blend_weight.clamp(0.0, 1.0);
    let base = original.to_rgb8();
    let mut blended = RgbImage::new(orig_w, orig_h);
    for (x, y, pixel) in blended.enumerate_pixels_mut() {
        let bg = base.get_pixel(x, y);
        let fg = upsampled.get_pixel(x, y);
        let mix = |b: u8, f: u8| ((1.0 - alpha) * b as f32 + alpha * f as f32).round() as u8;
        *pixel = image::Rgb([mix(bg[0], fg[0]), mix(bg[1], fg[1]), mix(bg[2], fg[2])]);
    }

    Ok(blended)
}

/// Render the heatmap and encode it as PNG bytes ready for transport.
pub fn render_png(
    map: &DensityMap,
    original: &DynamicImage,
    config: &HeatmapConfig,
) -> Result<Vec<u8>> {
    let rendered = render(map, original, config)?;
    encode_rgb_png(&rendered).context("failed to encode heatmap PNG")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> DensityMap {
        let cells: Vec<f32> = (0..48).map(|i| (i % 7) as f32 * 0.1).collect();
        DensityMap::from_raw(8, 6, cells).expect("valid map")
    }

    fn sample_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([40, 80, 120]),
        ))
    }

    #[test]
    fn output_dimensions_match_the_original() {
        let map = sample_map();
        for (w, h) in [(64, 48), (17, 31), (320, 240)] {
            let rendered =
                render(&map, &sample_image(w, h), &HeatmapConfig::default()).expect("render");
            assert_eq!(rendered.dimensions(), (w, h));
        }
    }

    #[test]
    fn jet_ramp_moves_from_cool_to_warm() {
        let cold = jet_color(0.0);
        let hot = jet_color(1.0);
        assert!(cold[2] > cold[0], "low density should be blue-dominant");
        assert!(hot[0] > hot[2], "high density should be red-dominant");

        let mid = jet_color(0.5);
        assert!(mid[1] > 200, "mid density passes through green");
    }

    #[test]
    fn flat_map_renders_uniform_cool_overlay() {
        let map = DensityMap::from_raw(4, 4, vec![0.2; 16]).expect("flat map");
        let rendered =
            render(&map, &sample_image(16, 16), &HeatmapConfig::default()).expect("render");

        let first = rendered.get_pixel(0, 0);
        assert!(rendered.pixels().all(|p| p == first));
    }

    #[test]
    fn zero_blend_weight_returns_the_original_pixels() {
        let map = sample_map();
        let original = sample_image(32, 24);
        let rendered = render(&map, &original, &HeatmapConfig { blend_weight: 0.0 })
            .expect("render");
        let base = original.to_rgb8();
        assert!(rendered.pixels().zip(base.pixels()).all(|(a, b)| a == b));
    }

    #[test]
    fn render_png_produces_decodable_bytes() {
        let map = sample_map();
        let bytes =
            render_png(&map, &sample_image(24, 18), &HeatmapConfig::default()).expect("encode");
        let decoded = image::load_from_memory(&bytes).expect("decode");
        assert_eq!(decoded.dimensions(), (24, 18));
    }
}
