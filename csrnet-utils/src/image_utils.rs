use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Resize an image to the requested resolution using the provided filter.
///
/// # Arguments
///
/// * `image` - The image to resize.
/// * `width` - The target width.
/// * `height` - The target height.
/// * `filter` - The sampling filter to use for resizing.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Convert an RGB image into a normalized CHW array.
///
/// Pixels are scaled to `[0, 1]` and then each channel is standardized with
/// the provided per-channel mean and standard deviation. The memory layout is
/// rearranged from HWC (height, width, channels) to CHW (channels, height,
/// width) as expected by the density model.
///
/// # Arguments
///
/// * `image` - The RGB image to convert.
/// * `mean` - Per-channel means in RGB order.
/// * `std` - Per-channel standard deviations in RGB order.
pub fn rgb_to_normalized_chw(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            array[(channel, yi, xi)] = (value - mean[channel]) / std[channel];
        }
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    #[test]
    fn normalized_chw_standardizes_each_channel() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([255, 0, 128]));
        image.put_pixel(1, 0, image::Rgb([0, 255, 0]));

        let array = rgb_to_normalized_chw(&image, MEAN, STD);
        assert_eq!(array.shape(), &[3, 1, 2]);

        let red = (1.0 - MEAN[0]) / STD[0];
        let green = (1.0 - MEAN[1]) / STD[1];
        assert!((array[(0, 0, 0)] - red).abs() < 1e-6);
        assert!((array[(1, 0, 1)] - green).abs() < 1e-6);
        // Zero-valued pixels land at the negative end of the distribution.
        assert!(array[(2, 0, 1)] < 0.0);
    }

    #[test]
    fn normalized_chw_is_deterministic() {
        let mut image = RgbImage::new(3, 3);
        for (i, pixel) in image.pixels_mut().enumerate() {
            *pixel = image::Rgb([(i * 17) as u8, (i * 31) as u8, (i * 7) as u8]);
        }

        let first = rgb_to_normalized_chw(&image, MEAN, STD);
        let second = rgb_to_normalized_chw(&image, MEAN, STD);
        assert_eq!(first, second);
    }

    #[test]
    fn resize_image_hits_the_requested_dimensions() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([9, 9, 9])));
        let resized = resize_image(&source, 32, 24, FilterType::Triangle);
        assert_eq!(resized.dimensions(), (32, 24));
    }
}
