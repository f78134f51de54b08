use image::DynamicImage;
use image::imageops::FilterType;
use ndarray::Array4;

use super::model::InferenceError;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;

/// Turns a decoded image into a `[1, 224, 224, 3]` NHWC tensor in `[0, 1]`.
///
/// Grayscale input is replicated across three channels and an alpha channel
/// is dropped, so luma+alpha becomes three copies of the luma. Any other
/// channel layout is rejected.
pub fn preprocess(image: &DynamicImage) -> Result<Array4<f32>, InferenceError> {
    let resized = image.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);
    let pixels: Vec<f32> = match resized.color().channel_count() {
        1 => resized
            .to_luma32f()
            .into_raw()
            .into_iter()
            .flat_map(|v| [v, v, v])
            .collect(),
        2 => resized
            .to_luma_alpha32f()
            .into_raw()
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0]])
            .collect(),
        3 => resized.to_rgb32f().into_raw(),
        4 => resized
            .to_rgba32f()
            .into_raw()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        n => return Err(InferenceError::UnsupportedChannels(n)),
    };

    let side = INPUT_SIZE as usize;
    let pixels = pixels.into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
    Array4::from_shape_vec((1, side, side, 3), pixels)
        .map_err(|e| InferenceError::Backend(format!("input shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn rgb_is_resized_and_normalized() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 30, Rgb([255, 0, 51])));
        let tensor = preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!((tensor[[0, 100, 100, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 100, 100, 1]].abs() < 1e-6);
        assert!((tensor[[0, 100, 100, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_is_replicated_into_three_channels() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([102])));
        let tensor = preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        let expected = 102.0 / 255.0;
        for c in 0..3 {
            assert!((tensor[[0, 5, 7, c]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([0, 255, 0, 10])));
        let tensor = preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor[[0, 0, 0, 0]].abs() < 0.02);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 0.02);
        assert!(tensor[[0, 0, 0, 2]].abs() < 0.02);
    }

    #[test]
    fn luma_alpha_keeps_only_the_luma() {
        let buffer: ImageBuffer<LumaA<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 8, LumaA([51, 0]));
        let tensor = preprocess(&DynamicImage::ImageLumaA8(buffer)).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        for c in 0..3 {
            assert!((tensor[[0, 3, 200, c]] - 0.2).abs() < 0.02);
        }
    }
}
