//! Pre- and post-processing around a salient-object matting model (U2-Net
//! family). The model sees a normalized square RGB tensor and predicts a
//! foreground probability map, which becomes the alpha channel of the cutout.

use anyhow::{anyhow, ensure, Result};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, RgbaImage};

/// ImageNet channel means
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Convert an image into a `[1, 3, side, side]` NCHW tensor, flattened
///
/// Values are scaled by the largest channel value in the resized image and
/// then normalized per channel with `MEAN` and `STD`.
pub fn preprocess(image: &DynamicImage, side: u32) -> Vec<f32> {
    let _span = tracing::debug_span!("preprocess", side).entered();

    let resized = imageops::resize(&image.to_rgb8(), side, side, FilterType::Lanczos3);
    let max = f32::from(resized.as_raw().iter().copied().max().unwrap_or(0).max(1));

    let plane = (side * side) as usize;
    let mut tensor = vec![0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            tensor[c * plane + i] = (f32::from(pixel[c]) / max - MEAN[c]) / STD[c];
        }
    }
    tensor
}

/// Min-max normalize a prediction in place. A flat prediction carries no
/// foreground information and becomes all zeros.
pub fn normalize(prediction: &mut [f32]) {
    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        });
    let range = max - min;

    if !range.is_finite() || range <= f32::EPSILON {
        prediction.fill(0.0);
        return;
    }
    for v in prediction.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Turn a `width x height` prediction into an 8-bit mask the size of the
/// original image
pub fn alpha_mask(
    prediction: &[f32],
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<GrayImage> {
    let _span = tracing::debug_span!("postprocess").entered();

    ensure!(
        prediction.len() == (width as usize) * (height as usize),
        "prediction has {} values, expected {width}x{height}",
        prediction.len()
    );

    let mut values = prediction.to_vec();
    normalize(&mut values);

    // Truncating cast, values are already in [0, 1]
    let raw = values.iter().map(|v| (v * 255.0) as u8).collect();
    let mask = GrayImage::from_raw(width, height, raw)
        .ok_or_else(|| anyhow!("prediction does not fit a {width}x{height} mask"))?;

    if (width, height) == (target_width, target_height) {
        return Ok(mask);
    }
    Ok(imageops::resize(
        &mask,
        target_width,
        target_height,
        FilterType::Lanczos3,
    ))
}

/// Composite `image` over a transparent canvas through `mask`. Every channel,
/// alpha included, is scaled by `mask / 255`.
pub fn cutout(image: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    debug_assert_eq!(rgba.dimensions(), mask.dimensions());

    for (pixel, weight) in rgba.pixels_mut().zip(mask.pixels()) {
        let weight = u32::from(weight[0]);
        for channel in pixel.0.iter_mut() {
            *channel = ((u32::from(*channel) * weight + 127) / 255) as u8;
        }
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn preprocess_layout_and_normalization() {
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([255, 255, 255])));
        let tensor = preprocess(&white, 5);

        assert_eq!(tensor.len(), 3 * 5 * 5);
        for c in 0..3 {
            let expected = (1.0 - MEAN[c]) / STD[c];
            let plane = &tensor[c * 25..(c + 1) * 25];
            assert!(plane.iter().all(|v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn preprocess_black_image_does_not_divide_by_zero() {
        let black = DynamicImage::new_rgb8(3, 3);
        let tensor = preprocess(&black, 3);
        assert!(tensor.iter().all(|v| v.is_finite()));
        assert!((tensor[0] + MEAN[0] / STD[0]).abs() < 1e-4);
    }

    #[test]
    fn normalize_stretches_to_unit_range() {
        let mut values = vec![2.0, 4.0, 3.0];
        normalize(&mut values);
        assert_eq!(values, vec![0.0, 1.0, 0.5]);

        let mut flat = vec![0.7; 4];
        normalize(&mut flat);
        assert_eq!(flat, vec![0.0; 4]);
    }

    #[test]
    fn mask_is_resized_to_target() {
        let prediction: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mask = alpha_mask(&prediction, 4, 4, 10, 6).unwrap();
        assert_eq!(mask.dimensions(), (10, 6));

        let same = alpha_mask(&prediction, 4, 4, 4, 4).unwrap();
        assert_eq!(same.get_pixel(0, 0), &Luma([0]));
        assert_eq!(same.get_pixel(3, 3), &Luma([255]));
    }

    #[test]
    fn mask_rejects_wrong_length() {
        assert!(alpha_mask(&[0.0; 5], 2, 2, 2, 2).is_err());
    }

    #[test]
    fn cutout_scales_every_channel() {
        let image = test::test_image(2, 1);
        let mask = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let out = cutout(&image, &mask);

        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
        let original = image.to_rgba8();
        assert_eq!(out.get_pixel(1, 0), original.get_pixel(1, 0));
    }
}
