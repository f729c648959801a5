use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat, Luma};
use std::path::Path;

/// Share of darkest and brightest pixels clipped before stretching contrast.
const CLIP_PERCENT: f64 = 1.0;

/// Normalize the image at `input` for OCR and write it as PNG to `output`.
///
/// The image is scaled to `target_width` keeping its aspect ratio, reduced to
/// a single luminance channel, and contrast-stretched. Returns the written
/// dimensions. Fails before resizing when the output would exceed
/// `max_output_pixels`.
pub fn normalize(
    input: &Path,
    output: &Path,
    target_width: u32,
    max_output_pixels: u64,
) -> Result<(u32, u32)> {
    let data = std::fs::read(input)
        .with_context(|| format!("failed to read upload {}", input.display()))?;
    let image = image::load_from_memory(&data).context("failed to decode uploaded image")?;

    let height = scaled_height(image.width(), image.height(), target_width)?;
    let pixels = target_width as u64 * height as u64;
    if pixels > max_output_pixels {
        anyhow::bail!(
            "scaling {}x{} to width {target_width} needs {pixels} pixels, limit is {max_output_pixels}",
            image.width(),
            image.height()
        );
    }

    let mut gray = image
        .resize_exact(target_width, height, FilterType::Lanczos3)
        .to_luma8();
    stretch_contrast(&mut gray);

    gray.save_with_format(output, ImageFormat::Png)
        .with_context(|| format!("failed to write processed image {}", output.display()))?;

    Ok(gray.dimensions())
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> Result<u32> {
    let scaled = (height as f64 * target_width as f64 / width.max(1) as f64).round();
    if scaled > u32::MAX as f64 {
        anyhow::bail!("scaled height {scaled} does not fit an image");
    }
    Ok((scaled as u32).max(1))
}

/// Map the 1st..99th percentile intensity range onto the full 0..255 range.
fn stretch_contrast(image: &mut GrayImage) {
    let mut histogram = [0u64; 256];
    for Luma([value]) in image.pixels() {
        histogram[*value as usize] += 1;
    }

    let pixels: u64 = histogram.iter().sum();
    let clip = (pixels as f64 * CLIP_PERCENT / 100.0) as u64;
    let low = percentile_from_start(&histogram, clip);
    let high = percentile_from_end(&histogram, clip);
    if high <= low {
        return;
    }

    let range = (high - low) as f64;
    for Luma([value]) in image.pixels_mut() {
        let clamped = (*value).clamp(low, high);
        *value = ((clamped - low) as f64 * 255.0 / range).round() as u8;
    }
}

fn percentile_from_start(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            return value as u8;
        }
    }
    255
}

fn percentile_from_end(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            return value as u8;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};

    const PIXEL_LIMIT: u64 = 40_000_000;

    fn gradient(width: u32, height: u32, from: u8, to: u8) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, _| {
            let span = (to - from) as u32;
            let v = from + (x * span / (width - 1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_normalize_scales_to_target_width() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload");
        let output = dir.path().join("processed.png");
        gradient(200, 100, 0, 255)
            .save_with_format(&input, ImageFormat::Jpeg)
            .unwrap();

        let (w, h) = normalize(&input, &output, 1024, PIXEL_LIMIT).unwrap();
        assert_eq!((w, h), (1024, 512));

        let written = image::open(&output).unwrap();
        assert_eq!(written.width(), 1024);
        assert_eq!(written.height(), 512);
        assert!(matches!(written, image::DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_normalize_downscales() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload");
        let output = dir.path().join("processed.png");
        gradient(2048, 300, 10, 200)
            .save_with_format(&input, ImageFormat::Png)
            .unwrap();

        assert_eq!(normalize(&input, &output, 1024, PIXEL_LIMIT).unwrap(), (1024, 150));
    }

    #[test]
    fn test_normalize_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload");
        let output = dir.path().join("processed.png");
        std::fs::write(&input, b"definitely not an image").unwrap();

        let err = normalize(&input, &output, 1024, PIXEL_LIMIT).unwrap_err();
        assert!(err.to_string().contains("decode"));
        assert!(!output.exists());
    }

    #[test]
    fn test_normalize_refuses_oversized_upscale() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload");
        let output = dir.path().join("processed.png");
        let sliver: GrayImage = ImageBuffer::from_pixel(1, 40_000, Luma([200]));
        sliver.save_with_format(&input, ImageFormat::Png).unwrap();

        let err = normalize(&input, &output, 1024, PIXEL_LIMIT).unwrap_err();
        assert!(err.to_string().contains("limit"));
        assert!(!output.exists());
    }

    #[test]
    fn test_normalize_accepts_output_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("upload");
        let output = dir.path().join("processed.png");
        gradient(200, 100, 0, 255)
            .save_with_format(&input, ImageFormat::Png)
            .unwrap();

        assert_eq!(normalize(&input, &output, 1024, 1024 * 512).unwrap(), (1024, 512));
        assert!(normalize(&input, &output, 1024, 1024 * 512 - 1).is_err());
    }

    #[test]
    fn test_stretch_contrast_expands_range() {
        let mut img: GrayImage = ImageBuffer::from_fn(100, 1, |x, _| Luma([100 + (x / 2) as u8]));
        stretch_contrast(&mut img);

        let min = img.pixels().map(|p| p.0[0]).min().unwrap();
        let max = img.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_stretch_contrast_flat_image_unchanged() {
        let mut img: GrayImage = ImageBuffer::from_pixel(10, 10, Luma([128]));
        stretch_contrast(&mut img);
        assert!(img.pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn test_scaled_height_never_zero() {
        assert_eq!(scaled_height(10_000, 1, 1024).unwrap(), 1);
        assert!(scaled_height(1, u32::MAX, 1024).is_err());
    }
}
