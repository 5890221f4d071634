use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbaImage};

use super::{Region, VisionPreprocessor};

/// Named preprocessing configuration for one OCR attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreprocessParams {
    /// Integer up-scaling factor (1 = none)
    pub scale: u32,
    /// White border added on every side, in pixels
    pub padding: u32,
    /// Binarise with Otsu's automatic threshold
    pub use_otsu: bool,
    /// Invert colours first (light text on dark background → dark on light)
    pub invert: bool,
    /// Pixels darker than this become white
    pub min_threshold: Option<u8>,
    /// Pixels brighter than this become white
    pub max_threshold: Option<u8>,
    /// Added to the Otsu threshold, clamped to 0–255
    pub otsu_offset: i16,
    /// Fixed threshold; takes precedence over Otsu
    pub fixed_threshold: Option<u8>,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            scale: 2,
            padding: 5,
            use_otsu: true,
            invert: false,
            min_threshold: None,
            max_threshold: None,
            otsu_offset: 0,
            fixed_threshold: None,
        }
    }
}

impl PreprocessParams {
    /// Scaled and inverted, without binarisation. Used for class and numeric fields.
    pub fn plain(padding: u32) -> Self {
        Self {
            padding,
            use_otsu: false,
            invert: true,
            ..Self::default()
        }
    }
}

/// Default preprocessor built on the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImagePreprocessor;

impl VisionPreprocessor for ImagePreprocessor {
    fn preprocess(&self, crop: &RgbaImage, params: &PreprocessParams) -> GrayImage {
        let mut source = crop.clone();
        if params.invert {
            imageops::invert(&mut source);
        }

        let mut gray = imageops::grayscale(&source);

        if params.min_threshold.is_some() || params.max_threshold.is_some() {
            filter_brightness(&mut gray, params.min_threshold, params.max_threshold);
        }

        if params.scale > 1 {
            let (w, h) = gray.dimensions();
            gray = imageops::resize(
                &gray,
                w * params.scale,
                h * params.scale,
                FilterType::CatmullRom,
            );
        }

        if let Some(threshold) = params.fixed_threshold {
            binarize(&mut gray, threshold);
        } else if params.use_otsu {
            let level = otsu_level(&gray);
            let adjusted = (level as i16 + params.otsu_offset).clamp(0, 255) as u8;
            binarize(&mut gray, adjusted);
        }

        pad(&gray, params.padding)
    }
}

/// Crops a region from an image, clamped to the image bounds.
///
/// Returns `None` when the clamped region is empty.
pub fn crop_region(img: &RgbaImage, region: Region) -> Option<RgbaImage> {
    let (w, h) = img.dimensions();
    let (x0, y0, rw, rh) = region.clamp_to(w, h)?;
    Some(imageops::crop_imm(img, x0, y0, rw, rh).to_image())
}

/// Pixels outside `[min, max]` become white (discarded).
fn filter_brightness(img: &mut GrayImage, min: Option<u8>, max: Option<u8>) {
    for pixel in img.pixels_mut() {
        let value = pixel[0];
        let too_dark = min.is_some_and(|m| value < m);
        let too_bright = max.is_some_and(|m| value > m);
        if too_dark || too_bright {
            *pixel = Luma([255]);
        }
    }
}

/// Pixels above the threshold become white, the rest black.
fn binarize(img: &mut GrayImage, threshold: u8) {
    for pixel in img.pixels_mut() {
        let value = if pixel[0] > threshold { 255 } else { 0 };
        *pixel = Luma([value]);
    }
}

/// Otsu's threshold: maximises the between-class variance of the histogram.
pub fn otsu_level(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0;
    let mut best_variance = 0.0;
    let mut level = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);

        if variance > best_variance {
            best_variance = variance;
            level = t as u8;
        }
    }

    level
}

/// Adds a white border of `padding` pixels.
fn pad(img: &GrayImage, padding: u32) -> GrayImage {
    if padding == 0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let mut output: GrayImage =
        ImageBuffer::from_pixel(w + padding * 2, h + padding * 2, Luma([255]));
    imageops::replace(&mut output, img, padding as i64, padding as i64);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        ImageBuffer::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn test_crop_region() {
        let img: RgbaImage =
            ImageBuffer::from_fn(100, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));

        let cropped = crop_region(&img, Region::new(10, 50, 50, 20)).unwrap();

        assert_eq!(cropped.dimensions(), (50, 20));
        // Top-left pixel should be (10, 50) from original
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_region_clamps() {
        let img = solid(100, 100, 0);
        let cropped = crop_region(&img, Region::new(90, 90, 50, 50)).unwrap();

        // Should clamp to 10x10 (remaining pixels)
        assert_eq!(cropped.dimensions(), (10, 10));
        assert!(crop_region(&img, Region::new(100, 100, 5, 5)).is_none());
    }

    #[test]
    fn test_otsu_bimodal() {
        let img: GrayImage =
            ImageBuffer::from_fn(10, 1, |x, _| Luma([if x < 5 { 40 } else { 200 }]));
        let level = otsu_level(&img);
        assert!((40..200).contains(&level), "level {level}");
    }

    #[test]
    fn test_scale_and_padding() {
        let img = solid(10, 4, 128);
        let params = PreprocessParams {
            scale: 2,
            padding: 3,
            use_otsu: false,
            ..PreprocessParams::default()
        };

        let out = ImagePreprocessor.preprocess(&img, &params);
        assert_eq!(out.dimensions(), (26, 14));
        assert_eq!(out.get_pixel(0, 0)[0], 255, "padding should be white");
    }

    #[test]
    fn test_fixed_threshold_binarizes() {
        let mut img = solid(2, 1, 50);
        img.put_pixel(1, 0, Rgba([220, 220, 220, 255]));
        let params = PreprocessParams {
            scale: 1,
            padding: 0,
            fixed_threshold: Some(75),
            ..PreprocessParams::default()
        };

        let out = ImagePreprocessor.preprocess(&img, &params);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_invert_makes_light_text_dark() {
        let img = solid(1, 1, 230);
        let params = PreprocessParams {
            scale: 1,
            padding: 0,
            ..PreprocessParams::plain(0)
        };

        let out = ImagePreprocessor.preprocess(&img, &params);
        assert_eq!(out.get_pixel(0, 0)[0], 25);
    }

    #[test]
    fn test_max_threshold_discards_bright() {
        let mut img = solid(2, 1, 100);
        img.put_pixel(1, 0, Rgba([180, 180, 180, 255]));
        let params = PreprocessParams {
            scale: 1,
            padding: 0,
            use_otsu: false,
            max_threshold: Some(150),
            ..PreprocessParams::default()
        };

        let out = ImagePreprocessor.preprocess(&img, &params);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_otsu_offset_clamped() {
        let img: RgbaImage = ImageBuffer::from_fn(4, 1, |x, _| {
            let v = if x < 2 { 10 } else { 240 };
            Rgba([v, v, v, 255])
        });
        let params = PreprocessParams {
            scale: 1,
            padding: 0,
            otsu_offset: -300,
            ..PreprocessParams::default()
        };

        // Threshold clamps to 0: every pixel brighter than 0 becomes white
        let out = ImagePreprocessor.preprocess(&img, &params);
        assert!(out.pixels().all(|p| p[0] == 255));
    }
}
