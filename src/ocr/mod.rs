//! OCR plumbing: region cropping, preprocessing, text extraction and the
//! recognition cascade.
//!
//! The preprocessor, text extractor and online service are consumed through
//! traits so the cascade and aggregation logic never depend on a concrete
//! engine. Default implementations live in `preprocess`, `engine` and `online`.

pub mod cascade;
pub mod engine;
pub mod online;
pub mod preprocess;
pub mod setup;

pub use cascade::{NameRequest, Recognition, RecognitionCascade};
pub use engine::TesseractExtractor;
pub use online::OcrSpaceClient;
pub use preprocess::{ImagePreprocessor, PreprocessParams, crop_region};

use anyhow::Result;
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::config::Point;
use crate::error::ServiceError;

/// An integer rectangle in source-image pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Translates a frame-relative region by the frame origin.
    pub fn at(self, origin: Point) -> Self {
        Self {
            x: self.x + origin.x,
            y: self.y + origin.y,
            ..self
        }
    }

    pub fn shifted_y(self, dy: i32) -> Self {
        Self {
            y: self.y + dy,
            ..self
        }
    }

    /// Clamps to an image of the given size. Returns `None` when nothing is left.
    pub fn clamp_to(self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.clamp(0, img_width as i32) as u32;
        let y0 = self.y.clamp(0, img_height as i32) as u32;
        let x1 = (self.x as i64 + self.width as i64).clamp(0, img_width as i64) as u32;
        let y1 = (self.y as i64 + self.height as i64).clamp(0, img_height as i64) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    /// True when the whole region lies inside the image.
    pub fn fits(self, img_width: u32, img_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= img_width as i64
            && self.y as i64 + self.height as i64 <= img_height as i64
    }
}

/// Which recognition flow the cascade runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Local extraction only, with a language-swap retry
    #[default]
    Offline,
    /// Local extraction with the online service as a fallback
    Mixed,
}

/// Script and character set the text extractor should expect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtractMode {
    /// Latin and Cyrillic together
    Mixed,
    Latin,
    Cyrillic,
    /// Digits only
    Digits,
}

impl ExtractMode {
    /// The opposite script of a candidate: Cyrillic text retries as Latin and vice versa.
    pub fn swapped_for(text: &str) -> Self {
        if text.chars().any(is_cyrillic) {
            ExtractMode::Latin
        } else {
            ExtractMode::Cyrillic
        }
    }
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

/// One piece of text found by the extractor.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub text: String,
    /// Normalised to 0.0–1.0
    pub confidence: f32,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Turns a region-of-interest bitmap into a cleaned grayscale bitmap.
pub trait VisionPreprocessor: Send + Sync {
    fn preprocess(&self, crop: &RgbaImage, params: &PreprocessParams) -> GrayImage;
}

/// Turns a cleaned bitmap into zero or more detections.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bitmap: &GrayImage, mode: ExtractMode) -> Result<Vec<Detection>>;
}

/// Best-effort online recognition. `Ok(None)` means the service found no text.
pub trait OnlineRecognizer: Send + Sync {
    fn recognize(&self, bitmap: &GrayImage) -> Result<Option<String>, ServiceError>;
}

/// Joins all detections of a single-line region with spaces.
pub fn join_detections(detections: &[Detection]) -> Option<String> {
    let text = detections
        .iter()
        .map(|d| d.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() { None } else { Some(text) }
}

/// Longest whitespace-separated word; the first one wins on ties.
pub fn longest_word(text: &str) -> Option<&str> {
    text.split_whitespace().fold(None, |best: Option<&str>, word| match best {
        Some(b) if b.chars().count() >= word.chars().count() => Some(b),
        _ => Some(word),
    })
}
