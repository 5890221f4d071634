use anyhow::{Context, Result};
use image::RgbaImage;
use std::sync::Arc;

use super::aggregator::StatExtractor;
use super::grouping::Screenshot;
use super::record::FieldReadings;
use crate::config::{Point, StatLayout};
use crate::ocr::{
    ExtractMode, NameRequest, OcrMode, PreprocessParams, RecognitionCascade, Region, crop_region,
    join_detections,
};
use crate::resolver::{MatchResult, NameResolver};

/// Reads the personal statistics frame with the OCR cascade.
pub struct OcrStatExtractor {
    cascade: RecognitionCascade,
    resolver: Arc<NameResolver>,
    origin: Point,
    layout: StatLayout,
    mode: OcrMode,
}

impl OcrStatExtractor {
    pub fn new(
        cascade: RecognitionCascade,
        resolver: Arc<NameResolver>,
        origin: Point,
        layout: StatLayout,
        mode: OcrMode,
    ) -> Self {
        Self {
            cascade,
            resolver,
            origin,
            layout,
            mode,
        }
    }

    fn read_text(&self, frame: &RgbaImage, region: Region, mode: ExtractMode) -> Option<String> {
        let crop = crop_region(frame, region.at(self.origin))?;
        let bitmap = self.cascade.preprocessor().preprocess(&crop, &PreprocessParams::plain(5));

        match self.cascade.extractor().extract(&bitmap, mode) {
            Ok(detections) => join_detections(&detections),
            Err(e) => {
                tracing::warn!("Field extraction failed: {}", e);
                None
            }
        }
    }

    fn read_number(&self, frame: &RgbaImage, region: Region) -> Option<i64> {
        self.read_text(frame, region, ExtractMode::Digits)
            .and_then(|text| parse_number(&text))
    }
}

impl StatExtractor for OcrStatExtractor {
    type Frame = RgbaImage;

    fn open(&self, screenshot: &Screenshot) -> Result<RgbaImage> {
        let img = image::open(&screenshot.path)
            .with_context(|| format!("Failed to open {}", screenshot.path.display()))?;
        Ok(img.to_rgba8())
    }

    fn read_name(&self, frame: &RgbaImage, item_id: &str) -> MatchResult {
        let request = NameRequest::statistics(self.mode, item_id);
        self.cascade
            .recognize_name(frame, self.layout.name.at(self.origin), &self.resolver, &request)
            .result
    }

    fn read_fields(&self, frame: &RgbaImage) -> FieldReadings {
        FieldReadings {
            class: self
                .read_text(frame, self.layout.class, ExtractMode::Cyrillic)
                .and_then(|text| parse_class(&text)),
            kills: self.read_number(frame, self.layout.kills),
            honor: self.read_number(frame, self.layout.honor),
            gear: self.read_number(frame, self.layout.gear),
        }
    }
}

/// Class name: quotes dropped, anything from the first `(` cut off.
fn parse_class(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| *c != '`' && *c != '\'').collect();
    let class = cleaned.split('(').next().unwrap_or("").trim();
    if class.is_empty() { None } else { Some(class.to_string()) }
}

/// Concatenates every digit. No digits means unknown, never zero.
fn parse_number(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
