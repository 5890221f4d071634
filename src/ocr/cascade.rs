use image::{GrayImage, RgbaImage};
use std::sync::Arc;

use super::preprocess::crop_region;
use super::{
    ExtractMode, OcrMode, OnlineRecognizer, PreprocessParams, Region, TextExtractor,
    VisionPreprocessor, join_detections, longest_word,
};
use crate::resolver::{MatchKind, MatchResult, NameResolver};

/// Fixed brightness threshold tried first when an Otsu offset is configured.
const PRIMARY_FIXED_THRESHOLD: u8 = 75;

/// Per-call options of the name cascade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameRequest {
    pub mode: OcrMode,
    pub use_otsu: bool,
    pub max_threshold: Option<u8>,
    /// Non-zero switches the primary pass to a fixed threshold and enables
    /// the Otsu+offset retry
    pub otsu_offset: i16,
    pub padding: u32,
    /// Send an unbinarised crop to the online service
    pub online_no_binarize: bool,
    pub retry_with_shifts: bool,
    /// Label used in log lines
    pub item_id: String,
}

impl Default for NameRequest {
    fn default() -> Self {
        Self {
            mode: OcrMode::Offline,
            use_otsu: true,
            max_threshold: None,
            otsu_offset: 0,
            padding: 5,
            online_no_binarize: false,
            retry_with_shifts: false,
            item_id: String::new(),
        }
    }
}

impl NameRequest {
    /// Name field of a personal statistics screenshot.
    pub fn statistics(mode: OcrMode, item_id: impl Into<String>) -> Self {
        Self {
            mode,
            padding: 3,
            retry_with_shifts: true,
            item_id: item_id.into(),
            ..Self::default()
        }
    }

    /// One cell of the raid attendance frame.
    pub fn attendance(mode: OcrMode, item_id: impl Into<String>) -> Self {
        Self {
            mode,
            otsu_offset: -8,
            padding: 3,
            online_no_binarize: true,
            retry_with_shifts: true,
            item_id: item_id.into(),
            ..Self::default()
        }
    }

    fn base_params(&self) -> PreprocessParams {
        PreprocessParams {
            scale: 2,
            padding: self.padding,
            use_otsu: self.use_otsu,
            invert: true,
            max_threshold: self.max_threshold,
            ..PreprocessParams::default()
        }
    }
}

/// Result of a cascade run: the chosen match and the bitmap that produced it.
#[derive(Clone, Debug)]
pub struct Recognition {
    pub result: MatchResult,
    /// `None` when the region was empty after clamping
    pub bitmap: Option<GrayImage>,
}

struct Attempt {
    result: MatchResult,
    bitmap: GrayImage,
}

fn unconfirmed(kind: MatchKind) -> bool {
    matches!(kind, MatchKind::New | MatchKind::Unknown)
}

/// Bounded sequence of OCR attempts over one region.
#[derive(Clone)]
pub struct RecognitionCascade {
    preprocessor: Arc<dyn VisionPreprocessor>,
    extractor: Arc<dyn TextExtractor>,
    online: Option<Arc<dyn OnlineRecognizer>>,
    verbose: bool,
}

impl RecognitionCascade {
    pub fn new(
        preprocessor: Arc<dyn VisionPreprocessor>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            preprocessor,
            extractor,
            online: None,
            verbose: false,
        }
    }

    pub fn with_online(mut self, online: Arc<dyn OnlineRecognizer>) -> Self {
        self.online = Some(online);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn preprocessor(&self) -> &dyn VisionPreprocessor {
        self.preprocessor.as_ref()
    }

    pub fn extractor(&self) -> &dyn TextExtractor {
        self.extractor.as_ref()
    }

    /// Recognises a participant name inside `region`.
    ///
    /// Stages run in a fixed order and stop as soon as a stage produces an
    /// acceptable result:
    /// 1. primary pass (fixed threshold when an offset is set, else Otsu)
    /// 2. Otsu + offset, when an offset is set
    /// 3. raw pass without binarisation or padding
    /// 4. opposite-script retry (offline mode)
    /// 5. online service (mixed mode)
    /// 6. region shifted by -1 then +1 pixel (offline, no further shifts)
    pub fn recognize_name(
        &self,
        image: &RgbaImage,
        region: Region,
        resolver: &NameResolver,
        request: &NameRequest,
    ) -> Recognition {
        self.run(image, region, resolver, request, true)
    }

    fn run(
        &self,
        image: &RgbaImage,
        region: Region,
        resolver: &NameResolver,
        request: &NameRequest,
        top_level: bool,
    ) -> Recognition {
        let id = request.item_id.as_str();

        let Some(crop) = crop_region(image, region) else {
            tracing::warn!("[{}] Region {:?} is outside the image", id, region);
            return Recognition {
                result: MatchResult::unknown(),
                bitmap: None,
            };
        };

        let base = request.base_params();

        // Primary
        let primary = if request.otsu_offset != 0 {
            PreprocessParams {
                use_otsu: false,
                fixed_threshold: Some(PRIMARY_FIXED_THRESHOLD),
                ..base.clone()
            }
        } else {
            base.clone()
        };
        let mut best = self.attempt(&crop, &primary, resolver, id);
        self.trace(id, "primary", &best.result);

        // Otsu + offset
        if !best.result.is_usable() && request.otsu_offset != 0 {
            let params = PreprocessParams {
                use_otsu: true,
                otsu_offset: request.otsu_offset,
                ..base.clone()
            };
            let retry = self.attempt(&crop, &params, resolver, id);
            self.trace(id, "otsu offset", &retry.result);
            if retry.result.is_usable() {
                best = retry;
            }
        }

        // Raw
        if !best.result.is_usable() {
            let params = PreprocessParams {
                use_otsu: false,
                padding: 0,
                max_threshold: None,
                ..base.clone()
            };
            let retry = self.attempt(&crop, &params, resolver, id);
            self.trace(id, "raw", &retry.result);
            if retry.result.is_usable() {
                best = retry;
            }
        }

        // Opposite script
        if request.mode == OcrMode::Offline && unconfirmed(best.result.kind) {
            if let Some(candidate) = best.result.candidate() {
                let swapped = ExtractMode::swapped_for(candidate);
                let retry = self.read(&best.bitmap, swapped, resolver, id);
                self.trace(id, "language swap", &retry);
                if matches!(retry.kind, MatchKind::Exact | MatchKind::Fuzzy | MatchKind::Replaced) {
                    best.result = retry;
                }
            }
        }

        // Online
        if request.mode == OcrMode::Mixed && unconfirmed(best.result.kind) {
            if let Some(online) = &self.online {
                let bitmap = if request.online_no_binarize {
                    let params = PreprocessParams {
                        use_otsu: false,
                        padding: 0,
                        ..base.clone()
                    };
                    self.preprocessor.preprocess(&crop, &params)
                } else {
                    best.bitmap.clone()
                };

                match online.recognize(&bitmap) {
                    Ok(Some(text)) => {
                        let result = resolve_longest(&text, resolver);
                        self.trace(id, "online", &result);
                        if result.name.is_some() {
                            best = Attempt { result, bitmap };
                        }
                    }
                    Ok(None) => self.trace(id, "online", &MatchResult::unknown()),
                    Err(e) => tracing::error!("[{}] Online recognition failed: {}", id, e),
                }
            }
        }

        // Vertical shifts
        if request.retry_with_shifts && unconfirmed(best.result.kind) {
            let shifted_request = NameRequest {
                mode: OcrMode::Offline,
                retry_with_shifts: false,
                item_id: format!("{}_shift", id),
                ..request.clone()
            };

            for dy in [-1, 1] {
                let shifted = region.shifted_y(dy);
                if shifted.y < 0 {
                    continue;
                }
                let retry = self.run(image, shifted, resolver, &shifted_request, false);
                self.trace(id, if dy < 0 { "shift -1" } else { "shift +1" }, &retry.result);
                if retry.result.kind.is_roster_match() {
                    if let Some(bitmap) = retry.bitmap {
                        best = Attempt {
                            result: retry.result,
                            bitmap,
                        };
                        break;
                    }
                }
            }
        }

        if top_level && !self.verbose {
            tracing::info!("[{}] -> '{}'", id, best.result.candidate().unwrap_or(""));
        }

        Recognition {
            result: best.result,
            bitmap: Some(best.bitmap),
        }
    }

    fn attempt(
        &self,
        crop: &RgbaImage,
        params: &PreprocessParams,
        resolver: &NameResolver,
        id: &str,
    ) -> Attempt {
        let bitmap = self.preprocessor.preprocess(crop, params);
        let result = self.read(&bitmap, ExtractMode::Mixed, resolver, id);
        Attempt { result, bitmap }
    }

    fn read(
        &self,
        bitmap: &GrayImage,
        mode: ExtractMode,
        resolver: &NameResolver,
        id: &str,
    ) -> MatchResult {
        match self.extractor.extract(bitmap, mode) {
            Ok(detections) => match join_detections(&detections) {
                Some(text) => resolve_longest(&text, resolver),
                None => MatchResult::unknown(),
            },
            Err(e) => {
                tracing::warn!("[{}] Text extraction failed: {}", id, e);
                MatchResult::unknown()
            }
        }
    }

    fn trace(&self, id: &str, stage: &str, result: &MatchResult) {
        if self.verbose {
            tracing::info!(
                "[{}] {}: {:?} '{}' score {}",
                id,
                stage,
                result.kind,
                result.candidate().unwrap_or(""),
                result.score
            );
        }
    }
}

fn resolve_longest(text: &str, resolver: &NameResolver) -> MatchResult {
    match longest_word(text) {
        Some(word) => resolver.resolve(word),
        None => MatchResult::unknown(),
    }
}
