//! Deterministic stand-ins for the OCR collaborators.
//!
//! `FakePreprocessor` encodes the strategy it was asked for and the crop's
//! top-left red value into a 2x1 bitmap; `FakeExtractor` decodes them and
//! answers from a closure. With `row_image` (red channel = row index) a test
//! can script answers per preprocessing strategy and per vertical shift.

use anyhow::{Result, anyhow};
use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ServiceError;
use crate::ocr::{
    Detection, ExtractMode, OnlineRecognizer, PreprocessParams, TextExtractor, VisionPreprocessor,
};

pub const STRATEGY_OTSU: u8 = 0;
pub const STRATEGY_FIXED: u8 = 1;
pub const STRATEGY_OTSU_OFFSET: u8 = 2;
pub const STRATEGY_RAW: u8 = 3;

/// Image whose red channel equals the row index.
pub fn row_image(width: u32, height: u32) -> RgbaImage {
    ImageBuffer::from_fn(width, height, |_, y| Rgba([y as u8, 0, 0, 255]))
}

fn strategy_code(params: &PreprocessParams) -> u8 {
    if params.fixed_threshold.is_some() {
        STRATEGY_FIXED
    } else if params.use_otsu && params.otsu_offset != 0 {
        STRATEGY_OTSU_OFFSET
    } else if params.use_otsu {
        STRATEGY_OTSU
    } else {
        STRATEGY_RAW
    }
}

pub struct FakePreprocessor;

/// `FakePreprocessor` that also keeps every parameter set it was given.
#[derive(Default)]
pub struct RecordingPreprocessor {
    params: Mutex<Vec<PreprocessParams>>,
}

impl RecordingPreprocessor {
    pub fn params(&self) -> Vec<PreprocessParams> {
        self.params.lock().unwrap().clone()
    }
}

impl VisionPreprocessor for RecordingPreprocessor {
    fn preprocess(&self, crop: &RgbaImage, params: &PreprocessParams) -> GrayImage {
        self.params.lock().unwrap().push(params.clone());
        FakePreprocessor.preprocess(crop, params)
    }
}

impl VisionPreprocessor for FakePreprocessor {
    fn preprocess(&self, crop: &RgbaImage, params: &PreprocessParams) -> GrayImage {
        let y = crop.get_pixel(0, 0)[0];
        let mut out = GrayImage::new(2, 1);
        out.put_pixel(0, 0, Luma([strategy_code(params)]));
        out.put_pixel(1, 0, Luma([y]));
        out
    }
}

type Script = dyn Fn(u8, u8, ExtractMode) -> Option<String> + Send + Sync;

/// Answers `(strategy, row, mode) -> text`, recording every call.
pub struct FakeExtractor {
    script: Option<Box<Script>>,
    seen: Mutex<Vec<(u8, u8, ExtractMode)>>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(
        script: impl Fn(u8, u8, ExtractMode) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Some(Box::new(script)),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: None,
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(u8, u8, ExtractMode)> {
        self.seen.lock().unwrap().clone()
    }
}

impl TextExtractor for FakeExtractor {
    fn extract(&self, bitmap: &GrayImage, mode: ExtractMode) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = bitmap.get_pixel(0, 0)[0];
        let y = bitmap.get_pixel(1, 0)[0];
        self.seen.lock().unwrap().push((code, y, mode));

        let script = self.script.as_ref().ok_or_else(|| anyhow!("engine unavailable"))?;
        Ok(script(code, y, mode)
            .map(|text| vec![Detection::new(text, 0.9)])
            .unwrap_or_default())
    }
}

pub struct FakeOnline {
    text: Option<String>,
    calls: AtomicUsize,
}

impl FakeOnline {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OnlineRecognizer for FakeOnline {
    fn recognize(&self, _bitmap: &GrayImage) -> Result<Option<String>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.text {
            Some(text) => Ok(Some(text.clone())),
            None => Err(ServiceError::Processing("service unavailable".to_string())),
        }
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` under a thread-local subscriber and returns what it logged.
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
