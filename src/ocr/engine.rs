use anyhow::{Context, Result, anyhow};
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;
use super::{Detection, ExtractMode, TextExtractor};

/// Text extractor backed by the Tesseract executable.
///
/// Every call treats the bitmap as a single line of text (`--psm 7`) and
/// reads the TSV output, one detection per recognised word.
#[derive(Clone, Debug)]
pub struct TesseractExtractor {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
}

impl TesseractExtractor {
    pub fn new(paths: TesseractPaths) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
        }
    }

    fn build_command(&self, input: &str, output_base: &str, mode: ExtractMode) -> Command {
        let mut command = Command::new(&self.executable);
        command.arg(input).arg(output_base);

        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }

        command
            .arg("-l")
            .arg(language(mode))
            .arg("--psm")
            .arg("7") // Single text line
            .arg("--oem")
            .arg("1");

        if mode == ExtractMode::Digits {
            command.arg("-c").arg("tessedit_char_whitelist=0123456789");
        }

        command.arg("tsv");
        command
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&self, bitmap: &GrayImage, mode: ExtractMode) -> Result<Vec<Detection>> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        bitmap
            .save(temp_input.path())
            .context("Failed to write OCR input image")?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();
        let input = temp_input.path().to_string_lossy().to_string();

        let output = self
            .build_command(&input, &output_base, mode)
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

fn language(mode: ExtractMode) -> &'static str {
    match mode {
        ExtractMode::Mixed => "eng+rus",
        ExtractMode::Latin | ExtractMode::Digits => "eng",
        ExtractMode::Cyrillic => "rus",
    }
}

/// Parses Tesseract TSV output into word detections.
///
/// Keeps every word-level row with non-empty text and a non-negative
/// confidence; confidence is normalised from 0–100 to 0.0–1.0.
fn parse_tsv_output(tsv: &str) -> Vec<Detection> {
    let mut detections = Vec::new();

    // Skip header
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].parse().unwrap_or(-1);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        // Level 5 = word
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        detections.push(Detection::new(text, conf / 100.0));
    }

    detections
}
