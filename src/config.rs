//! Configuration types.
//!
//! Loads settings from config.json at startup. Provides the region layout of
//! the statistics frame and attendance grid, grouping and arbitration timing,
//! OCR mode and the fuzzy-matching thresholds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::{OcrMode, Region};
use crate::resolver::MatchThresholds;

/// A point in source-image pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// What the grouping gap is measured against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapAnchor {
    /// Gap to the previous screenshot's capture time.
    #[default]
    Previous,
    /// Gap to the first screenshot of the current event.
    EventStart,
}

/// Field regions of the personal statistics frame, relative to its origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatLayout {
    pub name: Region,
    pub class: Region,
    pub honor: Region,
    pub kills: Region,
    pub gear: Region,
}

impl Default for StatLayout {
    fn default() -> Self {
        // 120% interface scale
        Self {
            name: Region::new(-302, -20, 118, 18),
            class: Region::new(53, 9, 362, 20),
            honor: Region::new(225, 113, 80, 15),
            kills: Region::new(195, 133, 70, 15),
            gear: Region::new(167, 72, 58, 15),
        }
    }
}

/// Name-cell grid of the raid frame used for attendance.
///
/// Cells sit at `origin + (col_offsets[c], row_offsets[r] + block * block_shift)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceGrid {
    pub origin: Point,
    pub col_offsets: Vec<i32>,
    pub row_offsets: Vec<i32>,
    pub blocks: u32,
    pub block_shift: i32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl Default for AttendanceGrid {
    fn default() -> Self {
        Self {
            origin: Point { x: 1396, y: 1020 },
            col_offsets: vec![0, 81, 162, 242, 323],
            row_offsets: vec![0, 41, 81, 122, 163],
            blocks: 2,
            block_shift: 245,
            cell_width: 69,
            cell_height: 16,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum gap between screenshots of one event, in minutes
    pub max_gap_minutes: i64,
    pub gap_anchor: GapAnchor,
    pub ocr_mode: OcrMode,
    /// API key for the online recognition service (mixed mode only)
    pub ocr_api_key: String,
    pub online_endpoint: String,
    pub online_timeout_secs: u64,
    /// Log every cascade stage instead of one summary line per region
    pub verbose: bool,
    /// Descend into subfolders when scanning for screenshots
    pub recursive_scan: bool,
    pub worker_threads: usize,
    /// Longest a worker waits for another worker holding the same name
    pub arbitration_timeout_ms: u64,
    pub arbitration_poll_ms: u64,
    /// Origin of the personal statistics frame
    pub personal_frame: Point,
    pub stat_fields: StatLayout,
    pub attendance: AttendanceGrid,
    pub matching: MatchThresholds,
    pub replacements_path: Option<PathBuf>,
    /// Newline-separated list of known names
    pub roster_path: Option<PathBuf>,
    pub tesseract_path: Option<PathBuf>,
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_gap_minutes: 15,
            gap_anchor: GapAnchor::default(),
            ocr_mode: OcrMode::Offline,
            ocr_api_key: String::new(),
            online_endpoint: "https://api.ocr.space/parse/image".to_string(),
            online_timeout_secs: 10,
            verbose: false,
            recursive_scan: false,
            worker_threads: 8,
            arbitration_timeout_ms: 5000,
            arbitration_poll_ms: 50,
            personal_frame: Point { x: 1453, y: 964 },
            stat_fields: StatLayout::default(),
            attendance: AttendanceGrid::default(),
            matching: MatchThresholds::default(),
            replacements_path: None,
            roster_path: None,
            tesseract_path: None,
            tessdata_dir: None,
        }
    }
}

impl Config {
    pub fn max_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_gap_minutes)
    }

    pub fn arbitration_timeout(&self) -> Duration {
        Duration::from_millis(self.arbitration_timeout_ms)
    }

    pub fn arbitration_poll(&self) -> Duration {
        Duration::from_millis(self.arbitration_poll_ms.max(1))
    }

    pub fn online_timeout(&self) -> Duration {
        Duration::from_secs(self.online_timeout_secs)
    }
}

/// Reads and parses a config file.
pub fn read_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Loads configuration from `path`, or returns defaults when the file is
/// missing or malformed.
pub fn load_config(path: &Path) -> Config {
    tracing::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        tracing::info!("{} not found. Using default config.", path.display());
        return Config::default();
    }

    match read_config(path) {
        Ok(config) => {
            tracing::info!("Config loaded from {}", path.display());
            config
        }
        Err(e) => {
            tracing::warn!("{:#}. Using defaults.", e);
            Config::default()
        }
    }
}

/// Loads the roster: one name per line, blank lines ignored.
pub fn load_roster(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read roster {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "max_gap_minutes": 30, "ocr_mode": "mixed", "gap_anchor": "event_start" }"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.max_gap_minutes, 30);
        assert_eq!(config.ocr_mode, OcrMode::Mixed);
        assert_eq!(config.gap_anchor, GapAnchor::EventStart);
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.matching, MatchThresholds::default());
    }

    #[test]
    fn test_malformed_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(read_config(&path).is_err());
        let config = load_config(&path);
        assert_eq!(config.max_gap_minutes, 15);
        assert_eq!(config.ocr_mode, OcrMode::Offline);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json"));
        assert_eq!(config.arbitration_timeout(), Duration::from_millis(5000));
        assert_eq!(config.max_gap(), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_load_roster_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roster.txt");
        fs::write(&path, "Smith\n\n  Jones  \nЛи\n").unwrap();

        let roster = load_roster(&path).unwrap();
        assert_eq!(roster, vec!["Smith", "Jones", "Ли"]);
    }
}
