use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::GapAnchor;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One input image and its capture time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screenshot {
    pub path: PathBuf,
    pub captured_at: DateTime<Local>,
}

impl Screenshot {
    pub fn new(path: impl Into<PathBuf>, captured_at: DateTime<Local>) -> Self {
        Self {
            path: path.into(),
            captured_at,
        }
    }

    /// File name used to tag log lines.
    pub fn item_id(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Screenshots taken close enough together to describe one observation point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub id: usize,
    pub started_at: DateTime<Local>,
    /// `YYYY-MM-DD HH:MM` of the first screenshot
    pub label: String,
    pub screenshots: Vec<Screenshot>,
}

impl Event {
    fn start(id: usize, first: Screenshot) -> Self {
        Self {
            id,
            started_at: first.captured_at,
            label: first.captured_at.format("%Y-%m-%d %H:%M").to_string(),
            screenshots: vec![first],
        }
    }
}

/// Sorts screenshots by capture time and splits them wherever the gap
/// exceeds `max_gap`.
pub fn group_into_events(
    mut screenshots: Vec<Screenshot>,
    max_gap: chrono::Duration,
    anchor: GapAnchor,
) -> Vec<Event> {
    screenshots.sort_by(|a, b| {
        a.captured_at
            .cmp(&b.captured_at)
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut events: Vec<Event> = Vec::new();
    for shot in screenshots {
        let Some(current) = events.last_mut() else {
            events.push(Event::start(0, shot));
            continue;
        };

        let reference = match anchor {
            GapAnchor::Previous => current
                .screenshots
                .last()
                .map_or(current.started_at, |s| s.captured_at),
            GapAnchor::EventStart => current.started_at,
        };

        if shot.captured_at - reference > max_gap {
            let id = events.len();
            events.push(Event::start(id, shot));
        } else {
            current.screenshots.push(shot);
        }
    }

    events
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Collects image files from `folder`, using the modification time as the
/// capture time. Subfolders are scanned only when `recursive` is set.
pub fn scan_screenshots(folder: &Path, recursive: bool) -> Result<Vec<Screenshot>> {
    let mut screenshots = Vec::new();
    let mut pending = vec![folder.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;

            if metadata.is_dir() {
                if recursive {
                    pending.push(path);
                }
                continue;
            }

            if is_image(&path) {
                let modified = metadata
                    .modified()
                    .with_context(|| format!("No modification time for {}", path.display()))?;
                screenshots.push(Screenshot::new(path, DateTime::<Local>::from(modified)));
            }
        }
    }

    tracing::info!("Found {} screenshots in {}", screenshots.len(), folder.display());
    Ok(screenshots)
}
