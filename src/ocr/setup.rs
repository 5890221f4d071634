use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Location of the Tesseract executable and, optionally, its language data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract use its built-in tessdata location
    pub tessdata: Option<PathBuf>,
}

/// Per-user directory for a bundled Tesseract copy.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("raidstat")
        .join("tesseract")
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "tesseract.exe" } else { "tesseract" }
}

/// Finds a usable Tesseract installation.
///
/// Search order: the configured executable, `tesseract` on PATH, common
/// install directories, then the per-user bundle directory.
pub fn find_tesseract(
    configured: Option<&Path>,
    tessdata: Option<&Path>,
) -> Result<TesseractPaths> {
    let tessdata = tessdata.map(Path::to_path_buf);

    if let Some(path) = configured {
        if path.exists() {
            tracing::info!("Using configured Tesseract: {}", path.display());
            return Ok(TesseractPaths {
                executable: path.to_path_buf(),
                tessdata,
            });
        }
        tracing::warn!("Configured Tesseract not found at {}", path.display());
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            tracing::info!("Tesseract found in system PATH");
            return Ok(TesseractPaths {
                executable: PathBuf::from("tesseract"),
                tessdata,
            });
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
    ];
    for path in common_paths {
        let path = PathBuf::from(path);
        if path.exists() {
            tracing::info!("Found Tesseract at: {}", path.display());
            return Ok(TesseractPaths {
                executable: path,
                tessdata,
            });
        }
    }

    let bundled_dir = get_tesseract_dir();
    let bundled = bundled_dir.join(executable_name());
    if bundled.exists() {
        tracing::info!("Using bundled Tesseract: {}", bundled.display());
        let bundled_data = bundled_dir.join("tessdata");
        return Ok(TesseractPaths {
            executable: bundled,
            tessdata: tessdata.or_else(|| bundled_data.exists().then_some(bundled_data)),
        });
    }

    Err(anyhow!(
        "Tesseract executable not found. Install Tesseract with the eng and rus language data, \
         add it to PATH, or set tesseract_path in config.json"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_configured_path_wins() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join(executable_name());
        std::fs::write(&exe, b"").unwrap();
        let data = dir.path().join("tessdata");

        let paths = find_tesseract(Some(&exe), Some(&data)).unwrap();
        assert_eq!(paths.executable, exe);
        assert_eq!(paths.tessdata, Some(data));
    }

    #[test]
    fn test_bundle_dir_is_per_user() {
        assert!(get_tesseract_dir().ends_with("raidstat/tesseract"));
    }
}
