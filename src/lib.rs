//! Raid statistics from game screenshots.
//!
//! Turns noisy OCR reads of a game's statistics and raid frames into a
//! reconciled roster of participants with per-event kill and honor deltas.

pub mod attendance;
pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod resolver;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use config::Config;
pub use resolver::{MatchKind, MatchResult, NameResolver};
