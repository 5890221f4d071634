//! Event aggregation for personal statistics screenshots.
//!
//! Screenshots are grouped into time-bounded events, each event is extracted
//! by a worker pool with per-name duplicate arbitration, and consecutive
//! events are chained so that one event's end values become the next one's
//! start values.

pub mod aggregator;
pub mod arbitration;
pub mod extract;
pub mod grouping;
pub mod record;

pub use aggregator::{
    AggregateReport, EventOutcome, EventReport, FailedScreenshot, GroupAggregator, StatExtractor,
};
pub use arbitration::{Claim, DuplicateReason, EventContext, Outcome};
pub use extract::OcrStatExtractor;
pub use grouping::{Event, Screenshot, group_into_events, scan_screenshots};
pub use record::{EventStats, FieldReadings, PersonEventRecord, delta, update_stats_between_groups};
