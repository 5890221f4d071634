use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use super::arbitration::{Claim, EventContext, Outcome};
use super::grouping::{Event, Screenshot};
use super::record::{EventStats, FieldReadings, PersonEventRecord, update_stats_between_groups};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::ScreenshotError;
use crate::resolver::MatchResult;

/// Source of per-screenshot readings consumed by the aggregator.
pub trait StatExtractor: Send + Sync {
    /// Decoded screenshot.
    type Frame: Send;

    fn open(&self, screenshot: &Screenshot) -> Result<Self::Frame>;

    fn read_name(&self, frame: &Self::Frame, item_id: &str) -> MatchResult;

    fn read_fields(&self, frame: &Self::Frame) -> FieldReadings;
}

/// A screenshot that produced no record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedScreenshot {
    pub path: PathBuf,
    pub reason: String,
}

/// Records of one emitted event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventReport {
    pub id: usize,
    pub label: String,
    pub records: EventStats,
}

/// Output of a full aggregation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    /// Every event after the first, chained to its predecessor
    pub events: Vec<EventReport>,
    /// Label of the first event, which only supplies baselines
    pub baseline: Option<String>,
    pub failed: Vec<FailedScreenshot>,
    pub duplicates: usize,
    pub cancelled: bool,
}

/// Result of extracting one event, before cross-event chaining.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub stats: EventStats,
    pub failed: Vec<FailedScreenshot>,
    pub duplicates: usize,
    pub cancelled: bool,
}

enum ShotResult {
    Recorded,
    Duplicate,
    Failed(ScreenshotError),
    Cancelled,
}

/// Groups screenshots into per-participant records and chains events.
pub struct GroupAggregator<E: StatExtractor> {
    extractor: E,
    pool: rayon::ThreadPool,
    max_wait: Duration,
    poll: Duration,
}

impl<E: StatExtractor> GroupAggregator<E> {
    pub fn new(extractor: E, config: &Config) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("raidstat-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;

        Ok(Self {
            extractor,
            pool,
            max_wait: config.arbitration_timeout(),
            poll: config.arbitration_poll(),
        })
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Processes events in chronological order.
    ///
    /// The first event only supplies baselines. Each later event is chained
    /// to the one before it and emitted. Cancellation stops at the current
    /// event; events emitted before it are kept.
    pub fn aggregate(&self, events: &[Event], cancel: &CancellationToken) -> AggregateReport {
        let mut report = AggregateReport::default();
        let mut previous: Option<EventStats> = None;

        for event in events {
            if cancel.is_cancelled() {
                tracing::info!("Aggregation cancelled before event {}", event.label);
                report.cancelled = true;
                break;
            }

            let outcome = self.process_event(event, cancel);
            if outcome.cancelled {
                tracing::info!("Aggregation cancelled during event {}", event.label);
                report.cancelled = true;
                break;
            }

            report.failed.extend(outcome.failed);
            report.duplicates += outcome.duplicates;

            let mut stats = outcome.stats;
            match previous.take() {
                None => {
                    tracing::info!(
                        "Event {} is the baseline ({} participants)",
                        event.label,
                        stats.len()
                    );
                    report.baseline = Some(event.label.clone());
                }
                Some(prev) => {
                    update_stats_between_groups(&mut stats, &prev);
                    report.events.push(EventReport {
                        id: event.id,
                        label: event.label.clone(),
                        records: stats.clone(),
                    });
                }
            }
            previous = Some(stats);
        }

        report
    }

    /// Extracts one record per participant from the screenshots of `event`.
    pub fn process_event(&self, event: &Event, cancel: &CancellationToken) -> EventOutcome {
        tracing::info!(
            "Processing event {} with {} screenshots",
            event.label,
            event.screenshots.len()
        );

        let context = EventContext::new(self.max_wait, self.poll);
        let results: Vec<ShotResult> = self.pool.install(|| {
            event
                .screenshots
                .par_iter()
                .enumerate()
                .map(|(position, shot)| self.process_screenshot(shot, position, &context, cancel))
                .collect()
        });

        let mut outcome = EventOutcome::default();
        for (shot, result) in event.screenshots.iter().zip(results) {
            match result {
                ShotResult::Recorded => {}
                ShotResult::Duplicate => outcome.duplicates += 1,
                ShotResult::Failed(e) => {
                    tracing::warn!("{}: {}", shot.path.display(), e);
                    outcome.failed.push(FailedScreenshot {
                        path: shot.path.clone(),
                        reason: e.to_string(),
                    });
                }
                ShotResult::Cancelled => outcome.cancelled = true,
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
        }
        outcome.stats = context.into_records();
        outcome
    }

    fn process_screenshot(
        &self,
        shot: &Screenshot,
        position: usize,
        context: &EventContext,
        cancel: &CancellationToken,
    ) -> ShotResult {
        if cancel.is_cancelled() {
            return ShotResult::Cancelled;
        }

        let item_id = shot.item_id();
        let frame = match self.extractor.open(shot) {
            Ok(frame) => frame,
            Err(e) => {
                return ShotResult::Failed(ScreenshotError::Load {
                    path: shot.path.clone(),
                    message: format!("{:#}", e),
                });
            }
        };

        let recognition = self.extractor.read_name(&frame, &item_id);
        let Some(name) = recognition.name.filter(|_| recognition.kind.is_usable()) else {
            return ShotResult::Failed(ScreenshotError::Recognition);
        };

        match context.claim(&name, &item_id, cancel) {
            Claim::Proceed => {}
            Claim::Duplicate(reason) => {
                tracing::info!("{} {} (duplicate, {:?})", item_id, name, reason);
                return ShotResult::Duplicate;
            }
            Claim::Cancelled => return ShotResult::Cancelled,
        }

        let readings = self.extractor.read_fields(&frame);
        if cancel.is_cancelled() {
            context.abandon(&name);
            return ShotResult::Cancelled;
        }

        let record = PersonEventRecord::from_reading(&name, &readings);
        tracing::info!("{}: {:?}", item_id, record);

        match context.finish(record, readings.is_valid(), position, readings.known_fields()) {
            Outcome::Committed | Outcome::Provisional => ShotResult::Recorded,
            Outcome::Duplicate => {
                tracing::info!("{} {} (duplicate)", item_id, name);
                ShotResult::Duplicate
            }
        }
    }
}
