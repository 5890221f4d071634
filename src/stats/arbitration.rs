//! Per-event duplicate arbitration.
//!
//! Workers of one event share an `EventContext`. Each canonical name moves
//! through `{valid, processing}` states under a single mutex; OCR work
//! happens outside the lock. At most one valid record is committed per name,
//! and a valid record is never overwritten.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::record::{EventStats, PersonEventRecord};
use crate::cancel::CancellationToken;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct NameState {
    valid: bool,
    processing: bool,
}

/// Why a screenshot was classified as a duplicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateReason {
    /// The name already has a valid record
    Valid,
    /// Another worker kept the name busy past the wait limit
    Timeout,
}

/// Answer to a worker asking to extract fields for a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    Proceed,
    Duplicate(DuplicateReason),
    Cancelled,
}

/// What happened to a finished worker's record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Committed as the valid record for the name
    Committed,
    /// Stored as a low-quality record; a later worker may supersede it
    Provisional,
    /// Discarded
    Duplicate,
}

#[derive(Debug)]
struct Candidate {
    record: PersonEventRecord,
    position: usize,
    known_fields: usize,
}

#[derive(Debug, Default)]
struct Inner {
    names: HashMap<String, NameState>,
    records: HashMap<String, Candidate>,
}

/// Arbitration state shared by the workers of one event.
#[derive(Debug)]
pub struct EventContext {
    inner: Mutex<Inner>,
    changed: Condvar,
    max_wait: Duration,
    poll: Duration,
}

impl EventContext {
    pub fn new(max_wait: Duration, poll: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            max_wait,
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers interest in `name`.
    ///
    /// Waits, bounded by the configured limit, while another worker is
    /// extracting fields for the same name.
    pub fn claim(&self, name: &str, item_id: &str, cancel: &CancellationToken) -> Claim {
        let deadline = Instant::now() + self.max_wait;
        let mut inner = self.lock();

        loop {
            if cancel.is_cancelled() {
                return Claim::Cancelled;
            }

            let Some(state) = inner.names.get_mut(name) else {
                inner.names.insert(
                    name.to_string(),
                    NameState {
                        valid: false,
                        processing: true,
                    },
                );
                return Claim::Proceed;
            };

            if state.valid {
                return Claim::Duplicate(DuplicateReason::Valid);
            }

            if !state.processing {
                tracing::info!("{} {}: retrying to refine an incomplete read", item_id, name);
                state.processing = true;
                return Claim::Proceed;
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("{} {}: timed out waiting for another worker", item_id, name);
                return Claim::Duplicate(DuplicateReason::Timeout);
            }

            let slice = self.poll.min(deadline - now);
            inner = match self.changed.wait_timeout(inner, slice) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Publishes the result of a worker that got `Claim::Proceed`.
    ///
    /// `position` is the screenshot's index in the event and breaks ties
    /// between low-quality reads.
    pub fn finish(
        &self,
        record: PersonEventRecord,
        valid: bool,
        position: usize,
        known_fields: usize,
    ) -> Outcome {
        let outcome = {
            let mut inner = self.lock();
            let name = record.name.clone();
            let already_valid = inner.names.get(&name).is_some_and(|s| s.valid);

            if already_valid {
                Outcome::Duplicate
            } else if valid {
                inner.names.insert(
                    name.clone(),
                    NameState {
                        valid: true,
                        processing: false,
                    },
                );
                inner.records.insert(
                    name,
                    Candidate {
                        record,
                        position,
                        known_fields,
                    },
                );
                Outcome::Committed
            } else {
                if let Some(state) = inner.names.get_mut(&name) {
                    state.processing = false;
                }

                let replaces = inner.records.get(&name).is_none_or(|held| {
                    known_fields > held.known_fields
                        || (known_fields == held.known_fields && position < held.position)
                });

                if replaces {
                    inner.records.insert(
                        name,
                        Candidate {
                            record,
                            position,
                            known_fields,
                        },
                    );
                    Outcome::Provisional
                } else {
                    Outcome::Duplicate
                }
            }
        };

        self.changed.notify_all();
        outcome
    }

    /// Releases a claim without publishing a record.
    pub fn abandon(&self, name: &str) {
        {
            let mut inner = self.lock();
            if let Some(state) = inner.names.get_mut(name) {
                state.processing = false;
            }
        }
        self.changed.notify_all();
    }

    /// The committed records, one per name.
    pub fn into_records(self) -> EventStats {
        let inner = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        inner
            .records
            .into_iter()
            .map(|(name, candidate)| (name, candidate.record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::record::FieldReadings;
    use std::sync::Arc;
    use std::thread;

    fn context() -> EventContext {
        EventContext::new(Duration::from_millis(500), Duration::from_millis(5))
    }

    fn record(name: &str, kills: Option<i64>, honor: Option<i64>) -> PersonEventRecord {
        PersonEventRecord::from_reading(
            name,
            &FieldReadings {
                kills,
                honor,
                ..FieldReadings::default()
            },
        )
    }

    #[test]
    fn test_first_claim_proceeds() {
        let ctx = context();
        let cancel = CancellationToken::new();
        assert_eq!(ctx.claim("Jones", "a.jpg", &cancel), Claim::Proceed);
    }

    #[test]
    fn test_valid_name_is_duplicate() {
        let ctx = context();
        let cancel = CancellationToken::new();
        ctx.claim("Jones", "a.jpg", &cancel);
        assert_eq!(ctx.finish(record("Jones", Some(1), Some(2)), true, 0, 2), Outcome::Committed);

        assert_eq!(ctx.claim("Jones", "b.jpg", &cancel), Claim::Duplicate(DuplicateReason::Valid));
    }

    #[test]
    fn test_invalid_read_superseded() {
        let ctx = context();
        let cancel = CancellationToken::new();

        ctx.claim("Jones", "a.jpg", &cancel);
        assert_eq!(ctx.finish(record("Jones", None, Some(900)), false, 0, 1), Outcome::Provisional);

        assert_eq!(ctx.claim("Jones", "b.jpg", &cancel), Claim::Proceed);
        assert_eq!(
            ctx.finish(record("Jones", Some(500), Some(1000)), true, 1, 2),
            Outcome::Committed
        );

        let records = ctx.into_records();
        assert_eq!(records["Jones"].kills_end, Some(500));
        assert_eq!(records["Jones"].honor_end, Some(1000));
    }

    #[test]
    fn test_better_invalid_read_replaces_worse() {
        let ctx = context();
        let cancel = CancellationToken::new();

        ctx.claim("Jones", "a.jpg", &cancel);
        ctx.finish(record("Jones", None, None), false, 3, 0);
        ctx.claim("Jones", "b.jpg", &cancel);
        assert_eq!(ctx.finish(record("Jones", None, Some(7)), false, 5, 1), Outcome::Provisional);
        ctx.claim("Jones", "c.jpg", &cancel);
        assert_eq!(ctx.finish(record("Jones", Some(2), None), false, 4, 1), Outcome::Provisional);
        ctx.claim("Jones", "d.jpg", &cancel);
        assert_eq!(ctx.finish(record("Jones", Some(9), None), false, 6, 1), Outcome::Duplicate);

        assert_eq!(ctx.into_records()["Jones"].kills_end, Some(2));
    }

    #[test]
    fn test_busy_name_times_out_as_duplicate() {
        let ctx = EventContext::new(Duration::from_millis(30), Duration::from_millis(5));
        let cancel = CancellationToken::new();
        ctx.claim("Jones", "a.jpg", &cancel);

        let started = Instant::now();
        assert_eq!(
            ctx.claim("Jones", "b.jpg", &cancel),
            Claim::Duplicate(DuplicateReason::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_waiter_sees_commit() {
        let ctx = Arc::new(context());
        let cancel = CancellationToken::new();
        ctx.claim("Jones", "a.jpg", &cancel);

        let waiter = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            thread::spawn(move || ctx.claim("Jones", "b.jpg", &cancel))
        };
        thread::sleep(Duration::from_millis(20));
        ctx.finish(record("Jones", Some(1), Some(2)), true, 0, 2);

        assert_eq!(waiter.join().unwrap(), Claim::Duplicate(DuplicateReason::Valid));
    }

    #[test]
    fn test_waiter_retries_after_invalid_finish() {
        let ctx = Arc::new(context());
        let cancel = CancellationToken::new();
        ctx.claim("Jones", "a.jpg", &cancel);

        let waiter = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            thread::spawn(move || ctx.claim("Jones", "b.jpg", &cancel))
        };
        thread::sleep(Duration::from_millis(20));
        ctx.finish(record("Jones", None, None), false, 0, 0);

        assert_eq!(waiter.join().unwrap(), Claim::Proceed);
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let ctx = Arc::new(EventContext::new(Duration::from_secs(10), Duration::from_millis(5)));
        let cancel = CancellationToken::new();
        ctx.claim("Jones", "a.jpg", &cancel);

        let waiter = {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            thread::spawn(move || ctx.claim("Jones", "b.jpg", &cancel))
        };
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        assert_eq!(waiter.join().unwrap(), Claim::Cancelled);
    }

    #[test]
    fn test_concurrent_claims_commit_one_valid_record() {
        let ctx = Arc::new(EventContext::new(Duration::from_secs(5), Duration::from_millis(1)));
        let cancel = CancellationToken::new();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                thread::spawn(move || match ctx.claim("Jones", &format!("{i}.jpg"), &cancel) {
                    Claim::Proceed => {
                        thread::sleep(Duration::from_millis(2));
                        ctx.finish(record("Jones", Some(i), Some(100 + i)), true, i as usize, 2)
                    }
                    _ => Outcome::Duplicate,
                })
            })
            .collect();

        let outcomes: Vec<Outcome> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Committed).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == Outcome::Duplicate).count(), 7);

        let ctx = Arc::try_unwrap(ctx).unwrap();
        assert_eq!(ctx.into_records().len(), 1);
    }
}
