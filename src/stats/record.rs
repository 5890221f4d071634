use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-participant records of one event, keyed by canonical name.
pub type EventStats = BTreeMap<String, PersonEventRecord>;

/// Raw field values read from one screenshot. Missing digits stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldReadings {
    pub class: Option<String>,
    pub kills: Option<i64>,
    pub honor: Option<i64>,
    pub gear: Option<i64>,
}

impl FieldReadings {
    /// A read is valid once both counters were recognised.
    pub fn is_valid(&self) -> bool {
        self.kills.is_some() && self.honor.is_some()
    }

    /// Number of numeric fields that were recognised.
    pub fn known_fields(&self) -> usize {
        [self.kills, self.honor, self.gear].iter().filter(|v| v.is_some()).count()
    }
}

/// One participant in one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEventRecord {
    pub name: String,
    pub class: Option<String>,
    pub gear: Option<i64>,
    pub kills_start: Option<i64>,
    pub kills_end: Option<i64>,
    pub kills_delta: Option<i64>,
    pub honor_start: Option<i64>,
    pub honor_end: Option<i64>,
    pub honor_delta: Option<i64>,
}

/// `end - start`, or `None` when either side is unknown.
pub fn delta(start: Option<i64>, end: Option<i64>) -> Option<i64> {
    Some(end? - start?)
}

impl PersonEventRecord {
    /// Record from a single screenshot: start and end are the same read.
    pub fn from_reading(name: &str, reading: &FieldReadings) -> Self {
        let mut record = Self {
            name: name.to_string(),
            class: reading.class.clone(),
            gear: reading.gear,
            kills_start: reading.kills,
            kills_end: reading.kills,
            honor_start: reading.honor,
            honor_end: reading.honor,
            ..Self::default()
        };
        record.recompute();
        record
    }

    /// Participant seen in the previous event but not in this one.
    pub fn did_not_finish(previous: &PersonEventRecord) -> Self {
        Self {
            name: previous.name.clone(),
            class: previous.class.clone(),
            gear: previous.gear,
            kills_start: previous.kills_end,
            kills_end: None,
            kills_delta: None,
            honor_start: previous.honor_end,
            honor_end: None,
            honor_delta: None,
        }
    }

    /// Rebases the start values on the previous event. With no previous
    /// record there is no baseline and the start values are cleared.
    pub fn chain_from(&mut self, previous: Option<&PersonEventRecord>) {
        self.kills_start = previous.and_then(|p| p.kills_end);
        self.honor_start = previous.and_then(|p| p.honor_end);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.kills_delta = delta(self.kills_start, self.kills_end);
        self.honor_delta = delta(self.honor_start, self.honor_end);
    }
}

/// Links `current` to the event before it.
///
/// Participants present in both take their start values from the previous
/// end values; newcomers lose their start values; participants missing from
/// `current` get a "did not finish" record.
pub fn update_stats_between_groups(current: &mut EventStats, previous: &EventStats) {
    for (name, record) in current.iter_mut() {
        record.chain_from(previous.get(name));
    }

    for (name, record) in previous {
        if !current.contains_key(name) {
            current.insert(name.clone(), PersonEventRecord::did_not_finish(record));
        }
    }
}
