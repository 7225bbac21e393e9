use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::utils::time::{local_date_of, local_hour_of};

/// Append-only log of keystroke timestamps. Events are appended with "now",
/// so the sequence stays non-decreasing and range queries can binary search
/// for the cutoff instead of scanning.
///
/// The log is not synchronized. [StatsEngine](super::engine::StatsEngine) is
/// the only owner and serializes every mutation and read.
#[derive(Debug, Default)]
pub struct KeystrokeLog {
    events: Vec<DateTime<Utc>>,
}

impl KeystrokeLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Restores a log from persisted timestamps. The snapshot is written in
    /// order, but a corrupted or hand-edited file shouldn't break the search
    /// invariant, so out-of-order input gets sorted.
    pub fn from_timestamps(mut events: Vec<DateTime<Utc>>) -> Self {
        events.sort_unstable();
        Self { events }
    }

    pub fn append(&mut self, moment: DateTime<Utc>) {
        self.events.push(moment);
    }

    /// Drops every event older than `now - horizon`. The log is time-ordered,
    /// so this is a binary search for the cutoff followed by a prefix drain.
    /// Returns the number of removed events.
    pub fn prune_older_than(&mut self, horizon: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - horizon;
        let first_kept = self.events.partition_point(|moment| *moment < cutoff);
        if first_kept > 0 {
            self.events.drain(..first_kept);
        }
        first_kept
    }

    /// Number of events with timestamp >= `cutoff`. Total for any cutoff:
    /// an empty log or a cutoff past the last event simply gives 0, and a
    /// cutoff in the past counts the whole log. Clock jumps therefore can't
    /// produce an error here, only a transiently skewed count.
    pub fn count_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.events.len() - self.events.partition_point(|moment| *moment < cutoff)
    }

    /// Number of events that fall on the given day of the host calendar.
    pub fn count_on_date(&self, date: NaiveDate) -> usize {
        self.events
            .iter()
            .filter(|moment| local_date_of(**moment) == date)
            .count()
    }

    /// Per-hour buckets (host calendar) for events on the given day.
    pub fn hourly_breakdown(&self, date: NaiveDate) -> [usize; 24] {
        let mut buckets = [0; 24];
        for moment in &self.events {
            if local_date_of(*moment) == date {
                buckets[local_hour_of(*moment)] += 1;
            }
        }
        buckets
    }

    pub fn total(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.events
    }
}
