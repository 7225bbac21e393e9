//! The statistics core. [log::KeystrokeLog] holds the raw history,
//! [counts::WindowCounts] derives the sliding-window numbers from it, and
//! [engine::StatsEngine] is the single task that owns the log and serializes
//! keystroke ingestion, periodic pruning and persistence.

use chrono::Duration;

pub mod counts;
pub mod engine;
pub mod log;

/// Events older than this are discarded from memory and from the snapshot.
pub fn retention_horizon() -> Duration {
    Duration::days(7)
}
