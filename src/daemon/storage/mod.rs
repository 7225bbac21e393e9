//! Persistence is organized through [snapshot::SnapshotStorageImpl].
//! The basic idea is:
//!  - There is a single snapshot file in the application directory.
//!  - It holds the ordered raw timestamps of the retained 7-day window,
//!    as a JSON array of epoch seconds.
//!  - Writes go through a temporary file and an atomic rename, so a partial
//!    write can never eat the previous snapshot.

pub mod snapshot;
