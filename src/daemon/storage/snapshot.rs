use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::daemon::stats::retention_horizon;

const SNAPSHOT_FILE: &str = "keystrokes.json";
const SNAPSHOT_TMP_FILE: &str = "keystrokes.json.tmp";

/// Interface for abstracting persistence of the keystroke history. The
/// history is stored as one ordered sequence of raw timestamps and nothing
/// else; every derived number is recomputed after a restore.
pub trait SnapshotStorage {
    /// Persists the retained window of the log. Events older than the
    /// retention horizon relative to `now` are not written.
    fn save(
        &self,
        timestamps: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>>;

    /// Restores the persisted history. An absent snapshot is an empty
    /// history, not an error.
    fn load(&self) -> impl std::future::Future<Output = Result<Vec<DateTime<Utc>>>>;
}

/// The main realization of [SnapshotStorage]. Keeps the whole history in a
/// single JSON array of epoch seconds. A write goes to a temporary file that
/// is renamed over the snapshot, so a crash mid-write leaves the previous
/// snapshot intact.
pub struct SnapshotStorageImpl {
    snapshot_dir: PathBuf,
}

impl SnapshotStorageImpl {
    pub fn new(snapshot_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&snapshot_dir)?;

        Ok(Self { snapshot_dir })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.join(SNAPSHOT_FILE)
    }

    async fn read_snapshot(path: &Path) -> std::result::Result<String, std::io::Error> {
        debug!("Reading snapshot {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut contents = String::new();
        let result = file.read_to_string(&mut contents).await;
        file.unlock_async().await?;
        result?;
        Ok(contents)
    }
}

impl SnapshotStorage for SnapshotStorageImpl {
    async fn save(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> Result<()> {
        let cutoff = now - retention_horizon();
        let retained = timestamps
            .iter()
            .filter(|moment| **moment >= cutoff)
            .map(|moment| moment.timestamp_millis() as f64 / 1000.)
            .collect::<Vec<_>>();

        let buffer = serde_json::to_vec(&retained)?;

        let tmp_path = self.snapshot_dir.join(SNAPSHOT_TMP_FILE);
        let mut file = File::create(&tmp_path).await?;
        file.lock_exclusive()?;
        let write_result = async {
            file.write_all(&buffer).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        write_result?;
        drop(file);

        tokio::fs::rename(&tmp_path, self.snapshot_path()).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<DateTime<Utc>>> {
        let path = self.snapshot_path();
        let contents = match Self::read_snapshot(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let raw = match serde_json::from_str::<Vec<f64>>(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                // Older or corrupt data must never take the daemon down.
                warn!("Snapshot at {path:?} is malformed, starting with an empty history: {e}");
                return Ok(vec![]);
            }
        };

        let timestamps = raw
            .into_iter()
            .filter_map(|seconds| {
                let restored = DateTime::from_timestamp_millis((seconds * 1000.).round() as i64);
                if restored.is_none() {
                    warn!("Dropping out-of-range timestamp {seconds} from snapshot");
                }
                restored
            })
            .collect();
        Ok(timestamps)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn now() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    #[tokio::test]
    async fn round_trip_preserves_retained_events() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;

        let events = vec![
            now() - Duration::hours(3),
            now() - Duration::seconds(30),
            now(),
        ];
        storage.save(&events, now()).await?;

        let restored = storage.load().await?;
        assert_eq!(restored, events);
        Ok(())
    }

    #[tokio::test]
    async fn save_applies_retention_horizon() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;

        // One event per day for 8 days. The oldest sits strictly beyond the
        // horizon; the event exactly at the horizon is still retained.
        let events = (1..=8)
            .rev()
            .map(|day| now() - Duration::days(day))
            .collect::<Vec<_>>();
        storage.save(&events, now()).await?;

        let restored = storage.load().await?;
        assert_eq!(restored.len(), 7);
        assert_eq!(restored[0], now() - Duration::days(7));
        assert_eq!(*restored.last().unwrap(), now() - Duration::days(1));
        Ok(())
    }

    #[tokio::test]
    async fn missing_snapshot_is_empty_history() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;
        assert!(storage.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_empty_history() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;
        std::fs::write(dir.path().join(SNAPSHOT_FILE), b"{not json")?;
        assert!(storage.load().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;

        storage.save(&[now() - Duration::hours(1)], now()).await?;
        let replacement = vec![now() - Duration::minutes(5), now()];
        storage.save(&replacement, now()).await?;

        assert_eq!(storage.load().await?, replacement);
        Ok(())
    }

    #[tokio::test]
    async fn sub_second_precision_survives_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;

        let moment = now() + Duration::milliseconds(457);
        storage.save(&[moment], now()).await?;

        let restored = storage.load().await?;
        assert_eq!(restored, vec![moment]);
        Ok(())
    }
}
