use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{daemon::storage::snapshot::SnapshotStorage, utils::clock::Clock};

use super::{counts::WindowCounts, log::KeystrokeLog, retention_horizon};

/// Mutations accepted by the engine. Everything else is a read of the
/// published [WindowCounts].
#[derive(Debug)]
pub enum StatsCommand {
    /// A qualifying key press happened. The timestamp is stamped by the
    /// engine on receipt, so producers don't need a clock.
    Keystroke,
    Clear,
}

/// The outward facade of the statistics core. Cheap to clone; every
/// mutation funnels through the engine's command channel.
#[derive(Clone)]
pub struct StatsHandle {
    sender: mpsc::Sender<StatsCommand>,
}

impl StatsHandle {
    pub async fn record_keystroke(&self) -> Result<()> {
        self.send(StatsCommand::Keystroke).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.send(StatsCommand::Clear).await
    }

    async fn send(&self, command: StatsCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|e| anyhow!("Stats engine is gone, couldn't deliver {:?}", e.0))
    }
}

pub fn command_channel(capacity: usize) -> (StatsHandle, mpsc::Receiver<StatsCommand>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (StatsHandle { sender }, receiver)
}

enum Wake {
    Command(Option<StatsCommand>),
    Tick,
    Shutdown,
}

/// Owns the [KeystrokeLog] and is its only reader and writer. Key presses
/// and the periodic tick both arrive here, so `append`, prune and save never
/// interleave. Consumers observe the log exclusively through the watch
/// channel, which republishes after every mutation and every tick.
pub struct StatsEngine<S: SnapshotStorage> {
    receiver: mpsc::Receiver<StatsCommand>,
    storage: S,
    log: KeystrokeLog,
    published: watch::Sender<WindowCounts>,
    shutdown: CancellationToken,
    tick_interval: Duration,
    time_provider: Box<dyn Clock>,
    /// Set when the log changed since the last successful save.
    dirty: bool,
}

impl<S: SnapshotStorage> StatsEngine<S> {
    pub fn new(
        receiver: mpsc::Receiver<StatsCommand>,
        storage: S,
        shutdown: CancellationToken,
        tick_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> (Self, watch::Receiver<WindowCounts>) {
        let (published, counts) = watch::channel(WindowCounts::default());
        (
            Self {
                receiver,
                storage,
                log: KeystrokeLog::new(),
                published,
                shutdown,
                tick_interval,
                time_provider,
                dirty: false,
            },
            counts,
        )
    }

    /// Executes the engine event loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        self.restore().await;
        self.publish();

        let mut tick_point = self.time_provider.instant() + self.tick_interval;
        loop {
            let wake = tokio::select! {
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                command = self.receiver.recv() => Wake::Command(command),
                _ = self.time_provider.sleep_until(tick_point) => Wake::Tick,
            };

            match wake {
                Wake::Command(Some(command)) => {
                    self.handle(command);
                    self.publish();
                }
                // All producers dropped their handles, nothing more will
                // arrive. Same teardown as an explicit shutdown.
                Wake::Command(None) | Wake::Shutdown => {
                    self.tick().await;
                    return Ok(());
                }
                Wake::Tick => {
                    tick_point += self.tick_interval;
                    self.tick().await;
                }
            }
        }
    }

    async fn restore(&mut self) {
        match self.storage.load().await {
            Ok(timestamps) => {
                info!("Restored {} persisted keystrokes", timestamps.len());
                self.log = KeystrokeLog::from_timestamps(timestamps);
            }
            Err(e) => {
                // The in-memory log is authoritative; an unreadable snapshot
                // only costs history.
                warn!("Failed to restore keystroke history, starting empty: {e:?}");
                self.log = KeystrokeLog::new();
            }
        }
    }

    fn handle(&mut self, command: StatsCommand) {
        match command {
            StatsCommand::Keystroke => {
                let moment = self.time_provider.time();
                debug!("Recording keystroke at {moment}");
                self.log.append(moment);
                self.dirty = true;
            }
            StatsCommand::Clear => {
                info!("Clearing {} recorded keystrokes", self.log.total());
                self.log.clear();
                self.dirty = true;
            }
        }
    }

    /// One housekeeping pass: prune expired events, republish the counts and
    /// flush the log if it changed. Persistence is best-effort; a failed save
    /// keeps the dirty flag so the next tick retries.
    async fn tick(&mut self) {
        let now = self.time_provider.time();
        if self.log.prune_older_than(retention_horizon(), now) > 0 {
            self.dirty = true;
        }
        self.publish();

        if !self.dirty {
            return;
        }
        match self.storage.save(self.log.timestamps(), now).await {
            Ok(()) => {
                debug!("Persisted {} keystrokes", self.log.total());
                self.dirty = false;
            }
            Err(e) => {
                warn!("Failed to persist keystrokes, will retry next tick: {e:?}");
            }
        }
    }

    fn publish(&self) {
        self.published
            .send_replace(WindowCounts::compute(&self.log, self.time_provider.time()));
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::time::Instant;

    use crate::{
        daemon::storage::snapshot::{SnapshotStorage, SnapshotStorageImpl},
        utils::logging::TEST_LOGGING,
    };

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    const TEST_TICK: Duration = Duration::from_millis(50);

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc.from_utc_datetime(&TEST_START_DATE),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    #[tokio::test]
    async fn keystrokes_are_published_and_persisted() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;
        let (handle, receiver) = command_channel(16);
        let shutdown = CancellationToken::new();
        let (engine, counts) = StatsEngine::new(
            receiver,
            storage,
            shutdown.clone(),
            TEST_TICK,
            Box::new(TestClock::new()),
        );

        let (_, engine_result) = tokio::join!(
            async {
                for _ in 0..3 {
                    handle.record_keystroke().await.unwrap();
                }
                tokio::time::sleep(TEST_TICK * 3).await;
                shutdown.cancel();
            },
            engine.run(),
        );
        engine_result?;

        let published = *counts.borrow();
        assert_eq!(published.total, 3);
        assert_eq!(published.last_minute, 3);

        let restored = SnapshotStorageImpl::new(dir.path().to_owned())?.load().await?;
        assert_eq!(restored.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn clear_zeroes_counts_and_snapshot() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;
        let (handle, receiver) = command_channel(16);
        let shutdown = CancellationToken::new();
        let (engine, counts) = StatsEngine::new(
            receiver,
            storage,
            shutdown.clone(),
            TEST_TICK,
            Box::new(TestClock::new()),
        );

        let (_, engine_result) = tokio::join!(
            async {
                handle.record_keystroke().await.unwrap();
                handle.record_keystroke().await.unwrap();
                tokio::time::sleep(TEST_TICK * 2).await;
                handle.clear().await.unwrap();
                tokio::time::sleep(TEST_TICK * 2).await;
                shutdown.cancel();
            },
            engine.run(),
        );
        engine_result?;

        assert_eq!(*counts.borrow(), WindowCounts::default());

        let restored = SnapshotStorageImpl::new(dir.path().to_owned())?.load().await?;
        assert!(restored.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn restart_restores_history_and_prunes_expired_events() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = TestClock::new();
        let now = clock.time();

        // Snapshot written by a previous run: one event is already beyond
        // the retention horizon at restore time. The save-side filter is
        // bypassed by backdating "now", so the engine's own prune has to
        // drop it.
        let storage = SnapshotStorageImpl::new(dir.path().to_owned())?;
        storage
            .save(
                &[
                    now - ChronoDuration::days(8),
                    now - ChronoDuration::hours(1),
                    now - ChronoDuration::seconds(5),
                ],
                now - ChronoDuration::days(1),
            )
            .await?;

        let (handle, receiver) = command_channel(16);
        let shutdown = CancellationToken::new();
        let (engine, counts) =
            StatsEngine::new(receiver, storage, shutdown.clone(), TEST_TICK, Box::new(clock));

        let (_, engine_result) = tokio::join!(
            async {
                tokio::time::sleep(TEST_TICK * 3).await;
                shutdown.cancel();
            },
            engine.run(),
        );
        engine_result?;
        drop(handle);

        let published = *counts.borrow();
        assert_eq!(published.total, 2);
        assert_eq!(published.last_day, 2);
        assert_eq!(published.last_minute, 1);
        Ok(())
    }
}
