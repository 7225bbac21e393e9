use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use collection::poller::KeystrokePollModule;
use stats::{
    counts::WindowCounts,
    engine::{command_channel, StatsCommand, StatsEngine, StatsHandle},
};
use storage::snapshot::SnapshotStorageImpl;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{
    input_api::{self, GenericKeystrokeSource, KeystrokeMonitor, KeystrokeSource},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod shutdown;
pub mod stats;
pub mod storage;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let (handle, receiver) = command_channel(64);

    let shutdown_token = CancellationToken::new();

    let mut monitor = KeystrokeMonitor::new();
    if let Err(e) = monitor.start(input_api::is_permission_granted(), GenericKeystrokeSource::new)
    {
        // The daemon still runs, serving persisted counts; the gating for
        // granting the permission lives in the surrounding tooling.
        warn!("Keystroke monitoring is inactive: {e:?}");
    }

    let poller = create_poller(handle, monitor, &shutdown_token, DefaultClock);

    let (engine, _counts) = create_engine(dir, receiver, &shutdown_token, DefaultClock)?;

    let (_, poll_result, engine_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        poller.run(),
        engine.run(),
    );

    if let Err(poll_result) = poll_result {
        error!("Polling module got an error {:?}", poll_result);
    }

    if let Err(engine_result) = engine_result {
        error!("Stats engine got an error {:?}", engine_result);
    }

    Ok(())
}

fn create_poller(
    stats: StatsHandle,
    source: impl KeystrokeSource + 'static,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> KeystrokePollModule {
    KeystrokePollModule::new(
        stats,
        Box::new(source),
        shutdown_token.clone(),
        DEFAULT_POLL_INTERVAL,
        Box::new(clock),
    )
}

fn create_engine(
    snapshot_dir: PathBuf,
    receiver: mpsc::Receiver<StatsCommand>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> Result<(StatsEngine<SnapshotStorageImpl>, watch::Receiver<WindowCounts>), anyhow::Error> {
    let storage = SnapshotStorageImpl::new(snapshot_dir)?;
    Ok(StatsEngine::new(
        receiver,
        storage,
        shutdown_token.clone(),
        DEFAULT_TICK_INTERVAL,
        Box::new(clock),
    ))
}
