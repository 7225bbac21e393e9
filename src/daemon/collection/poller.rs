use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    daemon::stats::engine::StatsHandle, input_api::KeystrokeSource, utils::clock::Clock,
};

/// Bridges the platform key source and the stats engine: polls the source at
/// a fixed short interval and forwards one `record_keystroke` per detected
/// press. The interval bounds detection latency, it is a tunable and not a
/// contract.
pub struct KeystrokePollModule {
    stats: StatsHandle,
    source: Box<dyn KeystrokeSource>,
    shutdown: CancellationToken,
    poll_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl KeystrokePollModule {
    pub fn new(
        stats: StatsHandle,
        source: Box<dyn KeystrokeSource>,
        shutdown: CancellationToken,
        poll_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            stats,
            source,
            shutdown,
            poll_frequency,
            time_provider,
        }
    }

    /// Executes the poller event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.poll_frequency;

            match self.source.poll_keys() {
                Ok(new_presses) => {
                    if new_presses > 0 {
                        debug!("Detected {new_presses} key presses");
                    }
                    for _ in 0..new_presses {
                        self.stats
                            .record_keystroke()
                            .await
                            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    }
                }
                Err(e) => {
                    error!("Encountered an error during polling {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the stats handle and consequently let the engine finish its teardown.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}
