//! Contains logic for observing key presses in different environments.
//! [GenericKeystrokeSource] abstracts the platform hook, and
//! [KeystrokeMonitor] is the explicit start/stop state machine around it.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::{bail, Result};

/// Intended to serve as a contract platform hooks must implement. A source
/// is polled: each call reports how many qualifying key presses happened
/// since the previous call. Pure modifier presses don't qualify.
#[cfg_attr(test, mockall::automock)]
pub trait KeystrokeSource: Send {
    fn poll_keys(&mut self) -> Result<usize>;
}

/// Serves as a cross-compatible [KeystrokeSource] implementation.
pub struct GenericKeystrokeSource {
    inner: Box<dyn KeystrokeSource>,
}

impl GenericKeystrokeSource {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsKeystrokeSource;
                Ok(Self {
                    inner: Box::new(WindowsKeystrokeSource::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxKeystrokeSource;
                Ok(Self {
                    inner: Box::new(LinuxKeystrokeSource::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No keystroke source was specified")
            }
        }
    }
}

impl KeystrokeSource for GenericKeystrokeSource {
    fn poll_keys(&mut self) -> Result<usize> {
        self.inner.poll_keys()
    }
}

/// Whether the OS will let us observe global key presses. On X11 this means
/// a reachable display; Windows has no gate for keyboard state queries.
pub fn is_permission_granted() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(feature = "win")] {
            true
        }
        else if #[cfg(feature = "x11")] {
            x11::can_connect()
        }
        else {
            false
        }
    }
}

/// Explicit lifecycle of the input hook. The only way out of `Stopped` is
/// [KeystrokeMonitor::start], which is gated by the permission check; a
/// permission becoming available later does not resume a stopped monitor on
/// its own. Stopping drops the source, releasing the underlying OS handle.
pub enum KeystrokeMonitor<S: KeystrokeSource> {
    Stopped,
    Monitoring(S),
}

impl<S: KeystrokeSource> KeystrokeMonitor<S> {
    pub fn new() -> Self {
        Self::Stopped
    }

    /// Transitions Stopped -> Monitoring. A no-op when already monitoring.
    pub fn start(
        &mut self,
        permission_granted: bool,
        source: impl FnOnce() -> Result<S>,
    ) -> Result<()> {
        if let Self::Monitoring(_) = self {
            return Ok(());
        }
        if !permission_granted {
            bail!("Input monitoring permission is not granted");
        }
        *self = Self::Monitoring(source()?);
        Ok(())
    }

    pub fn stop(&mut self) {
        *self = Self::Stopped;
    }

    pub fn is_monitoring(&self) -> bool {
        matches!(self, Self::Monitoring(_))
    }
}

impl<S: KeystrokeSource> Default for KeystrokeMonitor<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A stopped monitor observes nothing, so the poller can treat the monitor
/// itself as a source.
impl<S: KeystrokeSource> KeystrokeSource for KeystrokeMonitor<S> {
    fn poll_keys(&mut self) -> Result<usize> {
        match self {
            Self::Stopped => Ok(0),
            Self::Monitoring(source) => source.poll_keys(),
        }
    }
}
