//! Resetting the strip when the process is asked to terminate.
//!
//! A killed process leaves the DMA engine and the PWM running, and the
//! strip showing its last frame. The hook resets the strip first.

use std::os::raw::c_int;
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use snafu::ResultExt;

use crate::errors::{HookInstallSnafu, Result};
use crate::strip::Ws281x;

/// A strip that can be reached from the termination hook.
pub type SharedStrip = Arc<Mutex<Ws281x>>;

/// The signals [`install`] reacts to.
pub const TERMINATION_SIGNALS: &[c_int] = &[SIGINT, SIGTERM, SIGHUP];

/// An installed termination hook.
///
/// Dropping it, or calling [`uninstall`](TerminationHook::uninstall),
/// stops the hook thread. The signals stay registered with `signal-hook`
/// and are ignored from then on; the default disposition is not restored.
#[derive(Debug)]
pub struct TerminationHook {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl TerminationHook {
    /// Stops listening for the signals.
    pub fn uninstall(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Termination hook thread panicked.");
            }
        }
    }
}

impl Drop for TerminationHook {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resets `strip` and exits the process with status 0 on
/// SIGINT, SIGTERM or SIGHUP.
pub fn install(strip: SharedStrip) -> Result<TerminationHook> {
    install_with(strip, TERMINATION_SIGNALS, |_| process::exit(0))
}

/// Resets `strip` on any of `signals`, then calls `then` with the signal.
///
/// The strip stays locked while `then` runs, so nothing can use it between
/// the reset and a process exit.
pub fn install_with<F>(strip: SharedStrip, signals: &[c_int], mut then: F) -> Result<TerminationHook>
where
    F: FnMut(c_int) + Send + 'static,
{
    let mut signals = Signals::new(signals).context(HookInstallSnafu)?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("ws281x-teardown".into())
        .spawn(move || {
            for signal in signals.forever() {
                log::info!("Received signal {}, resetting strip.", signal);

                let mut guard = strip.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = guard.reset() {
                    log::error!("Unable to reset strip: {}", e);
                }

                then(signal);
                drop(guard);
            }
        })
        .context(HookInstallSnafu)?;

    Ok(TerminationHook {
        handle,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use signal_hook::consts::{SIGUSR1, SIGUSR2};

    use super::*;
    use crate::{Backend, SimulatedBus, StripConfig};

    #[test]
    fn signal_resets_strip() {
        let bus = SimulatedBus::new();
        let strip = Arc::new(Mutex::new(Ws281x::new(Backend::Simulated(bus.clone()))));
        strip
            .lock()
            .unwrap()
            .init(StripConfig::builder(4).build().unwrap())
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let hook = install_with(Arc::clone(&strip), &[SIGUSR1], move |signal| {
            let _ = tx.send(signal);
        })
        .unwrap();

        signal_hook::low_level::raise(SIGUSR1).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), SIGUSR1);
        assert!(!strip.lock().unwrap().is_initialized());

        hook.uninstall();
    }

    #[test]
    fn strip_stays_locked_until_exit() {
        let strip = Arc::new(Mutex::new(Ws281x::new(Backend::simulated())));
        strip
            .lock()
            .unwrap()
            .init(StripConfig::builder(4).build().unwrap())
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let watched = Arc::clone(&strip);
        let hook = install_with(Arc::clone(&strip), &[SIGUSR2], move |_| {
            let _ = tx.send(watched.try_lock().is_err());
        })
        .unwrap();

        signal_hook::low_level::raise(SIGUSR2).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(!strip.lock().unwrap().is_initialized());

        hook.uninstall();
    }
}
