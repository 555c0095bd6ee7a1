use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tracing::{info, warn};

/// One-shot shutdown latch shared between the signal watcher and the
/// supervisor. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, condvar) = &*self.inner;
        match lock.lock() {
            Ok(mut triggered) => *triggered = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        condvar.notify_all();
    }

    #[cfg(test)]
    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(triggered) => *triggered,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Blocks until `trigger` has been called.
    pub fn wait(&self) {
        let (lock, condvar) = &*self.inner;
        let mut triggered = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*triggered {
            triggered = match condvar.wait(triggered) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Spawns a thread that triggers `shutdown` on the first SIGINT or SIGTERM.
pub fn watch_termination_signals(shutdown: ShutdownSignal) -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::Builder::new()
        .name("xspot-signals".to_string())
        .spawn(move || match signals.forever().next() {
            Some(signal) => {
                info!(signal, "termination signal received");
                shutdown.trigger();
            }
            None => warn!("signal watcher closed without a signal"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wait_returns_after_trigger_from_another_thread() {
        let shutdown = ShutdownSignal::new();
        let remote = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });
        shutdown.wait();
        assert!(shutdown.is_triggered());
        handle.join().unwrap();
    }

    #[test]
    fn wait_after_trigger_does_not_block() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        shutdown.trigger();
        shutdown.wait();
        assert!(shutdown.is_triggered());
    }
}
