use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Result;

/// Process-wide stop signal.
///
/// Clones share one flag. Waiters block on a condvar instead of sleeping,
/// so a trigger wakes the startup retry loop and the helm timer at once.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks up to `timeout`. Returns true if shutdown was triggered.
    /// A timeout past the representable horizon waits for the trigger alone.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let (flag, cvar) = &*self.inner;
        let mut triggered = flag.lock().unwrap_or_else(PoisonError::into_inner);

        while !*triggered {
            triggered = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    cvar.wait_timeout(triggered, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => cvar.wait(triggered).unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Triggers this token on SIGINT or SIGTERM (Ctrl+C only off unix).
    ///
    /// Handlers are installed before returning; the wait runs on a detached
    /// `helm-signals` thread with its own single-threaded runtime.
    pub fn trigger_on_signals(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let signals = {
            let _context = runtime.enter();
            Signals::install()?
        };

        let shutdown = self.clone();
        thread::Builder::new().name("helm-signals".into()).spawn(move || {
            runtime.block_on(signals.recv());
            shutdown.trigger();
        })?;
        Ok(())
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("shutdown signal received (SIGINT/Ctrl+C)"),
            _ = self.terminate.recv() => info!("shutdown signal received (SIGTERM)"),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received (Ctrl+C)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out_when_not_triggered() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(!shutdown.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();

        let waiter = thread::spawn(move || remote.wait_timeout(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(10));
        shutdown.trigger();

        assert!(waiter.join().unwrap());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_unbounded_wait_still_wakes() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();

        let waiter = thread::spawn(move || remote.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(10));
        shutdown.trigger();

        assert!(waiter.join().unwrap());
    }
}
