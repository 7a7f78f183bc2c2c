//! Cooperative stop signal
//!
//! The relay runs one blocking ingestion thread next to several tokio tasks,
//! so the stop token has to be observable from both worlds: a blocking
//! thread waits on a condvar, async tasks wait on a `Notify`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

struct Inner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
    notify: Notify,
}

/// Owner side of the stop signal
pub struct Shutdown {
    inner: Arc<Inner>,
}

/// Observer side of the stop signal, cheap to clone
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl Shutdown {
    /// Create a new, not yet triggered, shutdown
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                lock: Mutex::new(()),
                cvar: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Get an observer for this shutdown
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Request stop. Idempotent.
    pub fn trigger(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Take the lock so a thread between its flag check and its wait
        // cannot miss the notification.
        let _guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.cvar.notify_all();
        self.inner.notify.notify_waiters();
    }

    /// Check if stop was requested
    pub fn is_triggered(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    /// Check if stop was requested
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Block the current thread for up to `timeout`.
    ///
    /// Returns `true` if stop was requested before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_stopped() {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }

        let (_guard, _) = self
            .inner
            .cvar
            .wait_timeout_while(guard, timeout, |_| !self.is_stopped())
            .unwrap_or_else(|e| e.into_inner());

        self.is_stopped()
    }

    /// Resolve once stop is requested
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}
