//! Cancellable fixed-interval scheduler for background flushes.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs a task on a background thread once per interval until cancelled.
///
/// Cancellation is prompt: [`cancel`](Self::cancel) wakes the thread through
/// a condvar instead of waiting out the current interval, then joins it. A
/// tick that is already running is allowed to finish first.
pub struct Ticker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Ticker {
    /// Spawns the ticker thread. `task` runs once per `interval`.
    pub fn spawn<F>(interval: Duration, task: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("cairn-flush".into())
            .spawn(move || run(&thread_shared, interval, task))
            .expect("failed to spawn flush ticker thread");
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Cancels the ticker and waits for the thread to exit.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        {
            let mut cancelled = lock_flag(&self.shared.cancelled);
            *cancelled = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F: Fn()>(shared: &Shared, interval: Duration, task: F) {
    let mut cancelled = lock_flag(&shared.cancelled);
    loop {
        // Checked before every wait so a cancel that lands before the
        // thread first parks is not lost.
        if *cancelled {
            return;
        }
        let (guard, timeout) = shared
            .wake
            .wait_timeout(cancelled, interval)
            .unwrap_or_else(|err| err.into_inner());
        cancelled = guard;
        if timeout.timed_out() && !*cancelled {
            // Run the tick without holding the flag so cancel stays prompt.
            drop(cancelled);
            task();
            cancelled = lock_flag(&shared.cancelled);
        }
    }
}

fn lock_flag(flag: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|err| err.into_inner())
}
