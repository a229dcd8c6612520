//! Per-key debouncing.
//!
//! Each key gets at most one pending timer. Scheduling again before it
//! fires cancels the old timer and starts a fresh one, so only the last
//! action in a burst ever runs. Once a timer has fired its action is no
//! longer cancellable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Default)]
struct Pending {
    next_id: u64,
    timers: HashMap<String, (u64, JoinHandle<()>)>,
}

pub(crate) struct Debouncer {
    window: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Runs `action` after the window unless `key` is scheduled again first.
    pub fn schedule<F>(&self, key: String, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        pending.next_id += 1;
        let id = pending.next_id;

        if let Some((_, previous)) = pending.timers.remove(&key) {
            trace!("Superseding pending timer for {}", key);
            previous.abort();
        }

        let shared = Arc::clone(&self.pending);
        let timer_key = key.clone();
        let window = self.window;

        // The lock is held until the handle is stored, so the timer
        // always finds its own entry when it fires.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            {
                let mut pending = lock(&shared);
                match pending.timers.get(&timer_key) {
                    Some((current, _)) if *current == id => {
                        pending.timers.remove(&timer_key);
                    }
                    _ => return,
                }
            }
            action.await;
        });

        pending.timers.insert(key, (id, handle));
    }

    /// Cancels every timer that has not fired yet. Returns how many.
    pub fn cancel_all(&self) -> usize {
        let mut pending = lock(&self.pending);
        let count = pending.timers.len();
        for (_, (_, handle)) in pending.timers.drain() {
            handle.abort();
        }
        count
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        lock(&self.pending).timers.len()
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
