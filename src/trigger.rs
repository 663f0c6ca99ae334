// ── Coalescing wake primitive ──
//
// Single-slot boolean wake signal for the reconciliation loop. Any number of
// concurrent `signal()` calls before the next consumption collapse into one
// wake; the slot starts signaled so the first pass runs immediately.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub(crate) struct Trigger {
    pending: AtomicBool,
    notify: Notify,
}

impl Trigger {
    /// Pre-signaled: the first `wait()` returns without suspending.
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    /// Request a wake. Idempotent; safe from any thread.
    pub(crate) fn signal(&self) {
        self.pending.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Suspend until signaled or cancelled. Returns `false` on cancellation.
    pub(crate) async fn wait(&self, cancel: &CancellationToken) -> bool {
        loop {
            if self.pending.swap(false, Ordering::AcqRel) {
                return true;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = self.notify.notified() => {}
            }
        }
    }
}
