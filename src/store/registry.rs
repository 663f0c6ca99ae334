// ── Versioned controller registry ──
//
// Single-writer, lock-free-reader storage for live controllers. The whole
// map is swapped atomically per batch edit, so readers always observe a
// fully-committed generation and never a partially-applied one. Every commit
// bumps the sequence number and broadcasts one coalesced change-set.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::error::WatchError;
use crate::stream::{Change, ChangeReason, ChangeSet};

/// One committed generation of the registry: the map plus the sequence
/// number of the commit that produced it.
pub(crate) struct RegistrySnapshot {
    pub(crate) seq: u64,
    pub(crate) controllers: HashMap<String, Arc<Controller>>,
}

pub(crate) struct ControllerRegistry {
    state: ArcSwap<RegistrySnapshot>,
    updates_tx: broadcast::Sender<Arc<ChangeSet>>,
    passes: watch::Sender<u64>,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    disposed: AtomicBool,
}

impl ControllerRegistry {
    pub(crate) fn new(update_capacity: usize) -> Self {
        let (updates_tx, _) = broadcast::channel(update_capacity);
        let (passes, _) = watch::channel(0u64);
        let (last_refresh, _) = watch::channel(None);

        Self {
            state: ArcSwap::from_pointee(RegistrySnapshot {
                seq: 0,
                controllers: HashMap::new(),
            }),
            updates_tx,
            passes,
            last_refresh,
            disposed: AtomicBool::new(false),
        }
    }

    fn guard(&self) -> Result<(), WatchError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(WatchError::Disposed);
        }
        Ok(())
    }

    /// Current generation without the disposed guard — loop internal.
    pub(crate) fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.state.load_full()
    }

    // ── Batch commit (single writer: the reconciliation loop) ────────

    /// Apply one atomic batch edit and broadcast the coalesced change-set.
    ///
    /// Changes are applied in order: removes drop their key, adds and
    /// updates upsert their controller.
    pub(crate) fn commit(&self, changes: Vec<Change>) -> Arc<ChangeSet> {
        let current = self.state.load();
        let mut controllers = current.controllers.clone();

        for change in &changes {
            match change.reason {
                ChangeReason::Remove => {
                    controllers.remove(&change.path);
                }
                ChangeReason::Add | ChangeReason::Update => {
                    controllers.insert(change.path.clone(), Arc::clone(&change.controller));
                }
            }
        }

        let seq = current.seq + 1;
        self.state
            .store(Arc::new(RegistrySnapshot { seq, controllers }));

        let set = Arc::new(ChangeSet { seq, changes });
        let _ = self.updates_tx.send(Arc::clone(&set));
        set
    }

    /// Record a completed pass attempt (success or failure).
    pub(crate) fn mark_pass(&self) {
        self.passes.send_modify(|p| *p += 1);
    }

    /// Record the time of the last successful reconciliation.
    pub(crate) fn mark_refreshed(&self) {
        let _ = self.last_refresh.send(Some(Utc::now()));
    }

    // ── Snapshot queries ─────────────────────────────────────────────

    pub(crate) fn count(&self) -> Result<usize, WatchError> {
        self.guard()?;
        Ok(self.state.load().controllers.len())
    }

    pub(crate) fn enumerate(&self) -> Result<Vec<Arc<Controller>>, WatchError> {
        self.guard()?;
        let snap = self.state.load();
        let mut all: Vec<Arc<Controller>> = snap.controllers.values().map(Arc::clone).collect();
        all.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(all)
    }

    pub(crate) fn get(&self, path: &str) -> Result<Option<Arc<Controller>>, WatchError> {
        self.guard()?;
        Ok(self.state.load().controllers.get(path).map(Arc::clone))
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to change-sets. Returns the generation current at
    /// subscription time plus a live receiver; the receiver was opened
    /// before the generation was read, so the caller drops any change-set
    /// with `seq <= snapshot.seq` to avoid double-delivery.
    #[allow(clippy::type_complexity)]
    pub(crate) fn subscribe(
        &self,
    ) -> Result<(Arc<RegistrySnapshot>, broadcast::Receiver<Arc<ChangeSet>>), WatchError> {
        self.guard()?;
        let rx = self.updates_tx.subscribe();
        let snap = self.state.load_full();
        Ok((snap, rx))
    }

    pub(crate) fn subscribe_passes(&self) -> watch::Receiver<u64> {
        self.passes.subscribe()
    }

    pub(crate) fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Swap-and-clear the map, then dispose every controller that was still
    /// registered: no-op if empty, single await if one, concurrent await-all
    /// if several. Subsequent queries fail with `Disposed`.
    pub(crate) async fn teardown(&self) {
        self.disposed.store(true, Ordering::Release);
        let old = self.state.swap(Arc::new(RegistrySnapshot {
            seq: self.state.load().seq,
            controllers: HashMap::new(),
        }));

        match old.controllers.len() {
            0 => {}
            1 => {
                if let Some(ctrl) = old.controllers.values().next() {
                    if let Err(e) = ctrl.dispose().await {
                        warn!(path = %ctrl.path(), error = %e, "disposal failed during teardown (non-fatal)");
                    }
                }
            }
            n => {
                debug!(count = n, "disposing remaining controllers");
                let results = join_all(old.controllers.values().map(|c| c.dispose())).await;
                for (ctrl, result) in old.controllers.values().zip(results) {
                    if let Err(e) = result {
                        warn!(path = %ctrl.path(), error = %e, "disposal failed during teardown (non-fatal)");
                    }
                }
            }
        }
    }
}
