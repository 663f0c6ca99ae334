// ── Change-sets and public streams ──
//
// `ChangeSet` is the atomic batch delivered to `updates()` subscribers in
// exact commit order. `ControlStream` flattens every registered controller's
// control-change channel into one merged stream, following the registry:
// controllers are subscribed on Add/Update and dropped on Remove, so a
// removed controller's late changes are excluded.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{StreamExt as _, StreamMap};
use tracing::warn;

use crate::controller::{ControlChange, Controller};
use crate::error::WatchError;
use crate::store::{ControllerRegistry, RegistrySnapshot};

/// Why an entry appears in a change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize)]
pub enum ChangeReason {
    Add,
    Update,
    Remove,
}

/// One entry of a change-set. For `Remove` the controller is the instance
/// that was just unregistered (and is about to be disposed).
#[derive(Debug, Clone)]
pub struct Change {
    pub path: String,
    pub reason: ChangeReason,
    pub controller: Arc<Controller>,
}

/// An atomic, ordered batch of add/update/remove entries. Subscribers never
/// observe a partially-applied edit.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Registry commit sequence that produced this set.
    pub seq: u64,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

// ── updates() ───────────────────────────────────────────────────────

/// Multicast stream of change-sets. A new subscriber first receives the
/// current registry state as one synthetic Add set (omitted when empty),
/// then live change-sets in commit order.
///
/// A subscriber that falls behind the channel capacity gets resynchronized:
/// the dropped change-sets are skipped and the current registry state is
/// re-delivered as one synthetic Add set. Removals that happened during the
/// gap are not replayed, so mirrors should drop entries absent from a
/// post-lag snapshot.
pub struct UpdateStream {
    inner: Pin<Box<dyn Stream<Item = Arc<ChangeSet>> + Send>>,
}

impl Stream for UpdateStream {
    type Item = Arc<ChangeSet>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// The full state of a generation rendered as one sorted synthetic Add set,
/// `None` when empty.
fn synthetic_adds(snap: &RegistrySnapshot) -> Option<Arc<ChangeSet>> {
    if snap.controllers.is_empty() {
        return None;
    }
    let mut changes: Vec<Change> = snap
        .controllers
        .iter()
        .map(|(path, ctrl)| Change {
            path: path.clone(),
            reason: ChangeReason::Add,
            controller: Arc::clone(ctrl),
        })
        .collect();
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Some(Arc::new(ChangeSet {
        seq: snap.seq,
        changes,
    }))
}

pub(crate) fn update_stream(
    registry: &Arc<ControllerRegistry>,
) -> Result<UpdateStream, WatchError> {
    let (snap, mut rx) = registry.subscribe()?;
    let registry = Arc::clone(registry);

    let inner = async_stream::stream! {
        // The receiver was opened before the snapshot was read, so anything
        // at or below the snapshot sequence is already reflected in it.
        let mut floor = snap.seq;
        if let Some(set) = synthetic_adds(&snap) {
            yield set;
        }
        drop(snap);

        loop {
            match rx.recv().await {
                Ok(set) if set.seq > floor => {
                    floor = set.seq;
                    yield set;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // Missed commits may include removals; resync from the
                    // current generation instead of replaying a gap.
                    warn!(skipped, "update subscriber lagged, resyncing from current state");
                    let snap = registry.snapshot();
                    floor = snap.seq;
                    if let Some(set) = synthetic_adds(&snap) {
                        yield set;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(UpdateStream {
        inner: Box::pin(inner),
    })
}

// ── changes() ───────────────────────────────────────────────────────

/// Merged per-control change stream across all registered controllers,
/// yielding `(device path, change)` pairs.
pub struct ControlStream {
    inner: Pin<Box<dyn Stream<Item = (String, ControlChange)> + Send>>,
}

impl Stream for ControlStream {
    type Item = (String, ControlChange);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

enum Step {
    Emit(String, ControlChange),
    Continue,
    Done,
}

type MergedControls = StreamMap<String, BroadcastStream<ControlChange>>;

fn apply_to_merged(merged: &mut MergedControls, set: &ChangeSet) {
    for change in &set.changes {
        match change.reason {
            ChangeReason::Remove => {
                merged.remove(&change.path);
            }
            ChangeReason::Add | ChangeReason::Update => {
                merged.insert(
                    change.path.clone(),
                    BroadcastStream::new(change.controller.controls()),
                );
            }
        }
    }
}

fn rebuild_merged(merged: &mut MergedControls, registry: &ControllerRegistry) -> u64 {
    merged.clear();
    let snap = registry.snapshot();
    for (path, ctrl) in &snap.controllers {
        merged.insert(path.clone(), BroadcastStream::new(ctrl.controls()));
    }
    snap.seq
}

pub(crate) fn control_stream(
    registry: &Arc<ControllerRegistry>,
) -> Result<ControlStream, WatchError> {
    let (snap, mut rx) = registry.subscribe()?;
    let registry = Arc::clone(registry);

    let inner = async_stream::stream! {
        let mut merged: MergedControls = StreamMap::new();
        for (path, ctrl) in &snap.controllers {
            merged.insert(path.clone(), BroadcastStream::new(ctrl.controls()));
        }
        let mut seen = snap.seq;
        drop(snap);

        loop {
            // Registry updates are handled before pending control values, so
            // a Remove always wins over a late change queued behind it.
            let step = tokio::select! {
                biased;
                update = rx.recv() => match update {
                    Ok(set) => {
                        if set.seq > seen {
                            seen = set.seq;
                            apply_to_merged(&mut merged, &set);
                        }
                        Step::Continue
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed change-sets may include removals; resync the
                        // merged set from the current registry generation.
                        warn!(skipped, "control merge lagged behind registry, resyncing");
                        seen = rebuild_merged(&mut merged, &registry);
                        Step::Continue
                    }
                    Err(RecvError::Closed) => Step::Done,
                },
                next = merged.next(), if !merged.is_empty() => match next {
                    Some((path, Ok(change))) => Step::Emit(path, change),
                    Some((path, Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                        warn!(%path, skipped, "control subscriber lagged, changes dropped");
                        Step::Continue
                    }
                    None => Step::Continue,
                },
            };

            match step {
                Step::Emit(path, change) => yield (path, change),
                Step::Continue => {}
                Step::Done => break,
            }
        }
    };

    Ok(ControlStream {
        inner: Box::pin(inner),
    })
}
