// ── Device watcher facade and reconciliation loop ──
//
// Full lifecycle management for the discovery engine: `spawn()` starts one
// background task running the reconciliation loop plus a hot-plug forwarder,
// `teardown()` cancels both and disposes the registry. Consumers subscribe
// to streams or query snapshots concurrently; all registry writes happen on
// the loop task through atomic batch commits.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{DeviceBackend, DescriptorParser};
use crate::config::WatcherConfig;
use crate::controller::Controller;
use crate::error::WatchError;
use crate::hid;
use crate::report::{Report, ReportKind, Severity};
use crate::store::ControllerRegistry;
use crate::stream::{Change, ChangeReason, ControlStream, UpdateStream, control_stream, update_stream};
use crate::trigger::Trigger;

// ── DeviceWatcher ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<WatcherInner>`. Owns the background
/// reconciliation loop and the reactive controller registry.
#[derive(Clone)]
pub struct DeviceWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    registry: Arc<ControllerRegistry>,
    trigger: Arc<Trigger>,
    cancel: CancellationToken,
    /// Load-completion barrier — flips to `true` exactly once, after the
    /// first pass finishes (successfully or not).
    loaded: watch::Sender<bool>,
    report_tx: broadcast::Sender<Arc<Report>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

/// Everything the loop task needs, bundled to keep the task signature sane.
struct LoopCtx {
    backend: Arc<dyn DeviceBackend>,
    parser: Arc<dyn DescriptorParser>,
    registry: Arc<ControllerRegistry>,
    report_tx: broadcast::Sender<Arc<Report>>,
    config: WatcherConfig,
}

impl DeviceWatcher {
    /// Start watching. The trigger starts pre-signaled, so the initial
    /// discovery pass begins immediately. Must be called within a tokio
    /// runtime.
    pub fn spawn(
        backend: Arc<dyn DeviceBackend>,
        parser: Arc<dyn DescriptorParser>,
        config: WatcherConfig,
    ) -> Self {
        let registry = Arc::new(ControllerRegistry::new(config.update_channel_capacity));
        let trigger = Arc::new(Trigger::new());
        let cancel = CancellationToken::new();
        let (loaded, _) = watch::channel(false);
        let (report_tx, _) = broadcast::channel(config.report_channel_capacity);

        let ctx = LoopCtx {
            backend: Arc::clone(&backend),
            parser,
            registry: Arc::clone(&registry),
            report_tx: report_tx.clone(),
            config,
        };

        let loop_handle = tokio::spawn(reconcile_task(
            ctx,
            Arc::clone(&trigger),
            cancel.clone(),
            loaded.clone(),
        ));
        let hotplug_handle = tokio::spawn(hotplug_task(
            backend,
            Arc::clone(&trigger),
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(WatcherInner {
                registry,
                trigger,
                cancel,
                loaded,
                report_tx,
                tasks: Mutex::new(vec![loop_handle, hotplug_handle]),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn guard(&self) -> Result<(), WatchError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(WatchError::Disposed);
        }
        Ok(())
    }

    // ── Streams ──────────────────────────────────────────────────────

    /// Subscribe to registry change-sets. The current state arrives first
    /// as synthetic Adds, then live change-sets in commit order.
    pub fn updates(&self) -> Result<UpdateStream, WatchError> {
        self.guard()?;
        update_stream(&self.inner.registry)
    }

    /// Subscribe to the merged per-control change stream across all
    /// registered controllers.
    pub fn changes(&self) -> Result<ControlStream, WatchError> {
        self.guard()?;
        control_stream(&self.inner.registry)
    }

    /// Subscribe to the fire-and-forget report sink (additions, removals,
    /// per-device failures, pass failures).
    pub fn reports(&self) -> Result<broadcast::Receiver<Arc<Report>>, WatchError> {
        self.guard()?;
        Ok(self.inner.report_tx.subscribe())
    }

    /// Completed-pass counter, bumped after every pass attempt. Useful for
    /// tests and liveness monitoring.
    pub fn passes(&self) -> Result<watch::Receiver<u64>, WatchError> {
        self.guard()?;
        Ok(self.inner.registry.subscribe_passes())
    }

    /// Time of the last successful reconciliation, if any.
    pub fn last_refresh(&self) -> Result<Option<DateTime<Utc>>, WatchError> {
        self.guard()?;
        Ok(self.inner.registry.last_refresh())
    }

    // ── Snapshot queries ─────────────────────────────────────────────

    pub fn count(&self) -> Result<usize, WatchError> {
        self.guard()?;
        self.inner.registry.count()
    }

    pub fn enumerate(&self) -> Result<Vec<Arc<Controller>>, WatchError> {
        self.guard()?;
        self.inner.registry.enumerate()
    }

    /// Look up the live controller at a device path.
    pub fn get(&self, path: &str) -> Result<Option<Arc<Controller>>, WatchError> {
        self.guard()?;
        self.inner.registry.get(path)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Request an out-of-band pass. Fire-and-forget; concurrent calls
    /// during an in-flight pass coalesce to at most one extra pass.
    pub fn refresh(&self) {
        self.inner.trigger.signal();
    }

    /// Wait until the first pass has completed (successfully or not).
    ///
    /// Fails with [`WatchError::Cancelled`] if `cancel` fires first, or
    /// with [`WatchError::Disposed`] if the watcher is (or gets) torn down.
    pub async fn await_loaded(&self, cancel: &CancellationToken) -> Result<(), WatchError> {
        self.guard()?;
        let mut rx = self.inner.loaded.subscribe();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WatchError::Cancelled),
            res = rx.wait_for(|loaded| *loaded) => {
                res.map(|_| ()).map_err(|_| WatchError::Disposed)
            }
            // Teardown can cancel the loop before the first pass ever
            // completes; the barrier then never fires and suspended
            // waiters must be released.
            () = self.inner.cancel.cancelled() => Err(WatchError::Disposed),
        }
    }

    /// Tear the watcher down: cancel the loop, await its exit, then dispose
    /// every still-registered controller. Idempotent — only the first call
    /// does work; every subsequent public operation fails with `Disposed`.
    pub async fn teardown(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();

        let mut tasks = self.inner.tasks.lock().await;
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        drop(tasks);

        self.inner.registry.teardown().await;
        debug!("device watcher torn down");
    }
}

// ── Background tasks ────────────────────────────────────────────────

/// Forward backend topology-change notifications into the trigger.
async fn hotplug_task(
    backend: Arc<dyn DeviceBackend>,
    trigger: Arc<Trigger>,
    cancel: CancellationToken,
) {
    let mut rx = match backend.watch().await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "hot-plug notifications unavailable, relying on refresh()");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            note = rx.recv() => match note {
                Ok(()) => trigger.signal(),
                // Dropped notifications still mean "something changed".
                Err(RecvError::Lagged(_)) => trigger.signal(),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

enum PassOutcome {
    Completed,
    Cancelled,
}

async fn reconcile_task(
    ctx: LoopCtx,
    trigger: Arc<Trigger>,
    cancel: CancellationToken,
    loaded: watch::Sender<bool>,
) {
    info!("reconciliation loop started");
    loop {
        if !trigger.wait(&cancel).await {
            debug!("reconciliation loop cancelled");
            break;
        }

        match run_pass(&ctx, &cancel).await {
            Ok(PassOutcome::Cancelled) => {
                debug!("pass abandoned on cancellation");
                break;
            }
            Ok(PassOutcome::Completed) => ctx.registry.mark_refreshed(),
            Err(e) => {
                publish(&ctx.report_tx, Report::failure(ReportKind::RefreshFailed, None, &e));
            }
        }

        // First completion (success or failure) releases the load barrier.
        loaded.send_replace(true);
        ctx.registry.mark_pass();
    }
}

/// One reconciliation pass: enumerate, diff against the registry snapshot,
/// commit one batch edit, dispose superseded instances.
async fn run_pass(ctx: &LoopCtx, cancel: &CancellationToken) -> Result<PassOutcome, WatchError> {
    // Scratch copy of the current generation; matched entries are removed
    // as the backend enumeration is walked, leftovers are stale.
    let mut scratch: HashMap<String, Arc<Controller>> =
        ctx.registry.snapshot().controllers.clone();

    let handles = ctx.backend.enumerate_devices().await?;
    debug!(devices = handles.len(), known = scratch.len(), "reconciling");

    let mut changes: Vec<Change> = Vec::new();
    let mut superseded: Vec<Arc<Controller>> = Vec::new();

    for handle in handles {
        if cancel.is_cancelled() {
            return Ok(PassOutcome::Cancelled);
        }
        let path = handle.path().to_owned();

        let raw = match handle.raw_descriptor().await {
            Ok(raw) => raw,
            Err(e) => {
                // Skip just this device; if it was previously registered it
                // falls out as Removed for this pass.
                publish(
                    &ctx.report_tx,
                    Report::failure(ReportKind::CreationFailed, Some(path), &e),
                );
                continue;
            }
        };

        // Byte-identical descriptor at a known path: unchanged, keep the
        // live instance, no reparse.
        if scratch.get(&path).is_some_and(|c| *c.raw_descriptor() == raw) {
            scratch.remove(&path);
            continue;
        }

        let parsed = match ctx.parser.parse(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                publish(
                    &ctx.report_tx,
                    Report::failure(ReportKind::CreationFailed, Some(path), &e),
                );
                continue;
            }
        };

        let items = hid::recognize_items(&parsed);
        if items.is_empty() {
            debug!(%path, "no recognized items, skipping");
            continue;
        }

        let controller = Arc::new(Controller::new(
            path.clone(),
            raw,
            parsed,
            items,
            ctx.config.control_channel_capacity,
        ));
        let reason = match scratch.remove(&path) {
            Some(old) => {
                superseded.push(old);
                ChangeReason::Update
            }
            None => ChangeReason::Add,
        };
        changes.push(Change { path, reason, controller });
    }

    // Anything left unmatched has disappeared (or failed to read this pass).
    for (path, old) in scratch {
        superseded.push(Arc::clone(&old));
        changes.push(Change {
            path,
            reason: ChangeReason::Remove,
            controller: old,
        });
    }

    if changes.is_empty() {
        return Ok(PassOutcome::Completed);
    }
    if cancel.is_cancelled() {
        return Ok(PassOutcome::Cancelled);
    }

    let set = ctx.registry.commit(changes);
    for change in &set.changes {
        let kind = match change.reason {
            ChangeReason::Add => ReportKind::Added,
            ChangeReason::Update => ReportKind::Updated,
            ChangeReason::Remove => ReportKind::Removed,
        };
        publish(&ctx.report_tx, Report::device(kind, change.path.clone()));
    }

    // Superseded instances are disposed only after the commit is visible,
    // concurrently; a disposal failure never aborts the pass.
    if !superseded.is_empty() {
        let results = join_all(superseded.iter().map(|c| c.dispose())).await;
        for (ctrl, result) in superseded.iter().zip(results) {
            if let Err(e) = result {
                warn!(path = %ctrl.path(), error = %e, "controller disposal failed (non-fatal)");
            }
        }
    }

    Ok(PassOutcome::Completed)
}

/// Log a report at its catalog severity, then broadcast it.
fn publish(tx: &broadcast::Sender<Arc<Report>>, report: Report) {
    let message = report.message();
    match report.kind.severity() {
        Severity::Info => info!(kind = %report.kind, "{message}"),
        Severity::Warn => warn!(kind = %report.kind, "{message}"),
        Severity::Error => error!(kind = %report.kind, "{message}"),
    }
    let _ = tx.send(Arc::new(report));
}
