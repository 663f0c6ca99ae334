// ── Live controller instance ──
//
// One `Controller` per registered device path. Constructed by the
// reconciliation loop only when a device is new or its raw descriptor bytes
// differ from the prior instance at the same path. The back-reference to the
// owning registry is just its path — identifier plus lookup, never a strong
// cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::BackendError;
use crate::hid::{DeviceItem, ParsedDescriptor, Usage};

/// One control-value change on a device, fed by an external decoder and
/// merged across controllers by `DeviceWatcher::changes()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChange {
    pub usage: Usage,
    pub value: i32,
}

/// A live input controller keyed by its device path.
pub struct Controller {
    path: String,
    raw_descriptor: Bytes,
    descriptor: ParsedDescriptor,
    items: Vec<DeviceItem>,
    control_tx: broadcast::Sender<ControlChange>,
    disposed: AtomicBool,
}

impl Controller {
    pub(crate) fn new(
        path: String,
        raw_descriptor: Bytes,
        descriptor: ParsedDescriptor,
        items: Vec<DeviceItem>,
        control_capacity: usize,
    ) -> Self {
        let (control_tx, _) = broadcast::channel(control_capacity);
        Self {
            path,
            raw_descriptor,
            descriptor,
            items,
            control_tx,
            disposed: AtomicBool::new(false),
        }
    }

    /// Device path — the registry identity of this controller.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw descriptor bytes this instance was built from. Byte equality
    /// against a fresh read is the sole "unchanged" gate during diffing.
    pub fn raw_descriptor(&self) -> &Bytes {
        &self.raw_descriptor
    }

    pub fn descriptor(&self) -> &ParsedDescriptor {
        &self.descriptor
    }

    /// Recognized device items (classified kind + axis usages). Never empty:
    /// a device yielding zero recognized items is never registered.
    pub fn items(&self) -> &[DeviceItem] {
        &self.items
    }

    /// Subscribe to this controller's control-change stream.
    pub fn controls(&self) -> broadcast::Receiver<ControlChange> {
        self.control_tx.subscribe()
    }

    /// Publish a control change. Decoders feed this; the engine itself never
    /// inspects values. Returns `false` once disposed or with no subscribers.
    pub fn offer_control(&self, change: ControlChange) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.control_tx.send(change).is_ok()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release this instance. Idempotent — only the first call does work.
    /// Failure here is tolerated by callers and never aborts a pass.
    pub async fn dispose(&self) -> Result<(), BackendError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(path = %self.path, "controller disposed");
        Ok(())
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("path", &self.path)
            .field("items", &self.items)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
