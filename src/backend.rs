// ── External collaborator traits ──
//
// The watcher never touches USB/HID directly. A platform backend enumerates
// attached devices and reads raw descriptor bytes; a descriptor parser turns
// those bytes into structure. Both are injected at spawn time.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::BackendError;
use crate::hid::ParsedDescriptor;

/// A single attached device as seen by the backend.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Platform-stable path identifying this device across enumerations.
    fn path(&self) -> &str;

    /// Read the raw report descriptor bytes.
    async fn raw_descriptor(&self) -> Result<Bytes, BackendError>;
}

/// Platform device backend: enumeration plus hot-plug notification.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// List the currently attached devices.
    async fn enumerate_devices(&self) -> Result<Vec<Arc<dyn DeviceHandle>>, BackendError>;

    /// Subscribe to topology-change notifications. Senders may fire from
    /// arbitrary threads; every notification batch wakes the watcher at
    /// least once.
    async fn watch(&self) -> Result<broadcast::Receiver<()>, BackendError>;
}

/// Structural report-descriptor parser.
pub trait DescriptorParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<ParsedDescriptor, BackendError>;
}
